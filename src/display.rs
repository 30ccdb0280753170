// src/display.rs
// Text shown to the trainee while a session plays

pub const GROUP_SEPARATOR: char = ' ';
pub const HIDDEN_PLACEHOLDER: &str = "Text Hidden";

/// The first `count` characters of `text`.
pub fn visible_text(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Inserts a separator before every `group_size`-th character. No grouping
/// when `group_size` is 0.
pub fn group_text(text: &str, group_size: usize) -> String {
    if group_size == 0 {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + text.len() / group_size);
    for (i, ch) in text.chars().enumerate() {
        if i > 0 && i % group_size == 0 {
            out.push(GROUP_SEPARATOR);
        }
        out.push(ch);
    }
    out
}

/// Display pane with an optional overlay that hides the copy.
///
/// Hiding only changes what is drawn; reveal progress keeps counting.
#[derive(Debug, Clone, Default)]
pub struct DisplayPane {
    hidden: bool,
}

impl DisplayPane {
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn toggle_hidden(&mut self) {
        self.hidden = !self.hidden;
    }

    pub fn render(&self, text: &str, visible: usize, group_size: usize) -> String {
        if self.hidden {
            return HIDDEN_PLACEHOLDER.to_string();
        }
        group_text(visible_text(text, visible), group_size)
    }
}
