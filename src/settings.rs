// src/settings.rs
// Practice session settings and partial updates

use crate::timing::Timing;

#[derive(Debug, Clone, PartialEq)]
pub struct MorseSettings {
    pub wpm: u32,
    pub character_set: String,
    /// Characters per group, 0 for no grouping.
    pub group_size: usize,
    /// Gap between characters, in dot units.
    pub char_spaces: u32,
    /// Gap between groups, in dot units.
    pub word_spaces: u32,
    pub volume: f32,
    pub num_chars: usize,
    /// Sent before the body, never revealed.
    pub preamble: String,
    pub tone: f32,
}

impl Default for MorseSettings {
    fn default() -> Self {
        Self {
            wpm: 20,
            character_set: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".to_string(),
            group_size: 5,
            char_spaces: 3,
            word_spaces: 7,
            volume: 0.5,
            num_chars: 100,
            preamble: "VVV".to_string(),
            tone: 600.0,
        }
    }
}

impl MorseSettings {
    pub fn dot_duration(&self) -> f64 {
        Timing::from_wpm(self.wpm).dot()
    }

    /// Applies `patch`, normalising each value.
    ///
    /// When `locked` is set only volume and tone are taken; the other fields
    /// shape the precomputed schedule and are dropped. Returns what was applied.
    pub fn apply(&mut self, patch: SettingsPatch, locked: bool) -> Applied {
        let mut applied = Applied::default();

        if let Some(volume) = patch.volume.filter(|v| v.is_finite()) {
            self.volume = volume.clamp(0.0, 1.0);
            applied.volume = Some(self.volume);
        }
        if let Some(tone) = patch.tone.filter(|t| t.is_finite() && *t > 0.0) {
            self.tone = tone;
            applied.tone = Some(tone);
        }

        if patch.touches_schedule() {
            if locked {
                applied.rejected = true;
                return applied;
            }
            if let Some(wpm) = patch.wpm {
                self.wpm = wpm.max(1);
            }
            if let Some(set) = patch.character_set {
                self.character_set = set.to_uppercase();
            }
            if let Some(group_size) = patch.group_size {
                self.group_size = group_size;
            }
            if let Some(spaces) = patch.char_spaces {
                self.char_spaces = spaces.max(1);
            }
            if let Some(spaces) = patch.word_spaces {
                self.word_spaces = spaces.max(1);
            }
            if let Some(count) = patch.num_chars {
                self.num_chars = count.max(1);
            }
            if let Some(preamble) = patch.preamble {
                self.preamble = preamble.to_uppercase();
            }
        }

        applied
    }
}

/// A partial settings update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub wpm: Option<u32>,
    pub character_set: Option<String>,
    pub group_size: Option<usize>,
    pub char_spaces: Option<u32>,
    pub word_spaces: Option<u32>,
    pub volume: Option<f32>,
    pub num_chars: Option<usize>,
    pub preamble: Option<String>,
    pub tone: Option<f32>,
}

impl SettingsPatch {
    pub fn volume(volume: f32) -> Self {
        Self {
            volume: Some(volume),
            ..Self::default()
        }
    }

    pub fn tone(tone: f32) -> Self {
        Self {
            tone: Some(tone),
            ..Self::default()
        }
    }

    fn touches_schedule(&self) -> bool {
        self.wpm.is_some()
            || self.character_set.is_some()
            || self.group_size.is_some()
            || self.char_spaces.is_some()
            || self.word_spaces.is_some()
            || self.num_chars.is_some()
            || self.preamble.is_some()
    }
}

/// Outcome of [`MorseSettings::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Applied {
    pub volume: Option<f32>,
    pub tone: Option<f32>,
    /// Schedule-shaping fields were present but locked.
    pub rejected: bool,
}
