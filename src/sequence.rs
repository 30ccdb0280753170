// src/sequence.rs
// Random practice text generation

use rand::Rng;

use crate::settings::MorseSettings;

/// The full text to send: a fixed preamble followed by the generated body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    preamble: String,
    body: String,
}

impl Transcript {
    pub fn new(preamble: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
            body: body.into(),
        }
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Preamble length in characters.
    pub fn preamble_len(&self) -> usize {
        self.preamble.chars().count()
    }

    /// Total length in characters.
    pub fn len(&self) -> usize {
        self.preamble_len() + self.body.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.preamble.is_empty() && self.body.is_empty()
    }

    /// Characters in transmission order, preamble first.
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.preamble.chars().chain(self.body.chars())
    }
}

/// Draws `count` independent uniform picks from the characters of `character_set`.
///
/// An empty set yields an empty string.
pub fn generate<R: Rng + ?Sized>(rng: &mut R, character_set: &str, count: usize) -> String {
    let symbols: Vec<char> = character_set.chars().collect();
    if symbols.is_empty() {
        return String::new();
    }
    (0..count)
        .map(|_| symbols[rng.gen_range(0..symbols.len())])
        .collect()
}

/// Builds the transcript for one session from `settings`.
pub fn build_transcript<R: Rng + ?Sized>(rng: &mut R, settings: &MorseSettings) -> Transcript {
    let body = generate(rng, &settings.character_set, settings.num_chars);
    Transcript::new(settings.preamble.clone(), body)
}
