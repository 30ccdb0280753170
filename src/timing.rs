// src/timing.rs
// Converts a transcript into tone and reveal events on the audio clock

use crate::code_table::{self, Symbol};
use crate::sequence::Transcript;
use crate::settings::MorseSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    dot: f64,
}

impl Timing {
    pub fn from_wpm(wpm: u32) -> Self {
        Self {
            dot: 1.2 / wpm.max(1) as f64,
        }
    }

    pub fn dot(&self) -> f64 {
        self.dot
    }

    pub fn dash(&self) -> f64 {
        3.0 * self.dot
    }

    pub fn symbol(&self, symbol: Symbol) -> f64 {
        match symbol {
            Symbol::Dot => self.dot(),
            Symbol::Dash => self.dash(),
        }
    }

    pub fn units(&self, units: u32) -> f64 {
        units as f64 * self.dot
    }
}

/// A keyed tone, in audio-clock seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneEvent {
    pub start_time: f64,
    pub duration: f64,
}

impl ToneEvent {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// The moment a body character starts sounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevealEvent {
    pub character: char,
    pub time: f64,
}

/// All events for one session, built once before playback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    tones: Vec<ToneEvent>,
    reveals: Vec<RevealEvent>,
    start_time: f64,
    end_time: f64,
}

impl Schedule {
    pub fn tones(&self) -> &[ToneEvent] {
        &self.tones
    }

    pub fn reveals(&self) -> &[RevealEvent] {
        &self.reveals
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Cursor position after the last character.
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Number of reveal events due at `now`.
    pub fn revealed_at(&self, now: f64) -> usize {
        self.reveals.partition_point(|r| r.time <= now)
    }
}

/// Lays out `transcript` starting at `start_time`.
///
/// Characters without a table entry send nothing but still get a reveal
/// event and the usual trailing gap. Preamble characters are never revealed
/// and never end a group.
pub fn plan(transcript: &Transcript, settings: &MorseSettings, start_time: f64) -> Schedule {
    let timing = Timing::from_wpm(settings.wpm);
    let preamble_len = transcript.preamble_len();
    let total = transcript.len();

    let mut schedule = Schedule {
        start_time,
        end_time: start_time,
        ..Schedule::default()
    };
    let mut t = start_time;

    for (i, ch) in transcript.chars().enumerate() {
        if i >= preamble_len {
            schedule.reveals.push(RevealEvent { character: ch, time: t });
        }

        let mut symbols = code_table::symbols(ch).peekable();
        while let Some(symbol) = symbols.next() {
            let duration = timing.symbol(symbol);
            schedule.tones.push(ToneEvent {
                start_time: t,
                duration,
            });
            t += duration;
            if symbols.peek().is_some() {
                t += timing.dot();
            }
        }

        if i + 1 < total {
            t += gap_after(i, preamble_len, settings, &timing);
        }
    }

    schedule.end_time = t;
    schedule
}

fn gap_after(index: usize, preamble_len: usize, settings: &MorseSettings, timing: &Timing) -> f64 {
    let in_body = index >= preamble_len;
    let group_ends = settings.group_size > 0
        && in_body
        && (index - preamble_len + 1) % settings.group_size == 0;
    if group_ends {
        timing.units(settings.word_spaces)
    } else {
        timing.units(settings.char_spaces)
    }
}
