// src/lib.rs
// Library interface for cwdrill

pub mod automation;
pub mod code_table;
pub mod controller;
pub mod display;
pub mod error;
pub mod graph;
pub mod output;
pub mod scheduler;
pub mod sequence;
pub mod settings;
pub mod timing;
pub mod wav;

pub use controller::{Frame, PlaybackController, PlaybackState, TRAILING_MARGIN};
pub use display::DisplayPane;
pub use error::PlaybackError;
pub use output::{AudioBackend, OfflineBackend, UnavailableBackend};
pub use sequence::Transcript;
pub use settings::{MorseSettings, SettingsPatch};
pub use timing::{Schedule, plan};
pub use wav::WavRenderer;

#[cfg(feature = "audio-cpal")]
pub use output::CpalBackend;
