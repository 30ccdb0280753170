use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Audio output unavailable: {0}")]
    AudioUnavailable(String),

    #[error("Audio graph is no longer running")]
    GraphClosed,
}
