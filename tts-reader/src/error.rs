//! Error types for tts-reader
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for tts-reader
#[derive(Error, Debug)]
pub enum Error {
    /// No voice configured
    #[error("No voice selected. Choose one with `tts-reader config set voice <key>`")]
    NoVoiceSelected,

    /// Nothing left to read after trimming / markup stripping
    #[error("Nothing to read: input is empty")]
    EmptyInput,

    /// Voice key has no installed model/config pair
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    /// Engine invocation failed, exited non-zero or timed out
    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Audio output device errors
    #[error("Playback device error: {0}")]
    PlaybackDevice(String),

    /// Artifact missing or unreadable when its turn to play came
    #[error("Failed to read audio artifact: {0}")]
    ArtifactReadFailed(String),

    /// Voice catalog fetch or model download failed
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared crate (settings loading)
    #[error(transparent)]
    Common(#[from] tts_common::Error),
}

/// Convenience Result type using tts-reader Error
pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::DownloadFailed(err.to_string())
    }
}
