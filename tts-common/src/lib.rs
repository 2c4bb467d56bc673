//! # tts-common
//!
//! Shared code for the tts-reader workspace:
//! - Error type used by configuration loading
//! - Event types (TtsEvent enum) and the EventBus
//! - Persisted settings and config file resolution

pub mod config;
pub mod error;
pub mod events;

pub use config::Settings;
pub use error::{Error, Result};
pub use events::{EventBus, PlaybackState, TtsEvent};
