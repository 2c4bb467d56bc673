//! # tts-reader
//!
//! Streaming text-to-speech through the Piper engine.
//!
//! **Purpose:** Split text into sentence-bounded chunks, synthesize each chunk
//! with an external `piper` process and play the results in order while later
//! chunks are still being synthesized.
//!
//! **Architecture:** segmenter → engine → playback queue, coordinated by the
//! [`Reader`] orchestrator; audio output via symphonia + rubato + cpal.

pub mod catalog;
pub mod error;
pub mod orchestrator;
pub mod playback;
pub mod status;
pub mod synthesis;
pub mod text;

pub use error::{Error, Result};
pub use orchestrator::Reader;
