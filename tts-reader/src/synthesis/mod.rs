//! Speech synthesis through the external Piper engine
//!
//! - `voice`: voice key to model/config file resolution
//! - `artifact`: temporary WAV files and their cleanup registry
//! - `engine`: one engine invocation per text chunk

pub mod artifact;
pub mod engine;
pub mod voice;

pub use artifact::{ArtifactRegistry, AudioArtifact, AudioFormat};
pub use engine::{BinaryProbe, EngineConfig, PiperEngine};
pub use voice::{installed_voices, resolve_voice, VoiceFiles};
