//! Playback queue and audio output

pub mod decoder;
pub mod device;
pub mod output;
pub mod queue;
pub mod resampler;

pub use device::{
    BindingId, ChunkAudio, DeviceEvent, DeviceEventKind, DeviceEventSender, NullDevice,
    PlaybackDevice,
};
pub use output::CpalDevice;
pub use queue::{PlaybackQueue, SessionId};
