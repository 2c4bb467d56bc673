//! Playback device capability
//!
//! The queue drives exactly one device. Each loaded artifact gets a fresh
//! [`BindingId`]; the device reports exactly one terminal event per binding
//! through the channel passed to [`PlaybackDevice::load`]. Events carrying a
//! binding the queue no longer holds are ignored, which is how `stop`
//! detaches late callbacks.
//!
//! A device that plays decoded audio names its output rate through
//! [`PlaybackDevice::output_rate`]; the queue then decodes and resamples
//! each chunk on a blocking thread and binds [`ChunkAudio::Stereo`].

use super::decoder::decode_wav;
use super::resampler::resample;
use crate::error::Result;
use tokio::sync::mpsc;

/// Identifies one artifact bound to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u64);

impl std::fmt::Display for BindingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Terminal outcome reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEventKind {
    /// Playback reached the end of the audio
    Ended,
    /// The device failed while playing
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub binding: BindingId,
    pub kind: DeviceEventKind,
}

/// Channel for device events; usable from audio threads
pub type DeviceEventSender = mpsc::UnboundedSender<DeviceEvent>;

/// One chunk's audio in the form the device asked for
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkAudio {
    /// WAV file bytes as piper wrote them
    Wav(Vec<u8>),
    /// Interleaved stereo samples at the device's output rate
    Stereo(Vec<f32>),
}

impl ChunkAudio {
    /// Decode `bytes` to stereo at `output_rate`, or keep them as WAV
    ///
    /// CPU bound; callers on the runtime use `spawn_blocking`.
    pub fn prepare(bytes: Vec<u8>, output_rate: Option<u32>) -> Result<Self> {
        let Some(rate) = output_rate else {
            return Ok(Self::Wav(bytes));
        };
        let decoded = decode_wav(bytes)?;
        let source_rate = decoded.sample_rate;
        let stereo = decoded.into_stereo();
        Ok(Self::Stereo(resample(&stereo, source_rate, rate, 2)?))
    }
}

/// Audio output driven by the playback queue
///
/// `load` replaces any previously bound audio.
pub trait PlaybackDevice: Send {
    /// Rate at which the device wants decoded stereo; `None` takes WAV bytes
    fn output_rate(&self) -> Option<u32> {
        None
    }

    /// Bind audio under `binding`; terminal events go to `events`
    fn load(&mut self, binding: BindingId, audio: ChunkAudio, events: DeviceEventSender)
        -> Result<()>;

    /// Playback rate multiplier applied to the bound audio
    fn set_playback_rate(&mut self, rate: f32);

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Release the bound audio; no further events for its binding
    fn unload(&mut self);
}

/// Device that plays nothing: every chunk ends as soon as it starts
///
/// Used to run the synthesis pipeline without audio hardware.
#[derive(Debug, Default)]
pub struct NullDevice {
    bound: Option<(BindingId, DeviceEventSender)>,
}

impl NullDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackDevice for NullDevice {
    fn load(
        &mut self,
        binding: BindingId,
        _audio: ChunkAudio,
        events: DeviceEventSender,
    ) -> Result<()> {
        self.bound = Some((binding, events));
        Ok(())
    }

    fn set_playback_rate(&mut self, _rate: f32) {}

    fn play(&mut self) -> Result<()> {
        if let Some((binding, events)) = self.bound.take() {
            let _ = events.send(DeviceEvent {
                binding,
                kind: DeviceEventKind::Ended,
            });
        }
        Ok(())
    }

    fn pause(&mut self) {}

    fn unload(&mut self) {
        self.bound = None;
    }
}
