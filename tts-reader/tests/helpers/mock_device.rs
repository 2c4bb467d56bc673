//! Scripted playback device
//!
//! Records every load and lets the test decide when the bound chunk ends
//! or fails. With `auto_end` set, chunks end as soon as they start. With
//! an output rate set, the device asks the queue for decoded stereo.

use std::sync::{Arc, Mutex, MutexGuard};
use tts_reader::error::{Error, Result};
use tts_reader::playback::{
    BindingId, ChunkAudio, DeviceEvent, DeviceEventKind, DeviceEventSender, PlaybackDevice,
};

#[derive(Default)]
struct MockState {
    loads: Vec<(BindingId, ChunkAudio)>,
    bound: Option<(BindingId, DeviceEventSender)>,
    playing: bool,
    rate: Option<f32>,
    plays: usize,
    pauses: usize,
    unloads: usize,
    reject_loads: usize,
    auto_end: bool,
    output_rate: Option<u32>,
}

pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

/// Test-side view of a [`MockDevice`] owned by a queue
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHandle { state },
        )
    }

    /// Device whose chunks end immediately on play
    pub fn auto_ending() -> (Self, MockHandle) {
        let (device, handle) = Self::new();
        handle.lock().auto_end = true;
        (device, handle)
    }

    /// Device that binds stereo samples at `rate`
    pub fn decoding(rate: u32) -> (Self, MockHandle) {
        let (device, handle) = Self::new();
        handle.lock().output_rate = Some(rate);
        (device, handle)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl PlaybackDevice for MockDevice {
    fn output_rate(&self) -> Option<u32> {
        self.lock().output_rate
    }

    fn load(&mut self, binding: BindingId, audio: ChunkAudio, events: DeviceEventSender) -> Result<()> {
        let mut state = self.lock();
        if state.reject_loads > 0 {
            state.reject_loads -= 1;
            return Err(Error::PlaybackDevice("mock rejected load".to_string()));
        }
        state.loads.push((binding, audio));
        state.bound = Some((binding, events));
        state.playing = false;
        Ok(())
    }

    fn set_playback_rate(&mut self, rate: f32) {
        self.lock().rate = Some(rate);
    }

    fn play(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.plays += 1;
        state.playing = true;
        if state.auto_end {
            if let Some((binding, events)) = state.bound.take() {
                state.playing = false;
                let _ = events.send(DeviceEvent {
                    binding,
                    kind: DeviceEventKind::Ended,
                });
            }
        }
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = self.lock();
        state.pauses += 1;
        state.playing = false;
    }

    fn unload(&mut self) {
        let mut state = self.lock();
        state.unloads += 1;
        state.bound = None;
        state.playing = false;
    }
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Loaded WAV payloads as text, in load order
    pub fn loaded(&self) -> Vec<String> {
        self.lock()
            .loads
            .iter()
            .filter_map(|(_, audio)| match audio {
                ChunkAudio::Wav(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                ChunkAudio::Stereo(_) => None,
            })
            .collect()
    }

    /// Sample counts of loaded stereo payloads, in load order
    pub fn stereo_lengths(&self) -> Vec<usize> {
        self.lock()
            .loads
            .iter()
            .filter_map(|(_, audio)| match audio {
                ChunkAudio::Stereo(samples) => Some(samples.len()),
                ChunkAudio::Wav(_) => None,
            })
            .collect()
    }

    pub fn load_count(&self) -> usize {
        self.lock().loads.len()
    }

    pub fn bound(&self) -> Option<BindingId> {
        self.lock().bound.as_ref().map(|(binding, _)| *binding)
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn rate(&self) -> Option<f32> {
        self.lock().rate
    }

    pub fn pauses(&self) -> usize {
        self.lock().pauses
    }

    /// Fail the next `count` loads
    pub fn reject_loads(&self, count: usize) {
        self.lock().reject_loads = count;
    }

    /// Report the bound chunk as played out
    pub fn finish_current(&self) {
        self.send_current(DeviceEventKind::Ended);
    }

    /// Report a device error for the bound chunk
    pub fn fail_current(&self, reason: &str) {
        self.send_current(DeviceEventKind::Error(reason.to_string()));
    }

    /// Deliver an event for an arbitrary binding on the bound channel
    pub fn send_for(&self, binding: BindingId, kind: DeviceEventKind) {
        let state = self.lock();
        let (_, events) = state.bound.as_ref().expect("no binding to send on");
        events.send(DeviceEvent { binding, kind }).unwrap();
    }

    fn send_current(&self, kind: DeviceEventKind) {
        let state = self.lock();
        let (binding, events) = state.bound.as_ref().expect("nothing bound");
        events
            .send(DeviceEvent {
                binding: *binding,
                kind,
            })
            .unwrap();
    }
}
