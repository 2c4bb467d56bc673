//! Audio output using cpal
//!
//! [`CpalDevice`] implements [`PlaybackDevice`] on the system audio output.
//! The cpal stream is not `Send`, so it is created and kept alive on a
//! dedicated thread; the stream callback and the queue share the bound
//! track through a mutex-protected [`TrackSlot`].
//!
//! The device asks for stereo at its own rate, so the queue decodes and
//! resamples off the runtime before `load`. The playback rate is applied in the callback by
//! stepping through frames fractionally with linear interpolation, so a
//! faster rate also raises pitch.

use super::device::{
    BindingId, ChunkAudio, DeviceEvent, DeviceEventKind, DeviceEventSender, PlaybackDevice,
};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The bound track as seen by the audio callback
struct TrackSlot {
    binding: Option<BindingId>,
    /// Interleaved stereo at the device rate
    frames: Vec<f32>,
    /// Fractional frame position
    cursor: f64,
    rate: f32,
    playing: bool,
    /// Taken when the terminal event is sent
    events: Option<DeviceEventSender>,
}

impl Default for TrackSlot {
    fn default() -> Self {
        Self {
            binding: None,
            frames: Vec::new(),
            cursor: 0.0,
            rate: 1.0,
            playing: false,
            events: None,
        }
    }
}

impl TrackSlot {
    fn frame_count(&self) -> usize {
        self.frames.len() / 2
    }

    /// Next output frame; silence when paused or unbound
    fn next_frame(&mut self) -> (f32, f32) {
        if !self.playing {
            return (0.0, 0.0);
        }

        let idx = self.cursor as usize;
        if idx + 1 >= self.frame_count() {
            self.finish(DeviceEventKind::Ended);
            return (0.0, 0.0);
        }

        let frac = (self.cursor - idx as f64) as f32;
        let base = idx * 2;
        let left = lerp(self.frames[base], self.frames[base + 2], frac);
        let right = lerp(self.frames[base + 1], self.frames[base + 3], frac);
        self.cursor += self.rate as f64;
        (left, right)
    }

    /// Stop and report the terminal event; only the first call reports
    fn finish(&mut self, kind: DeviceEventKind) {
        self.playing = false;
        if let (Some(binding), Some(events)) = (self.binding, self.events.take()) {
            let _ = events.send(DeviceEvent { binding, kind });
        }
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn lock_slot(slot: &Mutex<TrackSlot>) -> MutexGuard<'_, TrackSlot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Playback device on a cpal output stream
pub struct CpalDevice {
    slot: Arc<Mutex<TrackSlot>>,
    sample_rate: u32,
    device_name: String,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CpalDevice {
    /// Names of the available output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::PlaybackDevice(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the named output device, or the default one
    ///
    /// A named device that cannot be found falls back to the default.
    /// Blocks until the stream is running or has failed to start.
    pub fn open(device_name: Option<String>) -> Result<Self> {
        let slot = Arc::new(Mutex::new(TrackSlot::default()));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("tts-audio-output".to_string())
            .spawn({
                let slot = Arc::clone(&slot);
                let running = Arc::clone(&running);
                move || run_output_thread(device_name, slot, running, ready_tx)
            })
            .map_err(|e| Error::PlaybackDevice(format!("Failed to spawn audio thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok((sample_rate, device_name))) => Ok(Self {
                slot,
                sample_rate,
                device_name,
                running,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(Error::PlaybackDevice(
                "Audio thread exited during startup".to_string(),
            )),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn slot(&self) -> MutexGuard<'_, TrackSlot> {
        lock_slot(&self.slot)
    }
}

impl PlaybackDevice for CpalDevice {
    fn output_rate(&self) -> Option<u32> {
        Some(self.sample_rate)
    }

    fn load(
        &mut self,
        binding: BindingId,
        audio: ChunkAudio,
        events: DeviceEventSender,
    ) -> Result<()> {
        let ChunkAudio::Stereo(frames) = audio else {
            return Err(Error::PlaybackDevice(format!(
                "Expected stereo at {} Hz, got WAV bytes",
                self.sample_rate
            )));
        };

        let mut slot = self.slot();
        slot.binding = Some(binding);
        slot.frames = frames;
        slot.cursor = 0.0;
        slot.playing = false;
        slot.events = Some(events);
        debug!(%binding, frames = slot.frame_count(), "Loaded audio into output slot");
        Ok(())
    }

    fn set_playback_rate(&mut self, rate: f32) {
        if rate.is_finite() && rate > 0.0 {
            self.slot().rate = rate;
        } else {
            warn!("Ignoring invalid playback rate {}", rate);
        }
    }

    fn play(&mut self) -> Result<()> {
        let mut slot = self.slot();
        if slot.binding.is_none() {
            return Err(Error::PlaybackDevice("No audio loaded".to_string()));
        }
        slot.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.slot().playing = false;
    }

    fn unload(&mut self) {
        let mut slot = self.slot();
        slot.binding = None;
        slot.events = None;
        slot.frames = Vec::new();
        slot.cursor = 0.0;
        slot.playing = false;
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
    }
}

/// Owns the stream for its whole life; reports startup through `ready`
fn run_output_thread(
    device_name: Option<String>,
    slot: Arc<Mutex<TrackSlot>>,
    running: Arc<AtomicBool>,
    ready: std::sync::mpsc::Sender<Result<(u32, String)>>,
) {
    let (stream, sample_rate, name) = match open_stream(device_name.as_deref(), slot) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(Error::PlaybackDevice(format!(
            "Failed to start stream: {}",
            e
        ))));
        return;
    }

    info!(device = %name, sample_rate, "Audio output started");
    let _ = ready.send(Ok((sample_rate, name)));

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
    info!("Audio output stopped");
}

fn select_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::PlaybackDevice(format!("Failed to enumerate devices: {}", e)))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            return Ok(device);
        }
        warn!("Output device '{}' not found, falling back to default", name);
    }

    host.default_output_device()
        .ok_or_else(|| Error::PlaybackDevice("No default output device found".to_string()))
}

fn open_stream(
    device_name: Option<&str>,
    slot: Arc<Mutex<TrackSlot>>,
) -> Result<(Stream, u32, String)> {
    let device = select_device(device_name)?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .default_output_config()
        .map_err(|e| Error::PlaybackDevice(format!("Failed to get default config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();

    debug!(
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        format = ?sample_format,
        "Output stream config"
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, slot)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, slot)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, slot)?,
        other => {
            return Err(Error::PlaybackDevice(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    Ok((stream, config.sample_rate.0, name))
}

fn build_stream<T>(device: &Device, config: &StreamConfig, slot: Arc<Mutex<TrackSlot>>) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let error_slot = Arc::clone(&slot);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut slot = lock_slot(&slot);
                for frame in data.chunks_mut(channels) {
                    let (left, right) = slot.next_frame();
                    write_frame(frame, left, right);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                lock_slot(&error_slot).finish(DeviceEventKind::Error(err.to_string()));
            },
            None,
        )
        .map_err(|e| Error::PlaybackDevice(format!("Failed to build stream: {}", e)))
}

fn write_frame<T: SizedSample + FromSample<f32>>(frame: &mut [T], left: f32, right: f32) {
    match frame.len() {
        0 => {}
        1 => frame[0] = T::from_sample(((left + right) * 0.5).clamp(-1.0, 1.0)),
        _ => {
            frame[0] = T::from_sample(left.clamp(-1.0, 1.0));
            frame[1] = T::from_sample(right.clamp(-1.0, 1.0));
            for extra in &mut frame[2..] {
                *extra = T::from_sample(0.0f32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn bound_slot(frames: Vec<f32>) -> (TrackSlot, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let slot = TrackSlot {
            binding: Some(BindingId(7)),
            frames,
            playing: true,
            events: Some(tx),
            ..TrackSlot::default()
        };
        (slot, rx)
    }

    #[test]
    fn test_plays_frames_then_ends_once() {
        let (mut slot, mut rx) = bound_slot(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);

        assert_eq!(slot.next_frame(), (0.1, 0.2));
        assert_eq!(slot.next_frame(), (0.3, 0.4));
        assert_eq!(slot.next_frame(), (0.0, 0.0));
        assert!(!slot.playing);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.binding, BindingId(7));
        assert_eq!(event.kind, DeviceEventKind::Ended);

        slot.finish(DeviceEventKind::Ended);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fractional_rate_interpolates() {
        let (mut slot, _rx) = bound_slot(vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        slot.rate = 0.5;

        assert_eq!(slot.next_frame(), (0.0, 0.0));
        assert_eq!(slot.next_frame(), (0.5, 0.5));
        assert_eq!(slot.next_frame(), (1.0, 1.0));
    }

    #[test]
    fn test_paused_slot_outputs_silence() {
        let (mut slot, mut rx) = bound_slot(vec![0.5, 0.5, 0.5, 0.5]);
        slot.playing = false;
        assert_eq!(slot.next_frame(), (0.0, 0.0));
        assert_eq!(slot.cursor, 0.0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stream_error_reports_error_event() {
        let (mut slot, mut rx) = bound_slot(vec![0.5; 8]);
        slot.finish(DeviceEventKind::Error("device unplugged".to_string()));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, DeviceEventKind::Error("device unplugged".to_string()));
    }

    #[test]
    fn test_write_frame_channel_layouts() {
        let mut mono = [0.0f32; 1];
        write_frame(&mut mono, 0.2, 0.4);
        assert!((mono[0] - 0.3).abs() < 1e-6);

        let mut quad = [9.0f32; 4];
        write_frame(&mut quad, 2.0, -0.5);
        assert_eq!(quad, [1.0, -0.5, 0.0, 0.0]);
    }
}
