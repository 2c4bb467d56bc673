//! Playback queue state machine
//!
//! Holds ready-to-play audio artifacts in chunk order and drives the single
//! playback device. Artifacts may be appended while an earlier one is
//! playing (streaming append).
//!
//! **State transitions:**
//! - `Idle --append--> Playing`
//! - `Idle --start_streaming--> Loading`
//! - `Loading --append--> Playing`
//! - `Playing --pause--> Paused`, `Paused --resume--> Playing`
//! - `Playing --chunk ends--> Playing` (next entry) or `Idle` (queue exhausted)
//! - any state `--stop--> Idle`
//!
//! State changes are broadcast on the [`EventBus`] while the queue lock is
//! held, so observers see them in transition order.

use super::device::{
    BindingId, ChunkAudio, DeviceEvent, DeviceEventKind, DeviceEventSender, PlaybackDevice,
};
use crate::error::{Error, Result};
use crate::synthesis::AudioArtifact;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use tts_common::events::{ChunkOutcome, ChunkProgress, EventBus, PlaybackState, TtsEvent};

/// Identifies one streaming or fixed-list session
///
/// Appends addressed to an older session are rejected, so a run that was
/// stopped cannot feed audio into its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// An artifact currently bound to the device
struct BoundEntry {
    binding: BindingId,
    artifact: AudioArtifact,
}

struct QueueInner {
    state: PlaybackState,
    pending: VecDeque<AudioArtifact>,
    current: Option<BoundEntry>,
    /// Entries taken from the queue in this session (1-based position of the current one)
    started: usize,
    total_expected: Option<usize>,
    session: u64,
    next_binding: u64,
    rate: f32,
    device: Box<dyn PlaybackDevice>,
    device_events: DeviceEventSender,
    bus: EventBus,
}

impl QueueInner {
    fn progress(&self) -> ChunkProgress {
        let current = self.started.max(1);
        let total = self
            .total_expected
            .unwrap_or(self.started + self.pending.len())
            .max(current);
        ChunkProgress { current, total }
    }

    fn set_state(&mut self, new_state: PlaybackState) {
        let old_state = self.state;
        self.state = new_state;

        let progress = match new_state {
            PlaybackState::Playing | PlaybackState::Paused => Some(self.progress()),
            PlaybackState::Idle | PlaybackState::Loading => None,
        };

        debug!(%old_state, %new_state, ?progress, "Playback state changed");
        self.bus
            .emit_lossy(TtsEvent::state_changed(old_state, new_state, progress));
    }

    fn next_binding(&mut self) -> BindingId {
        self.next_binding += 1;
        BindingId(self.next_binding)
    }

    /// Release a chunk that left the device and announce it
    fn end_chunk(&mut self, artifact: AudioArtifact, outcome: ChunkOutcome) {
        let chunk_index = artifact.chunk_index();
        let path = artifact.path().to_path_buf();
        artifact.release();
        self.bus
            .emit_lossy(TtsEvent::chunk_ended(chunk_index, path, outcome));
    }

    /// Bind the next readable entry, or go idle when none is left
    async fn play_next(&mut self) {
        while let Some(artifact) = self.pending.pop_front() {
            self.started += 1;
            let chunk_index = artifact.chunk_index();

            let bytes = match tokio::fs::read(artifact.path()).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    let err = Error::ArtifactReadFailed(format!(
                        "{}: {}",
                        artifact.path().display(),
                        e
                    ));
                    warn!(chunk = chunk_index, error = %err, "Skipping unreadable chunk");
                    self.end_chunk(
                        artifact,
                        ChunkOutcome::Failed {
                            reason: err.to_string(),
                        },
                    );
                    continue;
                }
            };

            let audio = match prepare_off_runtime(bytes, self.device.output_rate()).await {
                Ok(audio) => audio,
                Err(e) => {
                    warn!(chunk = chunk_index, error = %e, "Skipping undecodable chunk");
                    self.end_chunk(
                        artifact,
                        ChunkOutcome::Failed {
                            reason: e.to_string(),
                        },
                    );
                    continue;
                }
            };

            let binding = self.next_binding();
            let started = match self
                .device
                .load(binding, audio, self.device_events.clone())
            {
                Ok(()) => {
                    self.device.set_playback_rate(self.rate);
                    self.device.play()
                }
                Err(e) => Err(e),
            };

            if let Err(e) = started {
                warn!(chunk = chunk_index, error = %e, "Device rejected chunk, skipping");
                self.device.unload();
                self.end_chunk(
                    artifact,
                    ChunkOutcome::Failed {
                        reason: e.to_string(),
                    },
                );
                continue;
            }

            debug!(chunk = chunk_index, %binding, "Chunk bound to device");
            self.current = Some(BoundEntry { binding, artifact });
            self.set_state(PlaybackState::Playing);
            return;
        }

        self.current = None;

        // A finished session starts counting afresh; a stream that ran dry
        // before its last chunk arrived keeps its position
        let complete = self
            .total_expected
            .map_or(true, |total| self.started >= total);
        if complete {
            self.started = 0;
            self.total_expected = None;
        }

        if self.state != PlaybackState::Idle {
            self.set_state(PlaybackState::Idle);
        }
    }

    async fn on_device_event(&mut self, event: DeviceEvent) {
        let is_current = self
            .current
            .as_ref()
            .map_or(false, |bound| bound.binding == event.binding);
        if !is_current {
            debug!(binding = %event.binding, "Ignoring event for detached binding");
            return;
        }
        let Some(bound) = self.current.take() else {
            return;
        };

        self.device.unload();
        let outcome = match event.kind {
            DeviceEventKind::Ended => ChunkOutcome::Completed,
            DeviceEventKind::Error(reason) => {
                let err = Error::PlaybackDevice(reason);
                warn!(chunk = bound.artifact.chunk_index(), error = %err, "Chunk playback failed");
                ChunkOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };
        self.end_chunk(bound.artifact, outcome);
        self.play_next().await;
    }

    async fn enqueue(&mut self, artifact: AudioArtifact, total_expected: Option<usize>) {
        if total_expected.is_some() {
            self.total_expected = total_expected;
        }
        debug!(chunk = artifact.chunk_index(), "Chunk appended to playback queue");
        self.pending.push_back(artifact);

        if matches!(self.state, PlaybackState::Idle | PlaybackState::Loading) {
            self.play_next().await;
        }
    }

    /// Hard reset: unbind, release everything, go idle
    fn stop(&mut self) {
        self.session += 1;

        if let Some(bound) = self.current.take() {
            self.device.unload();
            bound.artifact.release();
        }

        let dropped = self.pending.len();
        for artifact in self.pending.drain(..) {
            artifact.release();
        }
        if dropped > 0 {
            debug!(dropped, "Released queued chunks");
        }

        self.started = 0;
        self.total_expected = None;

        if self.state != PlaybackState::Idle {
            self.set_state(PlaybackState::Idle);
        }
    }
}

/// Decode for devices that want samples, on the blocking pool
async fn prepare_off_runtime(bytes: Vec<u8>, output_rate: Option<u32>) -> Result<ChunkAudio> {
    if output_rate.is_none() {
        return Ok(ChunkAudio::Wav(bytes));
    }
    tokio::task::spawn_blocking(move || ChunkAudio::prepare(bytes, output_rate))
        .await
        .map_err(|e| Error::Decode(format!("Decode task failed: {}", e)))?
}

/// Ordered playback of synthesized chunks on one device
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl PlaybackQueue {
    /// Create a queue that exclusively owns `device`
    ///
    /// Must be called inside a Tokio runtime: a task is spawned that feeds
    /// device events back into the queue. The task ends when the last
    /// clone of the queue is dropped.
    pub fn new(device: Box<dyn PlaybackDevice>, bus: EventBus) -> Self {
        let (device_events, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Mutex::new(QueueInner {
            state: PlaybackState::Idle,
            pending: VecDeque::new(),
            current: None,
            started: 0,
            total_expected: None,
            session: 0,
            next_binding: 0,
            rate: 1.0,
            device,
            device_events,
            bus,
        }));

        tokio::spawn(pump_device_events(Arc::downgrade(&inner), rx));

        Self { inner }
    }

    /// Begin a streaming session: empty queue in `Loading`
    ///
    /// Anything still playing is stopped first.
    pub async fn start_streaming(&self, total_expected: Option<usize>) -> SessionId {
        let mut inner = self.inner.lock().await;
        inner.stop();
        inner.total_expected = total_expected;
        inner.set_state(PlaybackState::Loading);
        info!(?total_expected, "Streaming playback session started");
        SessionId(inner.session)
    }

    /// Append to the tail; starts playback when `Idle` or `Loading`
    pub async fn append(&self, artifact: AudioArtifact, total_expected: Option<usize>) {
        self.inner.lock().await.enqueue(artifact, total_expected).await;
    }

    /// Append on behalf of `session`
    ///
    /// Returns false and releases the artifact if the session has since
    /// been stopped or replaced.
    pub async fn append_for(
        &self,
        session: SessionId,
        artifact: AudioArtifact,
        total_expected: Option<usize>,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.session != session.0 {
            debug!(
                chunk = artifact.chunk_index(),
                "Discarding chunk for a stopped session"
            );
            artifact.release();
            return false;
        }
        inner.enqueue(artifact, total_expected).await;
        true
    }

    /// Replace everything with a fixed list and play it
    pub async fn play_queue(&self, artifacts: Vec<AudioArtifact>) -> SessionId {
        let mut inner = self.inner.lock().await;
        inner.stop();
        inner.total_expected = Some(artifacts.len());
        inner.pending.extend(artifacts);
        inner.play_next().await;
        SessionId(inner.session)
    }

    /// `Playing -> Paused`; no-op in any other state
    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == PlaybackState::Playing && inner.current.is_some() {
            inner.device.pause();
            inner.set_state(PlaybackState::Paused);
        }
    }

    /// `Paused -> Playing`; no-op in any other state
    pub async fn resume(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != PlaybackState::Paused {
            return;
        }

        match inner.device.play() {
            Ok(()) => inner.set_state(PlaybackState::Playing),
            Err(e) => {
                warn!(error = %e, "Device failed to resume, skipping chunk");
                inner.device.unload();
                if let Some(bound) = inner.current.take() {
                    inner.end_chunk(
                        bound.artifact,
                        ChunkOutcome::Failed {
                            reason: e.to_string(),
                        },
                    );
                }
                inner.play_next().await;
            }
        }
    }

    pub async fn toggle_pause(&self) {
        let state = self.state().await;
        match state {
            PlaybackState::Playing => self.pause().await,
            PlaybackState::Paused => self.resume().await,
            PlaybackState::Idle | PlaybackState::Loading => {}
        }
    }

    /// Unbind the device, release every held artifact and go `Idle`
    ///
    /// Safe to call repeatedly.
    pub async fn stop(&self) {
        self.inner.lock().await.stop();
    }

    /// Playback rate multiplier for the current and following chunks
    pub async fn set_rate(&self, rate: f32) {
        let mut inner = self.inner.lock().await;
        inner.rate = rate;
        if inner.current.is_some() {
            inner.device.set_playback_rate(rate);
        }
    }

    pub async fn state(&self) -> PlaybackState {
        self.inner.lock().await.state
    }

    /// `Playing`, `Paused` or `Loading`
    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.state.is_active()
    }

    /// Entries waiting behind the bound one
    pub async fn len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.pending.is_empty()
    }

    /// Position of the bound chunk, if any
    pub async fn progress(&self) -> Option<ChunkProgress> {
        let inner = self.inner.lock().await;
        inner.current.as_ref().map(|_| inner.progress())
    }

    /// Chunk index bound to the device, if any
    pub async fn current_chunk(&self) -> Option<usize> {
        self.inner
            .lock()
            .await
            .current
            .as_ref()
            .map(|bound| bound.artifact.chunk_index())
    }
}

async fn pump_device_events(
    inner: Weak<Mutex<QueueInner>>,
    mut rx: mpsc::UnboundedReceiver<DeviceEvent>,
) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.lock().await.on_device_event(event).await;
    }
    debug!("Device event pump stopped");
}
