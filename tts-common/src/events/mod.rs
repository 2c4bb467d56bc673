//! Event types for the tts-reader event system
//!
//! Provides shared event definitions and the EventBus used between the
//! playback queue, the synthesis orchestrator and any status observers.

mod playback_types;

pub use playback_types::{ChunkOutcome, ChunkProgress, PlaybackState};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// tts-reader event types
///
/// Events are broadcast via EventBus. State changes are emitted by the
/// playback queue while it still holds its lock, so subscribers observe
/// transitions in the order they happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TtsEvent {
    /// Playback state changed
    ///
    /// Triggers:
    /// - Status reporter: redraw label and chunk counter
    PlaybackStateChanged {
        /// State before the transition
        old_state: PlaybackState,
        /// State after the transition
        new_state: PlaybackState,
        /// Chunk position, present for Playing and Paused
        progress: Option<ChunkProgress>,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A chunk left the playback device (played out or failed)
    ///
    /// Fired on every queue advance so observers can clean up keyed by
    /// the artifact path.
    ChunkEnded {
        /// Segmenter index of the chunk
        chunk_index: usize,
        /// Location of the released audio artifact
        artifact: PathBuf,
        /// Completed or failed
        outcome: ChunkOutcome,
        /// When the chunk ended
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A chunk finished synthesis and was handed to the queue
    ChunkSynthesized {
        /// Segmenter index of the chunk
        chunk_index: usize,
        /// Number of chunks in the run
        total_chunks: usize,
        /// When synthesis completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A speak run aborted with a terminal error
    ///
    /// Emitted exactly once per failed run.
    RunFailed {
        /// Human-readable failure
        message: String,
        /// When the run failed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Voice model download progress
    VoiceDownloadProgress {
        /// Catalog key of the voice being downloaded
        voice_key: String,
        /// Bytes written so far
        bytes_received: u64,
        /// Expected size in bytes
        total_bytes: u64,
        /// Rounded percentage (0-100)
        percent: u8,
        /// When progress was measured
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl TtsEvent {
    /// Build a `PlaybackStateChanged` event stamped with the current time
    pub fn state_changed(
        old_state: PlaybackState,
        new_state: PlaybackState,
        progress: Option<ChunkProgress>,
    ) -> Self {
        TtsEvent::PlaybackStateChanged {
            old_state,
            new_state,
            progress,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Build a `ChunkEnded` event stamped with the current time
    pub fn chunk_ended(chunk_index: usize, artifact: PathBuf, outcome: ChunkOutcome) -> Self {
        TtsEvent::ChunkEnded {
            chunk_index,
            artifact,
            outcome,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Event type name (matches the serde tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            TtsEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            TtsEvent::ChunkEnded { .. } => "ChunkEnded",
            TtsEvent::ChunkSynthesized { .. } => "ChunkSynthesized",
            TtsEvent::RunFailed { .. } => "RunFailed",
            TtsEvent::VoiceDownloadProgress { .. } => "VoiceDownloadProgress",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use tts_common::events::{EventBus, PlaybackState, TtsEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(TtsEvent::state_changed(
///     PlaybackState::Idle,
///     PlaybackState::Loading,
///     None,
/// ));
///
/// assert!(matches!(
///     rx.try_recv(),
///     Ok(TtsEvent::PlaybackStateChanged { new_state: PlaybackState::Loading, .. })
/// ));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TtsEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TtsEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: TtsEvent,
    ) -> Result<usize, broadcast::error::SendError<TtsEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TtsEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
