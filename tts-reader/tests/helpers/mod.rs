//! Test helpers for tts-reader integration tests
//!
//! - MockDevice: scripted playback device recording what the queue binds
//! - fake_piper: shell script standing in for the piper binary
//! - file_server: local HTTP server standing in for the voice repository
//! - Event helpers that wait on the EventBus with a timeout

#![allow(dead_code)]

pub mod fake_piper;
pub mod file_server;
pub mod mock_device;

pub use fake_piper::{FakePiper, TEST_VOICE};
pub use file_server::{FileServer, Route};
pub use mock_device::{MockDevice, MockHandle};

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use tts_common::events::{ChunkOutcome, PlaybackState, TtsEvent};
use tts_reader::synthesis::{ArtifactRegistry, AudioArtifact};

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(2);

/// Write `contents` to a tracked file and wrap it as chunk `index`
pub fn artifact(
    dir: &Path,
    registry: &ArtifactRegistry,
    index: usize,
    contents: &str,
) -> AudioArtifact {
    let path = dir.join(format!("chunk-{}.wav", index));
    std::fs::write(&path, contents).unwrap();
    registry.track(&path);
    AudioArtifact::new(index, path, registry.clone())
}

/// Next state transition on the bus
pub async fn next_state(rx: &mut broadcast::Receiver<TtsEvent>) -> PlaybackState {
    loop {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a state change")
            .expect("event bus closed");
        if let TtsEvent::PlaybackStateChanged { new_state, .. } = event {
            return new_state;
        }
    }
}

/// Consume transitions until `state` is reached; returns everything seen
pub async fn wait_for_state(
    rx: &mut broadcast::Receiver<TtsEvent>,
    state: PlaybackState,
) -> Vec<PlaybackState> {
    let mut seen = Vec::new();
    loop {
        let next = next_state(rx).await;
        seen.push(next);
        if next == state {
            return seen;
        }
    }
}

/// Next `ChunkEnded` on the bus as (chunk index, artifact path, outcome)
pub async fn next_chunk_ended(
    rx: &mut broadcast::Receiver<TtsEvent>,
) -> (usize, PathBuf, ChunkOutcome) {
    loop {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a chunk to end")
            .expect("event bus closed");
        if let TtsEvent::ChunkEnded {
            chunk_index,
            artifact,
            outcome,
            ..
        } = event
        {
            return (chunk_index, artifact, outcome);
        }
    }
}

/// Everything currently buffered on the receiver
pub fn drain(rx: &mut broadcast::Receiver<TtsEvent>) -> Vec<TtsEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll `condition` every 10ms until it holds or [`WAIT`] elapses
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {:?}",
            WAIT
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
