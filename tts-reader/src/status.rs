//! Status reporting
//!
//! Renders playback state and progress events as a one-line status label.

use std::io::Write;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;
use tts_common::events::{ChunkProgress, PlaybackState, TtsEvent};

/// Label for a state; empty when idle
///
/// The chunk counter is only shown for runs with more than one chunk.
pub fn status_label(state: PlaybackState, progress: Option<ChunkProgress>) -> String {
    let counter = match progress {
        Some(p) if p.total > 1 => format!(" ({}/{})", p.current, p.total),
        _ => String::new(),
    };

    match state {
        PlaybackState::Idle => String::new(),
        PlaybackState::Loading => "Synthesizing…".to_string(),
        PlaybackState::Playing => format!("Playing{}", counter),
        PlaybackState::Paused => format!("Paused{}", counter),
    }
}

/// Print status changes to stderr until the bus closes
pub fn spawn_reporter(mut rx: broadcast::Receiver<TtsEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = String::new();
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Status reporter lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                TtsEvent::PlaybackStateChanged {
                    new_state, progress, ..
                } => {
                    let label = status_label(new_state, progress);
                    if label != last {
                        render(&label);
                        last = label;
                    }
                }
                TtsEvent::RunFailed { message, .. } => {
                    // The caller reports the error itself
                    debug!(%message, "Run failed");
                    render("");
                    last.clear();
                }
                TtsEvent::VoiceDownloadProgress {
                    voice_key, percent, ..
                } => {
                    let label = format!("Downloading {}: {}%", voice_key, percent);
                    if label != last {
                        render(&label);
                        last = label;
                    }
                }
                TtsEvent::ChunkEnded { .. } | TtsEvent::ChunkSynthesized { .. } => {}
            }
        }
    })
}

fn render(label: &str) {
    let mut stderr = std::io::stderr().lock();
    // Clear the line, then draw the new label in place
    let _ = write!(stderr, "\r\x1b[2K{}", label);
    let _ = stderr.flush();
}
