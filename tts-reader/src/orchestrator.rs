//! Pipeline orchestrator
//!
//! [`Reader`] turns text into queued audio: it segments the text, runs the
//! engine on each chunk strictly in order and hands every artifact to the
//! playback queue as soon as it exists, so the first chunk plays while the
//! rest are still being synthesized.
//!
//! At most one speak run is active. Starting a new run cancels the previous
//! one and waits for it to wind down before synthesizing, so the engine
//! never runs twice at once. Cancellation is cooperative: the token is
//! checked before each chunk and again when a synthesis returns.

use crate::error::{Error, Result};
use crate::playback::{PlaybackDevice, PlaybackQueue, SessionId};
use crate::synthesis::{BinaryProbe, EngineConfig, PiperEngine};
use crate::text::{segment, strip_markdown, TextChunk};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tts_common::events::{EventBus, PlaybackState, TtsEvent};
use tts_common::Settings;

/// Chunk budget used when exporting a whole text as one file
const EXPORT_CHUNK_SIZE: usize = 5000;

/// How often `wait_until_finished` re-checks without an event
const FINISH_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
}

/// Text-to-speech session: one engine, one playback queue
pub struct Reader {
    engine: RwLock<Arc<PiperEngine>>,
    queue: PlaybackQueue,
    bus: EventBus,
    settings: RwLock<Settings>,
    /// Token of the newest speak run
    active_run: Mutex<Option<ActiveRun>>,
    /// Held for the whole synthesis loop of a run
    run_lock: Mutex<()>,
    next_run_id: AtomicU64,
    synthesizing: AtomicBool,
}

impl Reader {
    /// Build a reader that plays through `device`
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(settings: Settings, device: Box<dyn PlaybackDevice>, bus: EventBus) -> Self {
        let engine = PiperEngine::new(EngineConfig::from_settings(&settings));
        let queue = PlaybackQueue::new(device, bus.clone());

        Self {
            engine: RwLock::new(Arc::new(engine)),
            queue,
            bus,
            settings: RwLock::new(settings),
            active_run: Mutex::new(None),
            run_lock: Mutex::new(()),
            next_run_id: AtomicU64::new(0),
            synthesizing: AtomicBool::new(false),
        }
    }

    /// Read `text` aloud
    ///
    /// Returns once every chunk has been synthesized and queued (playback
    /// may still be running), or once the run was cancelled.
    ///
    /// # Errors
    /// - `NoVoiceSelected` / `EmptyInput` before any work starts
    /// - `VoiceNotFound` / `SynthesisFailed` when a chunk cannot be
    ///   synthesized; playback is stopped and the run's audio released
    pub async fn speak(&self, text: &str) -> Result<()> {
        let settings = self.settings.read().await.clone();
        let voice = settings
            .voice_key()
            .ok_or(Error::NoVoiceSelected)?
            .to_string();
        let chunks = prepare_chunks(text, &settings, settings.chunk_size)?;

        let (run_id, cancel) = self.begin_run().await;
        let _run_guard = self.run_lock.lock().await;

        if cancel.is_cancelled() {
            debug!(run = run_id, "Run superseded before it started");
            self.end_run(run_id).await;
            return Ok(());
        }

        self.synthesizing.store(true, Ordering::SeqCst);
        let engine = self.engine.read().await.clone();

        self.queue.set_rate(settings.speed).await;
        let session = self.queue.start_streaming(Some(chunks.len())).await;

        info!(
            run = run_id,
            chunks = chunks.len(),
            voice = %voice,
            speed = settings.speed,
            "Starting speak run"
        );

        let result = self
            .synthesize_chunks(&engine, &chunks, &voice, settings.speed, session, &cancel)
            .await;

        self.synthesizing.store(false, Ordering::SeqCst);
        self.end_run(run_id).await;
        result
    }

    async fn synthesize_chunks(
        &self,
        engine: &PiperEngine,
        chunks: &[TextChunk],
        voice: &str,
        speed: f32,
        session: SessionId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // Appended chunks belong to the queue; only the chunk in hand is
        // released here
        let total = chunks.len();

        for chunk in chunks {
            if cancel.is_cancelled() {
                info!(at_chunk = chunk.index, "Speak run cancelled");
                return Ok(());
            }

            let artifact = match engine.synthesize(chunk.index, &chunk.text, voice, speed).await {
                Ok(artifact) => artifact,
                Err(e) => {
                    error!(chunk = chunk.index, error = %e, "Synthesis failed, aborting run");
                    self.queue.stop().await;
                    self.bus.emit_lossy(TtsEvent::RunFailed {
                        message: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    return Err(e);
                }
            };

            if cancel.is_cancelled() {
                info!(at_chunk = chunk.index, "Speak run cancelled during synthesis");
                artifact.release();
                return Ok(());
            }

            if !self.queue.append_for(session, artifact, Some(total)).await {
                info!(at_chunk = chunk.index, "Playback session ended, stopping run");
                return Ok(());
            }

            self.bus.emit_lossy(TtsEvent::ChunkSynthesized {
                chunk_index: chunk.index,
                total_chunks: total,
                timestamp: chrono::Utc::now(),
            });
        }

        debug!(chunks = total, "All chunks synthesized");
        Ok(())
    }

    /// Cancel whatever run is active, silence it, and register a new one
    ///
    /// Playback stops here rather than when the new run gets `run_lock`,
    /// which only happens once the old run's current piper call returns.
    async fn begin_run(&self) -> (u64, CancellationToken) {
        let id = self.next_run_id.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();

        let superseded = {
            let mut active = self.active_run.lock().await;
            let previous = active.replace(ActiveRun {
                id,
                cancel: cancel.clone(),
            });
            if let Some(previous) = &previous {
                debug!(previous = previous.id, "Cancelling previous speak run");
                previous.cancel.cancel();
            }
            previous.is_some()
        };

        if superseded {
            self.queue.stop().await;
        }

        (id, cancel)
    }

    async fn end_run(&self, run_id: u64) {
        let mut active = self.active_run.lock().await;
        if active.as_ref().map_or(false, |run| run.id == run_id) {
            *active = None;
        }
    }

    /// Synthesize `text` as one block and copy it to `destination`
    ///
    /// Bypasses chunked playback. Returns the written path.
    pub async fn export_single_file(&self, text: &str, destination: &Path) -> Result<PathBuf> {
        let settings = self.settings.read().await.clone();
        let voice = settings
            .voice_key()
            .ok_or(Error::NoVoiceSelected)?
            .to_string();
        let chunks = prepare_chunks(text, &settings, EXPORT_CHUNK_SIZE)?;
        let whole = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let engine = self.engine.read().await.clone();
        info!(chars = whole.chars().count(), destination = %destination.display(), "Exporting audio");

        let artifact = engine.synthesize(0, &whole, &voice, settings.speed).await?;

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::copy(artifact.path(), destination).await?;
        artifact.release();

        info!(destination = %destination.display(), "Export complete");
        Ok(destination.to_path_buf())
    }

    pub async fn pause(&self) {
        self.queue.pause().await;
    }

    pub async fn resume(&self) {
        self.queue.resume().await;
    }

    pub async fn toggle_pause(&self) {
        self.queue.toggle_pause().await;
    }

    /// Cancel the active run and stop playback; safe to repeat
    pub async fn stop(&self) {
        if let Some(run) = self.active_run.lock().await.as_ref() {
            debug!(run = run.id, "Stopping speak run");
            run.cancel.cancel();
        }
        self.queue.stop().await;
    }

    pub async fn state(&self) -> PlaybackState {
        self.queue.state().await
    }

    pub async fn is_active(&self) -> bool {
        self.queue.is_active().await
    }

    pub fn is_synthesizing(&self) -> bool {
        self.synthesizing.load(Ordering::SeqCst)
    }

    /// Resolve once nothing is being synthesized or played
    pub async fn wait_until_finished(&self) {
        let mut rx = self.bus.subscribe();
        loop {
            if !self.is_synthesizing() && !self.queue.is_active().await {
                return;
            }
            match tokio::time::timeout(FINISH_POLL_INTERVAL, rx.recv()).await {
                Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) | Err(_) => {}
                Ok(Err(broadcast::error::RecvError::Closed)) => return,
            }
        }
    }

    /// Stop everything and remove every temporary file of the session
    pub async fn shutdown(&self) {
        self.stop().await;
        self.engine.read().await.cleanup_all();
        info!("Reader shut down");
    }

    /// Apply new settings; engine paths take effect for the next run
    pub async fn reconfigure(&self, mut settings: Settings) {
        settings.normalize();
        let mut engine = self.engine.write().await;
        let config = EngineConfig::from_settings(&settings);
        if &config != engine.config() {
            info!(
                binary = %config.binary_path.display(),
                models = %config.models_dir.display(),
                "Engine reconfigured"
            );
            let next = Arc::new(engine.reconfigured(config));
            *engine = next;
        }
        *self.settings.write().await = settings;
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub async fn installed_voices(&self) -> Result<Vec<String>> {
        self.engine.read().await.installed_voices()
    }

    pub async fn test_binary(&self) -> BinaryProbe {
        let engine = self.engine.read().await.clone();
        engine.test_binary().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TtsEvent> {
        self.bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }
}

/// Strip markup if configured, reject empty text, segment
fn prepare_chunks(text: &str, settings: &Settings, max_chars: usize) -> Result<Vec<TextChunk>> {
    let text = if settings.strip_markdown {
        strip_markdown(text)
    } else {
        text.to_string()
    };

    let chunks = segment(&text, max_chars);
    if chunks.is_empty() {
        return Err(Error::EmptyInput);
    }
    Ok(chunks)
}

impl Drop for Reader {
    fn drop(&mut self) {
        if let Ok(engine) = self.engine.try_read() {
            let leftover = engine.registry().tracked_count();
            if leftover > 0 {
                warn!(leftover, "Reader dropped with audio still on disk, cleaning up");
                engine.cleanup_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(strip: bool) -> Settings {
        Settings {
            voice: "en_US-test-medium".to_string(),
            strip_markdown: strip,
            ..Settings::default()
        }
    }

    #[test]
    fn test_prepare_chunks_strips_markup() {
        let chunks = prepare_chunks("# Title\n\n**Bold** text.", &settings(true), 500).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Title\n\nBold text.");
    }

    #[test]
    fn test_prepare_chunks_markup_only_is_empty() {
        let err = prepare_chunks("```\ncode only\n```", &settings(true), 500).unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
    }

    #[test]
    fn test_prepare_chunks_keeps_markup_when_disabled() {
        let chunks = prepare_chunks("**Bold** text.", &settings(false), 500).unwrap();
        assert_eq!(chunks[0].text, "**Bold** text.");
    }

    #[test]
    fn test_prepare_chunks_whitespace_is_empty() {
        assert!(matches!(
            prepare_chunks("  \n\t ", &settings(false), 500),
            Err(Error::EmptyInput)
        ));
    }
}
