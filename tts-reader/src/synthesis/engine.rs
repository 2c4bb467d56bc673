//! Piper engine invocation
//!
//! Runs the external `piper` executable once per chunk:
//!
//! ```text
//! piper -m <voice>.onnx -c <voice>.onnx.json -f <out.wav> --length-scale <x.xx>
//! ```
//!
//! with the chunk text on standard input. The produced WAV lands at a fresh
//! temporary path and is returned as an [`AudioArtifact`] tracked by the
//! engine's [`ArtifactRegistry`].

use super::artifact::{ArtifactRegistry, AudioArtifact};
use super::voice::{installed_voices, resolve_voice};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};
use tts_common::Settings;

/// Default wall-clock limit for one invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Limit for the `--help` reachability probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine location and limits
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub binary_path: PathBuf,
    pub models_dir: PathBuf,
    pub timeout: Duration,
}

impl EngineConfig {
    pub fn new(binary_path: impl Into<PathBuf>, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            models_dir: models_dir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.engine_binary, &settings.models_dir)
            .with_timeout(Duration::from_secs(settings.synthesis_timeout_secs))
    }
}

/// Result of probing the engine binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryProbe {
    /// `--help` ran and exited successfully
    Reachable,
    /// The binary exists but the probe failed
    Errored(String),
    /// Nothing executable at the configured path
    NotFound,
}

impl BinaryProbe {
    /// Anything but a missing binary counts as installed
    pub fn is_reachable(&self) -> bool {
        !matches!(self, BinaryProbe::NotFound)
    }
}

/// Piper synthesis engine
///
/// Holds no mutable configuration: changing paths means building a new
/// engine with [`PiperEngine::reconfigured`], which keeps the registry so
/// earlier artifacts can still be cleaned up.
#[derive(Debug, Clone)]
pub struct PiperEngine {
    config: EngineConfig,
    registry: ArtifactRegistry,
}

impl PiperEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: ArtifactRegistry::new(),
        }
    }

    /// New engine for `config` sharing this engine's artifact registry
    pub fn reconfigured(&self, config: EngineConfig) -> Self {
        Self {
            config,
            registry: self.registry.clone(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }

    pub fn installed_voices(&self) -> Result<Vec<String>> {
        installed_voices(&self.config.models_dir)
    }

    /// Synthesize one chunk of text to a temporary WAV file
    ///
    /// # Errors
    /// - `VoiceNotFound` before the engine runs if the voice is not installed
    /// - `SynthesisFailed` on spawn failure, non-zero exit, timeout or a
    ///   missing output file
    pub async fn synthesize(
        &self,
        chunk_index: usize,
        text: &str,
        voice_key: &str,
        speed: f32,
    ) -> Result<AudioArtifact> {
        let voice = resolve_voice(&self.config.models_dir, voice_key)?;
        let length_scale = length_scale(speed)?;

        let output = std::env::temp_dir().join(format!("piper-tts-{}.wav", uuid::Uuid::new_v4()));
        self.registry.track(&output);

        debug!(
            chunk = chunk_index,
            chars = text.chars().count(),
            voice = voice_key,
            length_scale = %length_scale,
            output = %output.display(),
            "Running piper"
        );

        let mut command = Command::new(&self.config.binary_path);
        command
            .arg("-m")
            .arg(&voice.model)
            .arg("-c")
            .arg(&voice.config)
            .arg("-f")
            .arg(&output)
            .arg("--length-scale")
            .arg(&length_scale)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.config.timeout, run_with_input(command, text)).await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                self.registry.release(&output);
                return Err(Error::SynthesisFailed(reason));
            }
            Err(_) => {
                // Dropping the future killed the child
                self.registry.release(&output);
                return Err(Error::SynthesisFailed(format!(
                    "piper timed out after {}s",
                    self.config.timeout.as_secs_f32()
                )));
            }
        }

        if !output.is_file() {
            self.registry.release(&output);
            return Err(Error::SynthesisFailed(
                "piper exited successfully but wrote no audio".to_string(),
            ));
        }

        debug!(chunk = chunk_index, output = %output.display(), "Chunk synthesized");
        Ok(AudioArtifact::new(chunk_index, output, self.registry.clone()))
    }

    /// Remove one temporary file; missing files are fine
    pub fn cleanup_file(&self, path: &Path) {
        self.registry.release(path);
    }

    /// Remove every temporary file this session still tracks
    pub fn cleanup_all(&self) {
        let count = self.registry.tracked_count();
        if count > 0 {
            info!(count, "Cleaning up synthesized audio");
        }
        self.registry.release_all();
    }

    /// Check that the configured binary can be executed
    pub async fn test_binary(&self) -> BinaryProbe {
        let mut command = Command::new(&self.config.binary_path);
        command
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BinaryProbe::NotFound,
            Err(e) => return BinaryProbe::Errored(e.to_string()),
        };

        match tokio::time::timeout(PROBE_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => BinaryProbe::Reachable,
            Ok(Ok(output)) => BinaryProbe::Errored(format!("--help exited with {}", output.status)),
            Ok(Err(e)) => BinaryProbe::Errored(e.to_string()),
            Err(_) => BinaryProbe::Errored("--help timed out".to_string()),
        }
    }
}

/// `1 / speed` with two decimals, the form piper expects
fn length_scale(speed: f32) -> Result<String> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(Error::SynthesisFailed(format!("invalid speed: {}", speed)));
    }
    Ok(format!("{:.2}", 1.0 / speed))
}

/// Spawn, feed `text` on stdin, wait for a successful exit
async fn run_with_input(mut command: Command, text: &str) -> std::result::Result<(), String> {
    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            "piper binary not found".to_string()
        } else {
            format!("failed to start piper: {}", e)
        }
    })?;

    // Piper logs to stderr while it reads, so stdin is fed while the
    // output pipes drain
    let stdin = child.stdin.take();
    let feed = async move {
        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.write_all(text.as_bytes()).await {
                // The exit status carries the real failure
                warn!(error = %e, "Failed to write text to piper stdin");
            }
            // Closing stdin signals end of input
            drop(stdin);
        }
    };

    let ((), output) = tokio::join!(feed, child.wait_with_output());
    let output = output.map_err(|e| format!("failed to wait for piper: {}", e))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        if detail.is_empty() {
            Err(format!("piper exited with {}", output.status))
        } else {
            Err(format!("piper exited with {}: {}", output.status, detail))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_scale_formatting() {
        assert_eq!(length_scale(1.0).unwrap(), "1.00");
        assert_eq!(length_scale(2.0).unwrap(), "0.50");
        assert_eq!(length_scale(0.5).unwrap(), "2.00");
        assert_eq!(length_scale(1.5).unwrap(), "0.67");
    }

    #[test]
    fn test_length_scale_rejects_bad_speed() {
        assert!(length_scale(0.0).is_err());
        assert!(length_scale(-1.0).is_err());
        assert!(length_scale(f32::NAN).is_err());
        assert!(length_scale(f32::INFINITY).is_err());
    }

    #[test]
    fn test_reconfigured_shares_registry() {
        let engine = PiperEngine::new(EngineConfig::new("/usr/bin/piper", "/tmp/voices"));
        let other = engine.reconfigured(
            EngineConfig::new("/opt/piper", "/srv/voices").with_timeout(Duration::from_secs(5)),
        );

        let path = std::env::temp_dir().join("piper-tts-registry-share.wav");
        engine.registry().track(&path);
        assert!(other.registry().is_tracked(&path));
        other.cleanup_file(&path);
        assert_eq!(engine.registry().tracked_count(), 0);

        assert_eq!(other.config().timeout, Duration::from_secs(5));
        assert_eq!(engine.config().timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_unknown_voice_fails_before_spawn() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = PiperEngine::new(EngineConfig::new("/nonexistent/piper", dir.path()));

        let err = engine.synthesize(0, "Hello.", "en_US-none-low", 1.0).await.unwrap_err();
        assert!(matches!(err, Error::VoiceNotFound(_)));
        assert_eq!(engine.registry().tracked_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_binary_probe() {
        let engine = PiperEngine::new(EngineConfig::new("/nonexistent/piper", "/tmp"));
        assert_eq!(engine.test_binary().await, BinaryProbe::NotFound);
        assert!(!BinaryProbe::NotFound.is_reachable());
        assert!(BinaryProbe::Errored("x".into()).is_reachable());
    }
}
