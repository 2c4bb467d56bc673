//! Voice model download
//!
//! Installs a catalog voice as `<key>.onnx` and `<key>.onnx.json` in the
//! models directory. Each file is streamed to a `.part` sibling and renamed
//! into place once complete, so an interrupted download never looks like
//! an installed voice.

use super::client::{download_urls_from, VoiceEntry, HF_BASE, USER_AGENT};
use crate::error::{Error, Result};
use crate::synthesis::voice::{config_path, model_path};
use futures::StreamExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use tts_common::events::{EventBus, TtsEvent};

/// Bytes written so far for the file being downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub bytes: u64,
    pub total: u64,
    /// Rounded, 0-100
    pub percent: u8,
}

impl DownloadProgress {
    fn new(bytes: u64, total: u64) -> Self {
        let percent = if total == 0 {
            0
        } else {
            ((bytes as f64 / total as f64) * 100.0).round().min(100.0) as u8
        };
        Self {
            bytes,
            total,
            percent,
        }
    }
}

/// Both files of `voice_key` are present in `models_dir`
pub fn is_voice_installed(voice_key: &str, models_dir: &Path) -> bool {
    model_path(models_dir, voice_key).is_file() && config_path(models_dir, voice_key).is_file()
}

/// Downloads voices from the piper-voices repository
pub struct VoiceDownloader {
    http_client: reqwest::Client,
    base_url: String,
    bus: Option<EventBus>,
}

impl VoiceDownloader {
    pub fn new() -> Result<Self> {
        // Models are tens of megabytes: bound connecting, not the transfer
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::DownloadFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: HF_BASE.to_string(),
            bus: None,
        })
    }

    /// Download from another repository root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Also publish `VoiceDownloadProgress` events on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Download the model, then the config, into `models_dir`
    ///
    /// `on_progress` sees the model download, which is nearly all of the
    /// transfer.
    pub async fn download_voice<F>(
        &self,
        voice: &VoiceEntry,
        models_dir: &Path,
        mut on_progress: F,
    ) -> Result<()>
    where
        F: FnMut(DownloadProgress),
    {
        let urls = download_urls_from(voice, &self.base_url).ok_or_else(|| {
            Error::DownloadFailed(format!("Cannot resolve download URLs for {}", voice.key))
        })?;

        tokio::fs::create_dir_all(models_dir).await?;

        let model_total = voice
            .files
            .get(&urls.model_path)
            .map(|f| f.size_bytes)
            .unwrap_or(0);

        info!(voice = %voice.key, models_dir = %models_dir.display(), "Downloading voice");

        let mut report = |progress: DownloadProgress| {
            on_progress(progress);
            if let Some(bus) = &self.bus {
                bus.emit_lossy(TtsEvent::VoiceDownloadProgress {
                    voice_key: voice.key.clone(),
                    bytes_received: progress.bytes,
                    total_bytes: progress.total,
                    percent: progress.percent,
                    timestamp: chrono::Utc::now(),
                });
            }
        };

        self.download_file(
            &urls.model_url,
            &model_path(models_dir, &voice.key),
            model_total,
            Some(&mut report),
        )
        .await?;

        self.download_file(
            &urls.config_url,
            &config_path(models_dir, &voice.key),
            0,
            None,
        )
        .await?;

        info!(voice = %voice.key, "Voice installed");
        Ok(())
    }

    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        expected_total: u64,
        on_progress: Option<&mut dyn FnMut(DownloadProgress)>,
    ) -> Result<()> {
        let part = part_path(dest);

        let result = self
            .stream_to_file(url, &part, expected_total, on_progress)
            .await;
        if let Err(e) = result {
            if let Err(remove_err) = tokio::fs::remove_file(&part).await {
                if remove_err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %part.display(), error = %remove_err, "Failed to remove partial download");
                }
            }
            return Err(e);
        }

        tokio::fs::rename(&part, dest).await?;
        debug!(dest = %dest.display(), "Download complete");
        Ok(())
    }

    async fn stream_to_file(
        &self,
        url: &str,
        part: &Path,
        expected_total: u64,
        mut on_progress: Option<&mut dyn FnMut(DownloadProgress)>,
    ) -> Result<()> {
        debug!(url, "Downloading file");
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::DownloadFailed(format!(
                "Download failed {}: {}",
                status, url
            )));
        }

        let total = if expected_total > 0 {
            expected_total
        } else {
            response.content_length().unwrap_or(0)
        };

        let mut file = tokio::fs::File::create(part).await?;
        let mut stream = response.bytes_stream();
        let mut received = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;

            if total > 0 {
                if let Some(report) = on_progress.as_mut() {
                    report(DownloadProgress::new(received, total));
                }
            }
        }

        file.flush().await?;
        Ok(())
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}
