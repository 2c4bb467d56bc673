//! Piper voice catalog client
//!
//! Fetches `voices.json` from the rhasspy/piper-voices repository on
//! Hugging Face. Results are cached in memory and in the cache directory
//! for 24 hours.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const VOICES_JSON_URL: &str =
    "https://huggingface.co/rhasspy/piper-voices/resolve/v1.0.0/voices.json";
pub const HF_BASE: &str = "https://huggingface.co/rhasspy/piper-voices/resolve/v1.0.0";

pub(crate) const USER_AGENT: &str = concat!("tts-reader/", env!("CARGO_PKG_VERSION"));

const CACHE_TTL_HOURS: i64 = 24;
const CACHE_FILE: &str = "voices.json";

/// Size and checksum of one file of a voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceFile {
    pub size_bytes: u64,
    pub md5_digest: String,
}

/// One downloadable voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceEntry {
    pub key: String,
    pub name: String,
    pub language_code: String,
    pub language_english: String,
    pub country_english: String,
    /// x_low, low, medium or high
    pub quality: String,
    pub num_speakers: u32,
    /// Repository-relative path to file info
    pub files: BTreeMap<String, VoiceFile>,
}

impl VoiceEntry {
    /// Repository path of the `.onnx` model
    pub fn model_file(&self) -> Option<&str> {
        self.files
            .keys()
            .map(String::as_str)
            .find(|p| p.ends_with(".onnx"))
    }

    /// Repository path of the `.onnx.json` config
    pub fn config_file(&self) -> Option<&str> {
        self.files
            .keys()
            .map(String::as_str)
            .find(|p| p.ends_with(".onnx.json"))
    }
}

// voices.json as published
#[derive(Deserialize)]
struct RawVoice {
    key: String,
    name: String,
    language: RawLanguage,
    quality: String,
    num_speakers: u32,
    files: BTreeMap<String, VoiceFile>,
}

#[derive(Deserialize)]
struct RawLanguage {
    code: String,
    name_english: String,
    country_english: String,
}

impl From<RawVoice> for VoiceEntry {
    fn from(raw: RawVoice) -> Self {
        Self {
            key: raw.key,
            name: raw.name,
            language_code: raw.language.code,
            language_english: raw.language.name_english,
            country_english: raw.language.country_english,
            quality: raw.quality,
            num_speakers: raw.num_speakers,
            files: raw.files,
        }
    }
}

/// Parse a published `voices.json` document, sorted by key
pub fn parse_catalog(json: &str) -> Result<Vec<VoiceEntry>> {
    let raw: HashMap<String, RawVoice> = serde_json::from_str(json)
        .map_err(|e| Error::DownloadFailed(format!("Invalid voice catalog: {}", e)))?;

    let mut voices: Vec<VoiceEntry> = raw.into_values().map(VoiceEntry::from).collect();
    voices.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(voices)
}

/// Download locations for a voice's model and config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadUrls {
    pub model_url: String,
    pub config_url: String,
    pub model_path: String,
    pub config_path: String,
}

pub fn download_urls(entry: &VoiceEntry) -> Option<DownloadUrls> {
    download_urls_from(entry, HF_BASE)
}

/// Like [`download_urls`] against another repository root
pub fn download_urls_from(entry: &VoiceEntry, base: &str) -> Option<DownloadUrls> {
    let model_path = entry.model_file()?;
    let config_path = entry.config_file()?;
    let base = base.trim_end_matches('/');
    Some(DownloadUrls {
        model_url: format!("{}/{}", base, model_path),
        config_url: format!("{}/{}", base, config_path),
        model_path: model_path.to_string(),
        config_path: config_path.to_string(),
    })
}

/// Model download size in MiB
pub fn model_size_mb(entry: &VoiceEntry) -> Option<f64> {
    let path = entry.model_file()?;
    let bytes = entry.files.get(path)?.size_bytes;
    Some(bytes as f64 / (1024.0 * 1024.0))
}

/// Distinct English language names, sorted
pub fn unique_languages(entries: &[VoiceEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|v| v.language_english.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Voices whose language name or code matches `language`
///
/// Case-insensitive. `en` matches every `en_*` code.
pub fn filter_by_language<'a>(entries: &'a [VoiceEntry], language: &str) -> Vec<&'a VoiceEntry> {
    let wanted = language.to_lowercase();
    entries
        .iter()
        .filter(|v| {
            let code = v.language_code.to_lowercase();
            v.language_english.to_lowercase() == wanted
                || code == wanted
                || code.split('_').next() == Some(wanted.as_str())
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedCatalog {
    fetched_at: DateTime<Utc>,
    voices: Vec<VoiceEntry>,
}

impl CachedCatalog {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        age >= chrono::Duration::zero() && age < chrono::Duration::hours(CACHE_TTL_HOURS)
    }
}

/// Voice catalog client
pub struct CatalogClient {
    http_client: reqwest::Client,
    url: String,
    cache_dir: Option<PathBuf>,
    memory: Mutex<Option<CachedCatalog>>,
}

impl CatalogClient {
    /// Client for the public catalog, caching under `cache_dir` if given
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::DownloadFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            url: VOICES_JSON_URL.to_string(),
            cache_dir,
            memory: Mutex::new(None),
        })
    }

    /// Fetch from another `voices.json` location
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// All voices, from cache when fresh unless `force_refresh`
    pub async fn fetch(&self, force_refresh: bool) -> Result<Vec<VoiceEntry>> {
        let now = Utc::now();
        let mut memory = self.memory.lock().await;

        if !force_refresh {
            if let Some(cached) = memory.as_ref().filter(|c| c.is_fresh(now)) {
                debug!("Voice catalog served from memory");
                return Ok(cached.voices.clone());
            }
            if let Some(cached) = self.read_disk_cache().await.filter(|c| c.is_fresh(now)) {
                debug!("Voice catalog served from disk cache");
                let voices = cached.voices.clone();
                *memory = Some(cached);
                return Ok(voices);
            }
        }

        info!(url = %self.url, "Fetching voice catalog");
        let response = self.http_client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::DownloadFailed(format!(
                "Failed to fetch voice catalog: {}",
                status
            )));
        }

        let body = response.text().await?;
        let voices = parse_catalog(&body)?;
        info!(voices = voices.len(), "Voice catalog fetched");

        let cached = CachedCatalog {
            fetched_at: now,
            voices: voices.clone(),
        };
        self.write_disk_cache(&cached).await;
        *memory = Some(cached);

        Ok(voices)
    }

    fn cache_path(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(CACHE_FILE))
    }

    async fn read_disk_cache(&self) -> Option<CachedCatalog> {
        let path = self.cache_path()?;
        let content = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt catalog cache");
                None
            }
        }
    }

    async fn write_disk_cache(&self, cached: &CachedCatalog) {
        let Some(path) = self.cache_path() else {
            return;
        };
        if let Err(e) = write_cache_file(&path, cached).await {
            warn!(path = %path.display(), error = %e, "Failed to write catalog cache");
        }
    }
}

async fn write_cache_file(path: &Path, cached: &CachedCatalog) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string(cached)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    tokio::fs::write(path, json).await
}
