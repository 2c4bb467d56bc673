//! Persisted settings and config file resolution
//!
//! Settings live in a TOML file. Resolution priority for the file path:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/tts-reader/config.toml`)
//!
//! A missing file is not an error: built-in defaults are used and a warning
//! is logged. Out-of-range values are clamped on load.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "TTS_READER_CONFIG";

/// Allowed speech speed multipliers
pub const SPEED_RANGE: (f32, f32) = (0.5, 2.0);

/// Allowed chunk sizes in characters
pub const CHUNK_SIZE_RANGE: (usize, usize) = (100, 1500);

/// Persisted reader settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Path to the piper executable
    pub engine_binary: PathBuf,

    /// Directory holding `<voice>.onnx` and `<voice>.onnx.json`
    pub models_dir: PathBuf,

    /// Active voice key (empty = none selected)
    pub voice: String,

    /// Speech speed multiplier (0.5 - 2.0)
    pub speed: f32,

    /// Maximum characters per synthesis chunk (smaller = lower latency)
    pub chunk_size: usize,

    /// Remove markdown formatting before synthesis
    pub strip_markdown: bool,

    /// Output device name (None = system default)
    pub output_device: Option<String>,

    /// Wall-clock limit for one engine invocation
    pub synthesis_timeout_secs: u64,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            engine_binary: home.join(".local").join("bin").join("piper"),
            models_dir: home.join(".local").join("share").join("piper"),
            voice: String::new(),
            speed: 1.0,
            chunk_size: 500,
            strip_markdown: true,
            output_device: None,
            synthesis_timeout_secs: 60,
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let mut settings: Settings = toml::from_str(&content)?;
        settings.normalize();
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Write settings to a TOML file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Clamp out-of-range values into their allowed ranges
    pub fn normalize(&mut self) {
        if !self.speed.is_finite() || self.speed < SPEED_RANGE.0 || self.speed > SPEED_RANGE.1 {
            let clamped = if self.speed.is_finite() {
                self.speed.clamp(SPEED_RANGE.0, SPEED_RANGE.1)
            } else {
                1.0
            };
            warn!("speed {} out of range, using {}", self.speed, clamped);
            self.speed = clamped;
        }

        if self.chunk_size < CHUNK_SIZE_RANGE.0 || self.chunk_size > CHUNK_SIZE_RANGE.1 {
            let clamped = self.chunk_size.clamp(CHUNK_SIZE_RANGE.0, CHUNK_SIZE_RANGE.1);
            warn!("chunk_size {} out of range, using {}", self.chunk_size, clamped);
            self.chunk_size = clamped;
        }

        if self.synthesis_timeout_secs == 0 {
            warn!("synthesis_timeout_secs must be positive, using 60");
            self.synthesis_timeout_secs = 60;
        }

        self.voice = self.voice.trim().to_string();
    }

    /// Active voice, if one is selected
    pub fn voice_key(&self) -> Option<&str> {
        if self.voice.is_empty() {
            None
        } else {
            Some(&self.voice)
        }
    }

    /// Update a single setting from its string form (`config set KEY VALUE`)
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .parse()
                .map_err(|_| Error::InvalidInput(format!("Invalid value for {}: {}", key, value)))
        }

        match key {
            "engine_binary" => self.engine_binary = PathBuf::from(value),
            "models_dir" => self.models_dir = PathBuf::from(value),
            "voice" => self.voice = value.to_string(),
            "speed" => self.speed = parse(key, value)?,
            "chunk_size" => self.chunk_size = parse(key, value)?,
            "strip_markdown" => self.strip_markdown = parse(key, value)?,
            "output_device" => {
                self.output_device = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "synthesis_timeout_secs" => self.synthesis_timeout_secs = parse(key, value)?,
            "logging.level" => self.logging.level = value.to_string(),
            other => return Err(Error::InvalidInput(format!("Unknown setting: {}", other))),
        }

        self.normalize();
        Ok(())
    }
}

/// Resolve the config file path following the priority order above
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path()
}

/// Get default configuration file path for the platform
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("tts-reader").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Get the cache directory used for the voice catalog
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("tts-reader"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.speed, 1.0);
        assert_eq!(settings.chunk_size, 500);
        assert!(settings.strip_markdown);
        assert!(settings.voice_key().is_none());
        assert_eq!(settings.synthesis_timeout_secs, 60);
        assert!(settings.engine_binary.ends_with("piper"));
    }

    #[test]
    fn test_normalize_clamps() {
        let mut settings = Settings {
            speed: 5.0,
            chunk_size: 10,
            synthesis_timeout_secs: 0,
            voice: "  en_US-amy-medium ".to_string(),
            ..Settings::default()
        };
        settings.normalize();
        assert_eq!(settings.speed, 2.0);
        assert_eq!(settings.chunk_size, 100);
        assert_eq!(settings.synthesis_timeout_secs, 60);
        assert_eq!(settings.voice_key(), Some("en_US-amy-medium"));

        settings.speed = f32::NAN;
        settings.normalize();
        assert_eq!(settings.speed, 1.0);
    }

    #[test]
    fn test_set_field() {
        let mut settings = Settings::default();
        settings.set_field("speed", "1.5").unwrap();
        settings.set_field("voice", "de_DE-thorsten-high").unwrap();
        settings.set_field("strip_markdown", "false").unwrap();
        settings.set_field("output_device", "").unwrap();

        assert_eq!(settings.speed, 1.5);
        assert_eq!(settings.voice, "de_DE-thorsten-high");
        assert!(!settings.strip_markdown);
        assert!(settings.output_device.is_none());

        assert!(settings.set_field("speed", "fast").is_err());
        assert!(settings.set_field("volume", "1").is_err());
    }
}
