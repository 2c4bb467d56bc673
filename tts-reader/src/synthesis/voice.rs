//! Voice resolution
//!
//! A voice key `en_US-amy-medium` maps to a model/config pair inside the
//! models directory: `en_US-amy-medium.onnx` and `en_US-amy-medium.onnx.json`.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

const MODEL_EXT: &str = ".onnx";
const CONFIG_EXT: &str = ".onnx.json";

/// Installed model/config pair for one voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceFiles {
    pub model: PathBuf,
    pub config: PathBuf,
}

pub fn model_path(models_dir: &Path, voice_key: &str) -> PathBuf {
    models_dir.join(format!("{}{}", voice_key, MODEL_EXT))
}

pub fn config_path(models_dir: &Path, voice_key: &str) -> PathBuf {
    models_dir.join(format!("{}{}", voice_key, CONFIG_EXT))
}

/// Resolve a voice key to its files; both must exist.
pub fn resolve_voice(models_dir: &Path, voice_key: &str) -> Result<VoiceFiles> {
    let model = model_path(models_dir, voice_key);
    let config = config_path(models_dir, voice_key);

    if voice_key.is_empty() || !model.is_file() || !config.is_file() {
        return Err(Error::VoiceNotFound(voice_key.to_string()));
    }

    Ok(VoiceFiles { model, config })
}

/// Keys of every voice with a model file in `models_dir`, sorted
///
/// A missing directory yields an empty list.
pub fn installed_voices(models_dir: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(models_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut keys = Vec::new();
    for entry in entries {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if let Some(key) = name.strip_suffix(MODEL_EXT) {
            if !key.is_empty() {
                keys.push(key.to_string());
            }
        }
    }
    keys.sort();
    Ok(keys)
}
