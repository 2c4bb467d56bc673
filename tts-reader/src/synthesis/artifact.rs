//! Temporary audio artifacts and their registry
//!
//! Every WAV file the engine produces is tracked in an [`ArtifactRegistry`]
//! shared by all engine configurations of one session. An [`AudioArtifact`]
//! owns one tracked file: it is released explicitly after playback, or on
//! drop if nobody released it first. Release is idempotent.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Audio container produced by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
}

/// Set of temporary files still owned by the session
#[derive(Debug, Clone, Default)]
pub struct ArtifactRegistry {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, path: &Path) {
        self.lock().insert(path.to_path_buf());
    }

    /// Remove a file and stop tracking it
    ///
    /// A missing file is not an error. Other removal failures are logged
    /// and swallowed; the path is untracked either way.
    pub fn release(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Released audio artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove audio artifact"),
        }
        self.lock().remove(path);
    }

    /// Release every tracked file
    pub fn release_all(&self) {
        let paths: Vec<PathBuf> = self.lock().drain().collect();
        if !paths.is_empty() {
            debug!(count = paths.len(), "Releasing all tracked artifacts");
        }
        for path in paths {
            self.release(&path);
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        // The set stays consistent even if a holder panicked mid-operation
        self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One synthesized chunk on disk
///
/// Exclusively owned: the engine hands it to the orchestrator, which hands
/// it to the playback queue. Dropping an unreleased artifact releases it.
#[derive(Debug)]
pub struct AudioArtifact {
    chunk_index: usize,
    path: PathBuf,
    format: AudioFormat,
    registry: ArtifactRegistry,
    released: bool,
}

impl AudioArtifact {
    /// Wrap a file that is already tracked by `registry`
    pub fn new(chunk_index: usize, path: PathBuf, registry: ArtifactRegistry) -> Self {
        Self {
            chunk_index,
            path,
            format: AudioFormat::Wav,
            registry,
            released: false,
        }
    }

    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Delete the file now
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(&self.path);
        }
    }
}

impl Drop for AudioArtifact {
    fn drop(&mut self) {
        self.release_inner();
    }
}
