//! Playback-related type definitions
//!
//! Supporting types for the playback state machine and per-chunk lifecycle.

use serde::{Deserialize, Serialize};

/// Playback state enumeration
///
/// Exactly one value at any instant:
/// - `Idle`: nothing bound to the device, queue empty
/// - `Loading`: streaming session active, waiting for the first chunk
/// - `Playing` / `Paused`: a chunk is bound to the device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
}

impl PlaybackState {
    /// True for `Playing`, `Paused` and `Loading`
    pub fn is_active(self) -> bool {
        !matches!(self, PlaybackState::Idle)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Chunk position within the current playback session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkProgress {
    /// 1-based position of the bound chunk
    pub current: usize,
    /// Expected chunk count, or the session length when not yet known
    pub total: usize,
}

/// How a chunk left the playback device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ChunkOutcome {
    /// Played to its natural end
    Completed,
    /// Could not be read or the device reported an error
    Failed { reason: String },
}

impl ChunkOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ChunkOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_active() {
        assert!(!PlaybackState::Idle.is_active());
        assert!(PlaybackState::Loading.is_active());
        assert!(PlaybackState::Playing.is_active());
        assert!(PlaybackState::Paused.is_active());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&PlaybackState::Loading).unwrap();
        assert_eq!(json, "\"loading\"");
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
    }

    #[test]
    fn test_outcome_tagging() {
        let failed = ChunkOutcome::Failed {
            reason: "device gone".to_string(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["reason"], "device gone");
        assert!(!failed.is_completed());
        assert!(ChunkOutcome::Completed.is_completed());
    }
}
