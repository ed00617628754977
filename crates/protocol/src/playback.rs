//! Shared playback state model
//!
//! One [`PlaybackState`] value is the authoritative description of what the
//! watched video element should be doing. Whichever participant performs a
//! local action stamps the state with its own session id and a bumped
//! revision, then broadcasts it; receivers use the revision to reject stale
//! competing broadcasts and the originator id to suppress self-echo.

use serde::{Deserialize, Serialize};

/// Authoritative state of the shared video, as carried by `video-state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Filename of the currently watched video
    pub video_id: String,

    /// Whether the video should be playing
    pub is_playing: bool,

    /// Playhead position in seconds (never negative)
    pub position_seconds: f64,

    /// Playback volume in `[0, 1]`
    pub volume: f64,

    /// Whether playback audio is muted
    pub muted: bool,

    /// Session id of the participant whose action produced this state
    pub last_updated_by: String,

    /// Monotonic freshness counter; strictly increases per broadcast
    pub revision: u64,
}

/// Why a received `PlaybackState` payload was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// `position_seconds` was negative or not a finite number
    #[error("invalid position: {0}")]
    InvalidPosition(f64),

    /// `volume` was outside `[0, 1]` or not a finite number
    #[error("volume out of range: {0}")]
    VolumeOutOfRange(f64),

    /// `video_id` was empty
    #[error("empty video id")]
    EmptyVideoId,

    /// `last_updated_by` was empty
    #[error("missing originator session id")]
    MissingOriginator,
}

impl PlaybackState {
    /// Initial state for a freshly selected video
    pub fn initial(video_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            is_playing: false,
            position_seconds: 0.0,
            volume: 0.5,
            muted: false,
            last_updated_by: session_id.into(),
            revision: 0,
        }
    }

    /// Validate a received payload before applying it
    ///
    /// Invalid payloads must be dropped wholesale, never applied partially.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.position_seconds.is_finite() || self.position_seconds < 0.0 {
            return Err(ValidationError::InvalidPosition(self.position_seconds));
        }
        if !self.volume.is_finite() || !(0.0..=1.0).contains(&self.volume) {
            return Err(ValidationError::VolumeOutOfRange(self.volume));
        }
        if self.video_id.is_empty() {
            return Err(ValidationError::EmptyVideoId);
        }
        if self.last_updated_by.is_empty() {
            return Err(ValidationError::MissingOriginator);
        }
        Ok(())
    }

    /// Whether this broadcast is fresher than an already-applied revision
    pub fn is_newer_than(&self, applied_revision: u64) -> bool {
        self.revision > applied_revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_state() -> PlaybackState {
        PlaybackState {
            video_id: "movie.mp4".to_string(),
            is_playing: true,
            position_seconds: 12.5,
            volume: 0.8,
            muted: false,
            last_updated_by: "session-a".to_string(),
            revision: 3,
        }
    }

    #[test]
    fn test_valid_state_passes() {
        assert!(valid_state().validate().is_ok());
    }

    #[test]
    fn test_negative_position_rejected() {
        let mut state = valid_state();
        state.position_seconds = -0.1;
        assert_eq!(
            state.validate(),
            Err(ValidationError::InvalidPosition(-0.1))
        );
    }

    #[test]
    fn test_non_finite_position_rejected() {
        let mut state = valid_state();
        state.position_seconds = f64::NAN;
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_volume_out_of_range_rejected() {
        let mut state = valid_state();
        state.volume = 1.5;
        assert_eq!(state.validate(), Err(ValidationError::VolumeOutOfRange(1.5)));

        state.volume = -0.01;
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_empty_video_id_rejected() {
        let mut state = valid_state();
        state.video_id.clear();
        assert_eq!(state.validate(), Err(ValidationError::EmptyVideoId));
    }

    #[test]
    fn test_revision_freshness() {
        let state = valid_state();
        assert!(state.is_newer_than(2));
        assert!(!state.is_newer_than(3));
        assert!(!state.is_newer_than(4));
    }

    #[test]
    fn test_camel_case_wire_fields() {
        let json = serde_json::to_string(&valid_state()).unwrap();
        assert!(json.contains("\"videoId\""));
        assert!(json.contains("\"isPlaying\""));
        assert!(json.contains("\"positionSeconds\""));
        assert!(json.contains("\"lastUpdatedBy\""));
        assert!(json.contains("\"revision\""));
    }
}
