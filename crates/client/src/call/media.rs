//! Local media acquisition
//!
//! A [`MediaDeviceGrant`] is a scoped acquisition of camera/microphone
//! tracks: every exit path, including a failure partway through a call
//! setup, stops the tracks. Toggling operates on the live grant's tracks;
//! a second grant for the same device kind is never acquired alongside one.

use crate::{Error, Result};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, warn};

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Microphone audio
    Audio,
    /// Camera video
    Video,
}

/// One local device track
pub trait LocalTrack: Send + Sync {
    /// Track kind
    fn kind(&self) -> TrackKind;

    /// Enable or disable the track without releasing the device
    fn set_enabled(&self, enabled: bool);

    /// Whether the track is currently enabled
    fn is_enabled(&self) -> bool;

    /// Apply a local gain in `[0, 1]`; meaningful for audio tracks only
    fn set_gain(&self, _gain: f64) {}

    /// Stop the track and release the underlying device
    fn stop(&self);

    /// Downcast support for transport-specific track handling
    fn as_any(&self) -> &dyn Any;
}

/// Acquires local device tracks
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire the requested track kinds, or fail without leaking any
    /// partially acquired device
    async fn acquire(&self, audio: bool, video: bool) -> Result<Vec<Arc<dyn LocalTrack>>>;
}

/// Which media the engine ended up with after acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMode {
    /// Camera and microphone
    AudioVideo,
    /// Microphone only; camera acquisition failed or was not wanted
    AudioOnly,
}

/// Scoped ownership of the currently acquired local tracks
///
/// Tracks are stopped on [`release`](Self::release) and, as a backstop, on
/// drop.
pub struct MediaDeviceGrant {
    tracks: Vec<Arc<dyn LocalTrack>>,
    audio_enabled: bool,
    video_enabled: bool,
    mic_gain: f64,
    released: bool,
}

impl std::fmt::Debug for MediaDeviceGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaDeviceGrant")
            .field("tracks", &self.tracks.len())
            .field("audio_enabled", &self.audio_enabled)
            .field("video_enabled", &self.video_enabled)
            .field("mic_gain", &self.mic_gain)
            .field("released", &self.released)
            .finish()
    }
}

impl MediaDeviceGrant {
    /// Acquire media, degrading to audio-only when the full request fails
    ///
    /// Returns the grant plus the mode that was actually reached. Fails with
    /// [`Error::MediaAccessDenied`] only once the audio-only retry has also
    /// failed.
    pub async fn acquire(
        source: &dyn MediaSource,
        want_audio: bool,
        want_video: bool,
    ) -> Result<(Self, MediaMode)> {
        if !want_audio && !want_video {
            return Err(Error::MediaAccessDenied(
                "no media kinds requested".to_string(),
            ));
        }

        match source.acquire(want_audio, want_video).await {
            Ok(tracks) => {
                let has_video = tracks.iter().any(|t| t.kind() == TrackKind::Video);
                let mode = if has_video {
                    MediaMode::AudioVideo
                } else {
                    MediaMode::AudioOnly
                };
                Ok((Self::new(tracks, want_audio, has_video), mode))
            }
            Err(first) if want_video && want_audio => {
                warn!(
                    "Full media acquisition failed ({}); retrying audio-only",
                    first
                );
                match source.acquire(true, false).await {
                    Ok(tracks) => Ok((Self::new(tracks, true, false), MediaMode::AudioOnly)),
                    Err(second) => Err(Error::MediaAccessDenied(format!(
                        "camera+microphone failed ({}); audio-only failed ({})",
                        first, second
                    ))),
                }
            }
            Err(e) => Err(Error::MediaAccessDenied(e.to_string())),
        }
    }

    fn new(tracks: Vec<Arc<dyn LocalTrack>>, audio_enabled: bool, video_enabled: bool) -> Self {
        Self {
            tracks,
            audio_enabled,
            video_enabled,
            mic_gain: 1.0,
            released: false,
        }
    }

    /// All tracks in the grant
    pub fn tracks(&self) -> &[Arc<dyn LocalTrack>] {
        &self.tracks
    }

    /// Tracks of one kind
    pub fn tracks_of(&self, kind: TrackKind) -> Vec<Arc<dyn LocalTrack>> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    /// Whether the grant holds a track of `kind`
    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind() == kind)
    }

    /// Current microphone-enabled intent
    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    /// Current camera-enabled intent
    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    /// Flip the enabled flag for every track of `kind`
    pub fn set_kind_enabled(&mut self, kind: TrackKind, enabled: bool) {
        match kind {
            TrackKind::Audio => self.audio_enabled = enabled,
            TrackKind::Video => self.video_enabled = enabled,
        }
        for track in self.tracks.iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
        }
    }

    /// Attach a late-acquired track (camera toggled on mid-call)
    pub fn add_track(&mut self, track: Arc<dyn LocalTrack>) {
        if track.kind() == TrackKind::Video {
            self.video_enabled = true;
        }
        self.tracks.push(track);
    }

    /// Local microphone gain in `[0, 1]`; applied to audio tracks only
    pub fn set_mic_gain(&mut self, gain: f64) {
        self.mic_gain = gain.clamp(0.0, 1.0);
        for track in self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio) {
            track.set_gain(self.mic_gain);
        }
    }

    /// Current microphone gain
    pub fn mic_gain(&self) -> f64 {
        self.mic_gain
    }

    /// Stop every track; idempotent
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        debug!("Releasing media grant ({} tracks)", self.tracks.len());
        for track in &self.tracks {
            track.stop();
        }
        self.released = true;
    }
}

impl Drop for MediaDeviceGrant {
    fn drop(&mut self) {
        self.release();
    }
}
