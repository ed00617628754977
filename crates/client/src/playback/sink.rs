//! Media sink abstraction
//!
//! The reconciler drives playback through this trait instead of holding a
//! concrete media element, so the same state machine runs against a browser
//! element, a native player, or a headless recorder.

use crate::Result;
use std::sync::Mutex;

/// Target of playback decisions
///
/// Implementations map these calls onto the environment's media element.
/// Operations may fail (autoplay policy, decode errors); the reconciler
/// catches and logs failures rather than propagating them.
pub trait MediaSink: Send + Sync {
    /// Start playback
    fn play(&self) -> Result<()>;

    /// Pause playback
    fn pause(&self) -> Result<()>;

    /// Move the playhead to `seconds`
    fn seek(&self, seconds: f64) -> Result<()>;

    /// Set playback volume in `[0, 1]`
    fn set_volume(&self, volume: f64) -> Result<()>;

    /// Mute or unmute playback audio
    fn set_muted(&self, muted: bool) -> Result<()>;

    /// Current playhead position in seconds
    fn position(&self) -> f64;
}

/// One operation observed by a [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkOp {
    /// `play()` was invoked
    Play,
    /// `pause()` was invoked
    Pause,
    /// `seek(seconds)` was invoked
    Seek(f64),
    /// `set_volume(volume)` was invoked
    SetVolume(f64),
    /// `set_muted(muted)` was invoked
    SetMuted(bool),
}

/// In-memory sink that records every operation
///
/// Backs headless sessions (the CLI) and tests; `position` is whatever was
/// last seeked or set explicitly.
#[derive(Default)]
pub struct RecordingSink {
    inner: Mutex<RecordingInner>,
}

#[derive(Default)]
struct RecordingInner {
    ops: Vec<SinkOp>,
    position: f64,
    fail_next_play: bool,
}

impl RecordingSink {
    /// New sink with position 0
    pub fn new() -> Self {
        Self::default()
    }

    /// All operations observed so far, in order
    pub fn ops(&self) -> Vec<SinkOp> {
        self.inner.lock().unwrap().ops.clone()
    }

    /// Number of times `op` was observed
    pub fn count(&self, op: &SinkOp) -> usize {
        self.inner.lock().unwrap().ops.iter().filter(|o| *o == op).count()
    }

    /// Simulate playback progress for drift tests
    pub fn set_position(&self, seconds: f64) {
        self.inner.lock().unwrap().position = seconds;
    }

    /// Make the next `play()` call fail, like an autoplay rejection
    pub fn fail_next_play(&self) {
        self.inner.lock().unwrap().fail_next_play = true;
    }
}

impl MediaSink for RecordingSink {
    fn play(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(SinkOp::Play);
        if inner.fail_next_play {
            inner.fail_next_play = false;
            return Err(crate::Error::PlaybackError(
                "play() rejected by autoplay policy".to_string(),
            ));
        }
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.inner.lock().unwrap().ops.push(SinkOp::Pause);
        Ok(())
    }

    fn seek(&self, seconds: f64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(SinkOp::Seek(seconds));
        inner.position = seconds;
        Ok(())
    }

    fn set_volume(&self, volume: f64) -> Result<()> {
        self.inner.lock().unwrap().ops.push(SinkOp::SetVolume(volume));
        Ok(())
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        self.inner.lock().unwrap().ops.push(SinkOp::SetMuted(muted));
        Ok(())
    }

    fn position(&self) -> f64 {
        self.inner.lock().unwrap().position
    }
}
