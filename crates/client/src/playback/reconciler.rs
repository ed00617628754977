//! Playback state reconciliation
//!
//! Local actions apply to the sink immediately and broadcast the updated
//! [`PlaybackState`]; remote broadcasts apply only when they are neither
//! self-echo nor stale. Position corrections happen only past a drift
//! threshold so network jitter does not cause visible stutter.

use crate::channel::ChannelSender;
use crate::config::ClientConfig;
use crate::playback::MediaSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use watchroom_protocol::{ClientEvent, PlaybackState};

/// Reconciler lifecycle phase for the shared video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// No media loaded
    Idle,
    /// A video is selected but has not played yet
    Loaded,
    /// Playing
    Playing,
    /// Paused
    Paused,
    /// A seek is being applied
    Seeking,
}

/// Merges local actions and remote broadcasts into sink decisions
///
/// The reconciler is the only writer to the [`MediaSink`]. It is driven from
/// the client's single dispatch task, so methods take `&mut self` and no
/// internal locking is needed.
pub struct PlaybackReconciler {
    sink: Arc<dyn MediaSink>,
    outbound: ChannelSender,
    session_id: String,
    phase: PlaybackPhase,
    state: PlaybackState,
    last_applied_revision: u64,
    last_position_relay: Option<Instant>,
    drift_threshold: f64,
    position_relay_interval: Duration,
}

impl PlaybackReconciler {
    /// Create a reconciler bound to a sink and the channel sender
    pub fn new(
        sink: Arc<dyn MediaSink>,
        outbound: ChannelSender,
        session_id: impl Into<String>,
        config: &ClientConfig,
    ) -> Self {
        let session_id = session_id.into();
        Self {
            sink,
            outbound,
            state: PlaybackState::initial("", session_id.clone()),
            session_id,
            phase: PlaybackPhase::Idle,
            last_applied_revision: 0,
            last_position_relay: None,
            drift_threshold: config.drift_threshold_secs,
            position_relay_interval: config.position_relay_interval,
        }
    }

    /// Current phase
    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    /// Local mirror of the shared state
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Adopt a new session identity after a reconnect
    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.session_id = session_id.into();
    }

    /// A video was selected, locally or remotely
    pub fn load(&mut self, video_id: impl Into<String>) {
        let video_id = video_id.into();
        debug!("Loading video: {}", video_id);

        self.state.video_id = video_id;
        self.state.is_playing = false;
        self.state.position_seconds = 0.0;
        self.phase = PlaybackPhase::Loaded;
    }

    /// The selected video went away; back to no media loaded
    pub fn unload(&mut self) {
        debug!("Unloading video");
        self.state.video_id.clear();
        self.state.is_playing = false;
        self.state.position_seconds = 0.0;
        self.phase = PlaybackPhase::Idle;
    }

    /// Local play action
    pub fn play(&mut self) {
        if self.phase == PlaybackPhase::Idle {
            debug!("Ignoring play with no media loaded");
            return;
        }
        if self.phase == PlaybackPhase::Playing {
            return;
        }

        // The flag reflects the attempted state even if the sink refuses;
        // the next remote sync corrects it.
        if let Err(e) = self.sink.play() {
            warn!("Sink rejected play: {}", e);
        }

        self.phase = PlaybackPhase::Playing;
        self.state.is_playing = true;
        self.state.position_seconds = self.sink.position();
        self.stamp();
        self.emit(ClientEvent::Play {
            time: self.state.position_seconds,
        });
        self.broadcast_state();
    }

    /// Local pause action
    pub fn pause(&mut self) {
        if self.phase == PlaybackPhase::Idle {
            debug!("Ignoring pause with no media loaded");
            return;
        }
        if self.phase != PlaybackPhase::Playing {
            return;
        }

        if let Err(e) = self.sink.pause() {
            warn!("Sink rejected pause: {}", e);
        }

        self.phase = PlaybackPhase::Paused;
        self.state.is_playing = false;
        self.state.position_seconds = self.sink.position();
        self.stamp();
        self.emit(ClientEvent::Pause {
            time: self.state.position_seconds,
        });
        self.broadcast_state();
    }

    /// Local seek action
    pub fn seek(&mut self, seconds: f64) {
        if self.phase == PlaybackPhase::Idle {
            debug!("Ignoring seek with no media loaded");
            return;
        }
        let seconds = seconds.max(0.0);

        self.phase = PlaybackPhase::Seeking;
        if let Err(e) = self.sink.seek(seconds) {
            warn!("Sink rejected seek: {}", e);
        }

        self.state.position_seconds = seconds;
        self.phase = if self.state.is_playing {
            PlaybackPhase::Playing
        } else {
            PlaybackPhase::Paused
        };
        self.stamp();
        self.emit(ClientEvent::Seek { time: seconds });
        self.broadcast_state();
    }

    /// Local mute/unmute action
    pub fn set_muted(&mut self, muted: bool) {
        if self.phase == PlaybackPhase::Idle {
            return;
        }

        if let Err(e) = self.sink.set_muted(muted) {
            warn!("Sink rejected mute change: {}", e);
        }

        self.state.muted = muted;
        self.stamp();
        self.emit(if muted {
            ClientEvent::Mute
        } else {
            ClientEvent::Unmute
        });
        self.broadcast_state();
    }

    /// Local volume change
    pub fn set_volume(&mut self, volume: f64) {
        if self.phase == PlaybackPhase::Idle {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);

        if let Err(e) = self.sink.set_volume(volume) {
            warn!("Sink rejected volume change: {}", e);
        }

        self.state.volume = volume;
        self.stamp();
        self.emit(ClientEvent::VolumeChange { level: volume });
        self.broadcast_state();
    }

    /// Continuous position tick from the playing element
    ///
    /// Never touches the sink; relays the state at a bounded rate so the
    /// relay is not flooded with per-tick updates.
    pub fn note_position(&mut self, seconds: f64) {
        if self.phase == PlaybackPhase::Idle {
            return;
        }
        self.state.position_seconds = seconds.max(0.0);

        let now = Instant::now();
        let due = match self.last_position_relay {
            Some(last) => now.duration_since(last) >= self.position_relay_interval,
            None => true,
        };
        if due {
            self.last_position_relay = Some(now);
            self.stamp();
            self.broadcast_state();
        }
    }

    /// Apply an authoritative remote `video-state` broadcast
    pub fn apply_remote(&mut self, incoming: &PlaybackState) {
        if let Err(e) = incoming.validate() {
            warn!("Dropping invalid video-state payload: {}", e);
            return;
        }

        if incoming.last_updated_by == self.session_id {
            debug!("Suppressing self-echoed video-state");
            return;
        }

        if !incoming.is_newer_than(self.last_applied_revision) {
            debug!(
                "Dropping stale video-state (revision {} <= {})",
                incoming.revision, self.last_applied_revision
            );
            return;
        }
        self.last_applied_revision = incoming.revision;

        if self.phase == PlaybackPhase::Idle || self.state.video_id != incoming.video_id {
            self.load(incoming.video_id.clone());
        }

        if let Err(e) = self.sink.set_volume(incoming.volume) {
            warn!("Sink rejected volume change: {}", e);
        }
        if let Err(e) = self.sink.set_muted(incoming.muted) {
            warn!("Sink rejected mute change: {}", e);
        }

        self.correct_drift(incoming.position_seconds);
        self.apply_play_flag(incoming.is_playing);

        self.state.is_playing = incoming.is_playing;
        self.state.position_seconds = incoming.position_seconds;
        self.state.volume = incoming.volume;
        self.state.muted = incoming.muted;
        self.state.last_updated_by = incoming.last_updated_by.clone();
        self.state.revision = incoming.revision;
    }

    /// Remote play action (already relay-filtered, carries no revision)
    pub fn apply_remote_play(&mut self, time: f64) {
        if self.phase == PlaybackPhase::Idle {
            return;
        }
        self.correct_drift(time);
        self.apply_play_flag(true);
        self.state.is_playing = true;
        self.state.position_seconds = time;
    }

    /// Remote pause action
    pub fn apply_remote_pause(&mut self, time: f64) {
        if self.phase == PlaybackPhase::Idle {
            return;
        }
        self.correct_drift(time);
        self.apply_play_flag(false);
        self.state.is_playing = false;
        self.state.position_seconds = time;
    }

    /// Remote seek action
    pub fn apply_remote_seek(&mut self, time: f64) {
        if self.phase == PlaybackPhase::Idle {
            return;
        }
        self.correct_drift(time);
        self.state.position_seconds = time;
    }

    /// Remote mute/unmute action
    pub fn apply_remote_muted(&mut self, muted: bool) {
        if self.phase == PlaybackPhase::Idle {
            return;
        }
        if let Err(e) = self.sink.set_muted(muted) {
            warn!("Sink rejected mute change: {}", e);
        }
        self.state.muted = muted;
    }

    /// Remote volume change
    pub fn apply_remote_volume(&mut self, level: f64) {
        if self.phase == PlaybackPhase::Idle {
            return;
        }
        let level = level.clamp(0.0, 1.0);
        if let Err(e) = self.sink.set_volume(level) {
            warn!("Sink rejected volume change: {}", e);
        }
        self.state.volume = level;
    }

    /// Hard-seek only when the gap exceeds the drift threshold
    fn correct_drift(&mut self, remote_position: f64) {
        let local = self.sink.position();
        if (local - remote_position).abs() > self.drift_threshold {
            debug!(
                "Drift correction: local {:.2}s -> remote {:.2}s",
                local, remote_position
            );
            if let Err(e) = self.sink.seek(remote_position) {
                warn!("Sink rejected drift-correcting seek: {}", e);
            }
        }
    }

    /// Idempotent play/pause application
    ///
    /// The sink is only invoked on an actual phase change, so repeated
    /// broadcasts of the same flag never trigger spurious operations.
    fn apply_play_flag(&mut self, is_playing: bool) {
        if is_playing && self.phase != PlaybackPhase::Playing {
            if let Err(e) = self.sink.play() {
                warn!("Sink rejected play: {}", e);
            }
            self.phase = PlaybackPhase::Playing;
        } else if !is_playing && self.phase == PlaybackPhase::Playing {
            if let Err(e) = self.sink.pause() {
                warn!("Sink rejected pause: {}", e);
            }
            self.phase = PlaybackPhase::Paused;
        }
    }

    /// Stamp the mirror as a fresh authoritative broadcast of ours
    fn stamp(&mut self) {
        self.state.revision = self.state.revision.max(self.last_applied_revision) + 1;
        self.state.last_updated_by = self.session_id.clone();
    }

    fn broadcast_state(&self) {
        if let Err(e) = self.outbound.send(ClientEvent::VideoState(self.state.clone())) {
            warn!("Failed to relay video-state: {}", e);
        }
    }

    fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.outbound.send(event) {
            warn!("Failed to relay playback action: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{RecordingSink, SinkOp};
    use tokio::sync::mpsc;

    fn reconciler(
        sink: Arc<RecordingSink>,
    ) -> (PlaybackReconciler, mpsc::UnboundedReceiver<ClientEvent>) {
        let (sender, rx) = ChannelSender::detached();
        let config = ClientConfig::default();
        let rec = PlaybackReconciler::new(sink, sender, "session-local", &config);
        (rec, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn broadcast_revisions(events: &[ClientEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|ev| match ev {
                ClientEvent::VideoState(state) => Some(state.revision),
                _ => None,
            })
            .collect()
    }

    fn remote_state(revision: u64) -> PlaybackState {
        PlaybackState {
            video_id: "movie.mp4".to_string(),
            is_playing: true,
            position_seconds: 5.0,
            volume: 0.5,
            muted: false,
            last_updated_by: "session-remote".to_string(),
            revision,
        }
    }

    #[tokio::test]
    async fn test_revision_strictly_increases_across_actions() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, mut rx) = reconciler(sink);

        rec.load("movie.mp4");
        rec.play();
        rec.pause();
        rec.seek(42.0);
        rec.set_muted(true);
        rec.set_volume(0.3);
        rec.play();

        let revisions = broadcast_revisions(&drain(&mut rx));
        assert_eq!(revisions.len(), 6);
        for pair in revisions.windows(2) {
            assert!(pair[1] > pair[0], "revisions not increasing: {:?}", revisions);
        }
    }

    #[tokio::test]
    async fn test_self_echo_never_touches_sink() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, mut rx) = reconciler(sink.clone());

        rec.load("movie.mp4");
        drain(&mut rx);
        let baseline = sink.ops().len();

        let mut echo = remote_state(10);
        echo.last_updated_by = "session-local".to_string();
        rec.apply_remote(&echo);

        assert_eq!(sink.ops().len(), baseline);
        assert_eq!(rec.phase(), PlaybackPhase::Loaded);
    }

    #[tokio::test]
    async fn test_stale_revision_rejected() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, _rx) = reconciler(sink.clone());

        rec.apply_remote(&remote_state(5));
        assert_eq!(rec.phase(), PlaybackPhase::Playing);
        rec.pause();

        // An older broadcast must not override.
        let mut stale = remote_state(4);
        stale.is_playing = true;
        rec.apply_remote(&stale);
        assert_eq!(rec.phase(), PlaybackPhase::Paused);
    }

    #[tokio::test]
    async fn test_drift_below_threshold_is_ignored() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, _rx) = reconciler(sink.clone());

        rec.load("movie.mp4");
        sink.set_position(10.0);

        let mut state = remote_state(1);
        state.position_seconds = 10.3;
        state.is_playing = false;
        rec.apply_remote(&state);

        assert_eq!(sink.count(&SinkOp::Seek(10.3)), 0);
    }

    #[tokio::test]
    async fn test_drift_above_threshold_hard_seeks() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, _rx) = reconciler(sink.clone());

        rec.load("movie.mp4");
        sink.set_position(10.0);

        let mut state = remote_state(1);
        state.position_seconds = 11.0;
        state.is_playing = false;
        rec.apply_remote(&state);

        assert_eq!(sink.count(&SinkOp::Seek(11.0)), 1);
    }

    #[tokio::test]
    async fn test_idempotent_play_application() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, _rx) = reconciler(sink.clone());

        rec.apply_remote(&remote_state(1));
        rec.apply_remote(&remote_state(2));

        assert_eq!(sink.count(&SinkOp::Play), 1);
    }

    #[tokio::test]
    async fn test_local_play_is_idempotent() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, _rx) = reconciler(sink.clone());

        rec.load("movie.mp4");
        rec.play();
        rec.play();

        assert_eq!(sink.count(&SinkOp::Play), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_relay_is_throttled() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, mut rx) = reconciler(sink);

        rec.load("movie.mp4");
        drain(&mut rx);

        rec.note_position(1.0);
        rec.note_position(1.2);
        rec.note_position(1.4);
        assert_eq!(broadcast_revisions(&drain(&mut rx)).len(), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        rec.note_position(4.4);
        assert_eq!(broadcast_revisions(&drain(&mut rx)).len(), 1);
    }

    #[tokio::test]
    async fn test_discrete_actions_are_not_throttled() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, mut rx) = reconciler(sink);

        rec.load("movie.mp4");
        rec.play();
        rec.seek(3.0);
        rec.pause();

        let events = drain(&mut rx);
        assert!(events.contains(&ClientEvent::Play { time: 0.0 }));
        assert!(events.contains(&ClientEvent::Seek { time: 3.0 }));
        assert!(events.contains(&ClientEvent::Pause { time: 3.0 }));
    }

    #[tokio::test]
    async fn test_sink_play_failure_does_not_crash_and_state_reflects_attempt() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, _rx) = reconciler(sink.clone());

        rec.load("movie.mp4");
        sink.fail_next_play();
        rec.play();

        // The attempted state stands until the next remote sync.
        assert_eq!(rec.phase(), PlaybackPhase::Playing);
        assert!(rec.state().is_playing);

        let mut correction = remote_state(50);
        correction.is_playing = false;
        correction.position_seconds = 0.0;
        rec.apply_remote(&correction);
        assert_eq!(rec.phase(), PlaybackPhase::Paused);
    }

    #[tokio::test]
    async fn test_invalid_payload_dropped_wholesale() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, _rx) = reconciler(sink.clone());

        rec.load("movie.mp4");
        let baseline = sink.ops().len();

        let mut bad = remote_state(9);
        bad.volume = 4.2;
        rec.apply_remote(&bad);

        assert_eq!(sink.ops().len(), baseline);
        assert_ne!(rec.state().volume, 4.2);
        assert_eq!(rec.phase(), PlaybackPhase::Loaded);
    }

    #[tokio::test]
    async fn test_scenario_paused_viewer_follows_remote_play() {
        // user2 paused at 0s receives user1's state: playing at 5s.
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, _rx) = reconciler(sink.clone());

        rec.load("movie.mp4");
        sink.set_position(0.0);

        rec.apply_remote(&remote_state(7));

        assert_eq!(sink.count(&SinkOp::Seek(5.0)), 1);
        assert_eq!(sink.count(&SinkOp::Play), 1);
        assert_eq!(rec.phase(), PlaybackPhase::Playing);
        assert_eq!(rec.state().position_seconds, 5.0);
    }

    #[tokio::test]
    async fn test_actions_ignored_when_idle() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, mut rx) = reconciler(sink.clone());

        rec.play();
        rec.seek(10.0);
        rec.set_volume(0.1);

        assert!(sink.ops().is_empty());
        assert!(drain(&mut rx).is_empty());
        assert_eq!(rec.phase(), PlaybackPhase::Idle);
    }

    #[tokio::test]
    async fn test_remote_discrete_actions_apply_idempotently() {
        let sink = Arc::new(RecordingSink::new());
        let (mut rec, _rx) = reconciler(sink.clone());

        rec.load("movie.mp4");
        sink.set_position(4.9);

        rec.apply_remote_play(5.0);
        rec.apply_remote_play(5.0);
        assert_eq!(sink.count(&SinkOp::Play), 1);
        // 0.1s of drift is below threshold: no seek.
        assert_eq!(sink.count(&SinkOp::Seek(5.0)), 0);

        rec.apply_remote_pause(5.1);
        assert_eq!(sink.count(&SinkOp::Pause), 1);
    }
}
