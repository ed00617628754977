//! Media control surface
//!
//! Local microphone/camera toggles act on the live grant's tracks and
//! broadcast the combined intent so remote UIs can render placeholders.
//! Microphone gain and per-peer playback volume are purely local and never
//! broadcast.

use crate::call::engine::CallEngine;
use crate::call::media::TrackKind;
use crate::call::state::CallState;
use crate::Result;
use tracing::warn;
use watchroom_protocol::ClientEvent;

impl CallEngine {
    /// Flip the microphone intent and apply it to every live audio track
    pub fn toggle_microphone(&mut self) -> Result<(bool, bool)> {
        self.audio_wanted = !self.audio_wanted;
        self.apply_kind_toggle(TrackKind::Audio, self.audio_wanted)?;
        Ok((self.audio_wanted, self.video_wanted))
    }

    /// Flip the camera intent and apply it to every live video track
    ///
    /// Toggling the camera on mid-call on a session that never had a video
    /// track acquires one and renegotiates; toggling off only disables the
    /// existing tracks, never releasing the device grant.
    pub async fn toggle_camera(&mut self) -> Result<(bool, bool)> {
        self.video_wanted = !self.video_wanted;
        self.apply_kind_toggle(TrackKind::Video, self.video_wanted)?;
        if self.video_wanted {
            self.acquire_missing_camera_tracks().await;
        }
        Ok((self.audio_wanted, self.video_wanted))
    }

    /// Local microphone gain, 0..=100; not broadcast
    pub fn set_mic_gain(&mut self, level: u32) {
        let gain = f64::from(level.min(100)) / 100.0;
        self.mic_gain = gain;
        for session in self.sessions.values_mut().filter(|s| !s.is_terminal()) {
            if let Some(grant) = session.grant_mut() {
                grant.set_mic_gain(gain);
            }
        }
    }

    /// Local playback volume for one peer's stream, 0..=100; not broadcast
    ///
    /// Asymmetric on purpose: each participant controls its own listening
    /// volume independently.
    pub fn set_remote_volume(&mut self, peer_id: impl Into<String>, level: u32) {
        let volume = f64::from(level.min(100)) / 100.0;
        self.remote_volumes.insert(peer_id.into(), volume);
    }

    /// Playback volume for `peer_id` in `[0, 1]`; defaults to full volume
    pub fn remote_volume(&self, peer_id: &str) -> f64 {
        self.remote_volumes.get(peer_id).copied().unwrap_or(1.0)
    }

    /// Current local `(audio, video)` intent
    pub fn media_toggles(&self) -> (bool, bool) {
        (self.audio_wanted, self.video_wanted)
    }

    /// Last announced `(audio, video)` intent of `peer_id`
    pub fn remote_media(&self, peer_id: &str) -> Option<(bool, bool)> {
        self.remote_media.get(peer_id).copied()
    }

    fn apply_kind_toggle(&mut self, kind: TrackKind, enabled: bool) -> Result<()> {
        for session in self.sessions.values_mut().filter(|s| !s.is_terminal()) {
            if let Some(grant) = session.grant_mut() {
                grant.set_kind_enabled(kind, enabled);
            }
        }
        self.outbound.send(ClientEvent::ToggleMedia {
            audio: self.audio_wanted,
            video: self.video_wanted,
        })
    }

    async fn acquire_missing_camera_tracks(&mut self) {
        let needing: Vec<String> = self
            .sessions
            .values()
            .filter(|s| {
                s.state() == CallState::Connected
                    && s.grant().map(|g| !g.has_kind(TrackKind::Video)).unwrap_or(false)
            })
            .map(|s| s.peer_id().to_string())
            .collect();

        for peer in needing {
            let tracks = match self.media.acquire(false, true).await {
                Ok(tracks) => tracks,
                Err(e) => {
                    warn!("Camera acquisition for {} failed: {}", peer, e);
                    continue;
                }
            };

            let link = self.sessions.get(&peer).and_then(|s| s.link());
            if let Some(session) = self.sessions.get_mut(&peer) {
                if let Some(grant) = session.grant_mut() {
                    for track in &tracks {
                        grant.add_track(track.clone());
                    }
                }
            }
            if let Some(link) = link {
                for track in tracks {
                    if let Err(e) = link.add_track(track).await {
                        warn!("Failed to attach camera track for {}: {}", peer, e);
                    }
                }
            }

            // The local track set changed: re-run the offer/answer cycle.
            let _ = self.renegotiate(&peer).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::link::LinkState;
    use crate::call::testing::{FakeConnector, FakeMediaSource};
    use crate::channel::ChannelSender;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use watchroom_protocol::SignalPayload;

    struct Rig {
        engine: CallEngine,
        outbound_rx: UnboundedReceiver<ClientEvent>,
        connector: Arc<FakeConnector>,
        media: Arc<FakeMediaSource>,
    }

    fn rig() -> Rig {
        let connector = Arc::new(FakeConnector::new());
        let media = Arc::new(FakeMediaSource::new());
        let (sender, outbound_rx) = ChannelSender::detached();
        let (mut engine, _events_rx, _link_rx) =
            CallEngine::new(connector.clone(), media.clone(), sender);
        engine.set_local_peer_id("peer-local");

        Rig {
            engine,
            outbound_rx,
            connector,
            media,
        }
    }

    fn drain_outbound(rig: &mut Rig) -> Vec<ClientEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rig.outbound_rx.try_recv() {
            out.push(ev);
        }
        out
    }

    async fn connect_to(rig: &mut Rig, peer: &str) {
        rig.engine.initiate(Some(peer.to_string())).await.unwrap();
        rig.engine
            .handle_answer(peer.to_string(), SignalPayload::answer("v=0"))
            .await
            .unwrap();
        // Drive the link event inline, as the dispatch task would.
        rig.connector
            .link_for(peer)
            .unwrap()
            .report_state(LinkState::Connected);
    }

    #[tokio::test]
    async fn test_toggle_microphone_disables_tracks_and_broadcasts() {
        let mut rig = rig();
        connect_to(&mut rig, "peer-b").await;
        drain_outbound(&mut rig);

        let (audio, video) = rig.engine.toggle_microphone().unwrap();
        assert!(!audio);
        assert!(video);

        for track in rig.media.tracks().iter().filter(|t| {
            t.track_kind() == TrackKind::Audio
        }) {
            assert!(!track.enabled());
        }

        let outbound = drain_outbound(&mut rig);
        assert_eq!(
            outbound,
            vec![ClientEvent::ToggleMedia {
                audio: false,
                video: true
            }]
        );

        // Toggling back re-enables the same tracks; no new grant appears.
        let before = rig.media.tracks().len();
        rig.engine.toggle_microphone().unwrap();
        assert_eq!(rig.media.tracks().len(), before);
        assert!(rig
            .media
            .tracks()
            .iter()
            .filter(|t| t.track_kind() == TrackKind::Audio)
            .all(|t| t.enabled()));
    }

    #[tokio::test]
    async fn test_mic_gain_is_local_only() {
        let mut rig = rig();
        connect_to(&mut rig, "peer-b").await;
        drain_outbound(&mut rig);

        rig.engine.set_mic_gain(40);
        rig.engine.set_mic_gain(250); // clamped

        let audio_gains: Vec<f64> = rig
            .media
            .tracks()
            .iter()
            .filter(|t| t.track_kind() == TrackKind::Audio)
            .map(|t| t.gain())
            .collect();
        assert_eq!(audio_gains, vec![1.0]);

        // Nothing was broadcast.
        assert!(drain_outbound(&mut rig).is_empty());
    }

    #[tokio::test]
    async fn test_remote_volume_is_local_only() {
        let mut rig = rig();
        connect_to(&mut rig, "peer-b").await;
        drain_outbound(&mut rig);

        rig.engine.set_remote_volume("peer-b", 30);
        assert_eq!(rig.engine.remote_volume("peer-b"), 0.3);
        assert_eq!(rig.engine.remote_volume("peer-unknown"), 1.0);

        rig.engine.set_remote_volume("peer-b", 500);
        assert_eq!(rig.engine.remote_volume("peer-b"), 1.0);

        assert!(drain_outbound(&mut rig).is_empty());
    }

    #[tokio::test]
    async fn test_camera_toggle_on_after_audio_only_call_renegotiates() {
        let mut rig = rig();
        rig.media.fail_video();
        connect_to(&mut rig, "peer-b").await;
        // The engine sees the Connected report.
        rig.engine
            .handle_link_event(crate::call::link::LinkEvent::StateChange {
                peer_id: "peer-b".to_string(),
                state: LinkState::Connected,
            })
            .await;
        drain_outbound(&mut rig);

        // Camera becomes available again.
        let link = rig.connector.link_for("peer-b").unwrap();
        let offers_before = link.offers_created();
        rig.media.allow_video();

        // First toggle turns the (absent) camera off, second turns it on.
        rig.engine.toggle_camera().await.unwrap();
        let (_, video) = rig.engine.toggle_camera().await.unwrap();
        assert!(video);

        assert_eq!(link.offers_created(), offers_before + 1);
        assert_eq!(
            rig.engine.session_state("peer-b"),
            Some(crate::call::CallState::Renegotiating)
        );

        let outbound = drain_outbound(&mut rig);
        assert!(outbound.iter().any(|ev| matches!(
            ev,
            ClientEvent::ToggleMedia { video: true, .. }
        )));
        assert!(outbound
            .iter()
            .any(|ev| matches!(ev, ClientEvent::Offer { .. })));
    }
}
