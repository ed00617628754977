//! Call negotiation engine
//!
//! Owns every call session and runs the offer/answer/ICE lifecycle. All
//! methods are invoked from the client's single dispatch task; transport
//! callbacks come back in as [`LinkEvent`]s through the same task, so there
//! is no concurrent access to engine state.

use crate::call::link::{LinkEvent, LinkState, PeerConnector, PeerLink};
use crate::call::media::{MediaDeviceGrant, MediaMode, MediaSource, TrackKind};
use crate::call::session::{CallSession, RemoteTrack};
use crate::call::state::CallState;
use crate::channel::ChannelSender;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use watchroom_protocol::{CandidateInit, ClientEvent, SignalPayload};

/// Why a call session reached a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// A participant hung up
    Hangup,
    /// The remote peer left the room
    PeerLeft,
    /// Replaced by a newer incoming offer (last-offer-wins)
    Superseded,
    /// The transport reported disconnected/failed
    ConnectionFailed,
    /// The relay connection was lost; the old peer identity is invalid
    SignalingLost,
}

impl EndReason {
    fn terminal_state(&self) -> CallState {
        match self {
            EndReason::Hangup | EndReason::PeerLeft | EndReason::Superseded => CallState::Ended,
            EndReason::ConnectionFailed | EndReason::SignalingLost => CallState::Failed,
        }
    }
}

/// Engine-level happenings surfaced to the embedding application
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// A peer invites us to a call
    IncomingCall {
        /// Calling peer id
        from: String,
    },

    /// A session changed state
    StateChanged {
        /// Remote peer
        peer_id: String,
        /// New state
        state: CallState,
    },

    /// Media acquisition finished with this mode
    MediaModeSelected {
        /// Remote peer the media was acquired for
        peer_id: String,
        /// Reached mode (full, or degraded to audio-only)
        mode: MediaMode,
    },

    /// A remote track arrived and was routed to its peer
    RemoteTrackAdded {
        /// Originating peer
        peer_id: String,
        /// Track descriptor
        track: RemoteTrack,
    },

    /// A peer toggled its microphone/camera intent
    RemoteMediaToggled {
        /// Peer whose media changed
        peer_id: String,
        /// Microphone enabled
        audio: bool,
        /// Camera enabled
        video: bool,
    },

    /// A session reached a terminal state
    Ended {
        /// Remote peer
        peer_id: String,
        /// Why the session ended
        reason: EndReason,
    },
}

/// The call negotiation engine
pub struct CallEngine {
    pub(in crate::call) local_peer_id: Option<String>,
    pub(in crate::call) connector: Arc<dyn PeerConnector>,
    pub(in crate::call) media: Arc<dyn MediaSource>,
    pub(in crate::call) outbound: ChannelSender,
    pub(in crate::call) events_tx: mpsc::UnboundedSender<CallEvent>,
    pub(in crate::call) link_tx: mpsc::UnboundedSender<LinkEvent>,
    pub(in crate::call) sessions: HashMap<String, CallSession>,
    pub(in crate::call) pending_invite: Option<String>,
    pub(in crate::call) audio_wanted: bool,
    pub(in crate::call) video_wanted: bool,
    pub(in crate::call) mic_gain: f64,
    pub(in crate::call) remote_volumes: HashMap<String, f64>,
    pub(in crate::call) remote_media: HashMap<String, (bool, bool)>,
}

impl CallEngine {
    /// Create an engine over the given transport and media seams
    ///
    /// Returns the engine plus the receivers for [`CallEvent`]s (consumed by
    /// the application) and [`LinkEvent`]s (fed back into
    /// [`handle_link_event`](Self::handle_link_event) by the dispatch task).
    pub fn new(
        connector: Arc<dyn PeerConnector>,
        media: Arc<dyn MediaSource>,
        outbound: ChannelSender,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<CallEvent>,
        mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        (
            Self {
                local_peer_id: None,
                connector,
                media,
                outbound,
                events_tx,
                link_tx,
                sessions: HashMap::new(),
                pending_invite: None,
                audio_wanted: true,
                video_wanted: true,
                mic_gain: 1.0,
                remote_volumes: HashMap::new(),
                remote_media: HashMap::new(),
            },
            events_rx,
            link_rx,
        )
    }

    /// Adopt the announced relay identity
    pub fn set_local_peer_id(&mut self, peer_id: impl Into<String>) {
        self.local_peer_id = Some(peer_id.into());
    }

    /// Our signaling identity, once announced
    pub fn local_peer_id(&self) -> Result<String> {
        self.local_peer_id
            .clone()
            .ok_or_else(|| Error::ChannelError("not announced to the relay yet".to_string()))
    }

    /// State of the session with `peer_id`, if one exists
    pub fn session_state(&self, peer_id: &str) -> Option<CallState> {
        self.sessions.get(peer_id).map(|s| s.state())
    }

    /// Remote tracks of every live session, keyed by signaling peer id
    pub fn remote_tracks_by_peer(&self) -> HashMap<String, Vec<RemoteTrack>> {
        self.sessions
            .values()
            .filter(|s| !s.is_terminal())
            .map(|s| (s.peer_id().to_string(), s.remote_tracks().to_vec()))
            .collect()
    }

    /// Send a `call-user` invitation
    ///
    /// Guarded: fails with [`Error::NoPeerAvailable`] when no peer id is
    /// given. The actual offer flows once the callee accepts and initiates.
    pub fn invite(&mut self, remote_peer_id: Option<String>) -> Result<()> {
        let remote = remote_peer_id.ok_or(Error::NoPeerAvailable)?;
        let local = self.local_peer_id()?;

        info!("Inviting {} to a call", remote);
        self.pending_invite = Some(remote.clone());
        self.outbound.send(ClientEvent::CallUser {
            to: remote,
            from: local,
        })
    }

    /// Start a call: acquire media, open a link, send the offer
    pub async fn initiate(&mut self, remote_peer_id: Option<String>) -> Result<()> {
        let remote = remote_peer_id.ok_or(Error::NoPeerAvailable)?;
        self.local_peer_id()?;

        if self
            .sessions
            .get(&remote)
            .map(|s| !s.is_terminal())
            .unwrap_or(false)
        {
            self.teardown(&remote, EndReason::Superseded).await;
        }

        info!("Initiating call to {}", remote);
        self.sessions
            .insert(remote.clone(), CallSession::new(remote.clone()));
        self.transition(&remote, CallState::Requesting);

        match self.start_outgoing(&remote).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.teardown(&remote, EndReason::ConnectionFailed).await;
                Err(e)
            }
        }
    }

    async fn start_outgoing(&mut self, remote: &str) -> Result<()> {
        self.attach_media(remote).await?;
        let link = self.open_link(remote).await?;

        let offer = link.create_offer().await?;
        self.outbound.send(ClientEvent::Offer {
            target: remote.to_string(),
            signal: offer,
        })?;
        self.transition(remote, CallState::OfferSent);
        Ok(())
    }

    /// Handle a relayed offer from `from`
    ///
    /// Last-offer-wins: an existing session with the same peer, and any
    /// session still mid-negotiation with another peer, is closed first.
    /// Connected sessions with other peers survive (multi-peer mesh).
    pub async fn handle_incoming_offer(
        &mut self,
        from: String,
        signal: SignalPayload,
    ) -> Result<()> {
        let stale: Vec<String> = self
            .sessions
            .values()
            .filter(|s| {
                !s.is_terminal() && (s.peer_id() == from || s.state().is_negotiating())
            })
            .map(|s| s.peer_id().to_string())
            .collect();
        for peer in stale {
            debug!("Superseding session with {} (last-offer-wins)", peer);
            self.teardown(&peer, EndReason::Superseded).await;
        }

        info!("Handling incoming offer from {}", from);
        self.sessions
            .insert(from.clone(), CallSession::new(from.clone()));
        self.transition(&from, CallState::Requesting);

        match self.answer_incoming(&from, &signal).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.teardown(&from, EndReason::ConnectionFailed).await;
                Err(e)
            }
        }
    }

    async fn answer_incoming(&mut self, from: &str, signal: &SignalPayload) -> Result<()> {
        self.attach_media(from).await?;
        let link = self.open_link(from).await?;

        link.set_remote_description(signal).await?;
        if let Some(session) = self.sessions.get_mut(from) {
            session.mark_remote_description(true);
        }
        self.transition(from, CallState::OfferReceived);
        self.flush_candidates(from).await;

        let answer = link.create_answer().await?;
        self.outbound.send(ClientEvent::Answer {
            target: from.to_string(),
            signal: answer,
        })?;
        self.transition(from, CallState::AnswerSent);
        Ok(())
    }

    /// Handle a relayed answer from `from`
    ///
    /// Applies only when an offer of ours is outstanding; anything else is a
    /// stale or duplicate answer and is logged and discarded.
    pub async fn handle_answer(&mut self, from: String, signal: SignalPayload) -> Result<()> {
        let Some(session) = self.sessions.get(&from) else {
            debug!("Discarding answer from {} with no session", from);
            return Ok(());
        };
        if !matches!(
            session.state(),
            CallState::OfferSent | CallState::Renegotiating
        ) {
            debug!(
                "Discarding stale answer from {} in {:?}",
                from,
                session.state()
            );
            return Ok(());
        }
        if session.remote_description_set() {
            debug!("Discarding duplicate answer from {}", from);
            return Ok(());
        }
        let was_renegotiating = session.state() == CallState::Renegotiating;
        let Some(link) = session.link() else {
            debug!("Discarding answer from {} with no link", from);
            return Ok(());
        };

        if let Err(e) = link.set_remote_description(&signal).await {
            warn!("Failed to apply answer from {}: {}", from, e);
            self.teardown(&from, EndReason::ConnectionFailed).await;
            return Err(e);
        }
        if let Some(session) = self.sessions.get_mut(&from) {
            session.mark_remote_description(true);
        }
        self.flush_candidates(&from).await;

        if was_renegotiating {
            self.transition(&from, CallState::Connected);
        }
        Ok(())
    }

    /// Handle `call-accepted`, which carries an answer but no sender id
    ///
    /// Routed to the invited peer's awaiting offer, or the single awaiting
    /// offer if unambiguous; otherwise discarded as stale.
    pub async fn handle_call_accepted(&mut self, signal: SignalPayload) -> Result<()> {
        let invited = self.pending_invite.clone().filter(|peer| {
            self.session_state(peer) == Some(CallState::OfferSent)
        });
        let target = invited.or_else(|| {
            let mut awaiting = self
                .sessions
                .values()
                .filter(|s| s.state() == CallState::OfferSent);
            match (awaiting.next(), awaiting.next()) {
                (Some(only), None) => Some(only.peer_id().to_string()),
                _ => None,
            }
        });

        match target {
            Some(peer) => self.handle_answer(peer, signal).await,
            None => {
                debug!("Discarding call-accepted with no awaiting offer");
                Ok(())
            }
        }
    }

    /// Handle a relayed ICE candidate from `from`
    ///
    /// Buffered until the remote description is applied, then flushed in
    /// arrival order; candidates for terminal sessions are dropped silently.
    pub async fn handle_ice_candidate(&mut self, from: String, candidate: CandidateInit) {
        let Some(session) = self.sessions.get_mut(&from) else {
            debug!("Dropping candidate from {} with no session", from);
            return;
        };
        if session.is_terminal() {
            debug!("Dropping candidate for terminal session with {}", from);
            return;
        }
        if !session.remote_description_set() {
            session.buffer_candidate(candidate);
            return;
        }
        let Some(link) = session.link() else {
            session.buffer_candidate(candidate);
            return;
        };
        if let Err(e) = link.add_ice_candidate(&candidate).await {
            warn!("Failed to add ICE candidate from {}: {}", from, e);
        }
    }

    async fn flush_candidates(&mut self, peer_id: &str) {
        let (link, pending) = match self.sessions.get_mut(peer_id) {
            Some(session) if session.remote_description_set() => {
                (session.link(), session.drain_candidates())
            }
            _ => return,
        };
        let Some(link) = link else { return };

        if !pending.is_empty() {
            debug!(
                "Flushing {} buffered candidates for {}",
                pending.len(),
                peer_id
            );
        }
        for candidate in pending {
            if let Err(e) = link.add_ice_candidate(&candidate).await {
                warn!("Failed to flush ICE candidate for {}: {}", peer_id, e);
            }
        }
    }

    /// Re-run the offer/answer cycle on a live session
    ///
    /// Triggered when the local track set changes or the transport signals
    /// negotiation is needed. No-op unless the session is `Connected`, which
    /// also keeps a transport-originated trigger from racing a cycle we
    /// already started.
    pub async fn renegotiate(&mut self, peer_id: &str) -> Result<()> {
        let Some(session) = self.sessions.get(peer_id) else {
            return Ok(());
        };
        if session.state() != CallState::Connected {
            debug!(
                "Skipping renegotiation for {} in {:?}",
                peer_id,
                session.state()
            );
            return Ok(());
        }
        let Some(link) = session.link() else {
            return Ok(());
        };

        info!("Renegotiating call with {}", peer_id);
        self.transition(peer_id, CallState::Renegotiating);
        if let Some(session) = self.sessions.get_mut(peer_id) {
            session.mark_remote_description(false);
        }

        let sent = match link.create_offer().await {
            Ok(offer) => self.outbound.send(ClientEvent::Offer {
                target: peer_id.to_string(),
                signal: offer,
            }),
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Renegotiation with {} failed: {}", peer_id, e);
                self.teardown(peer_id, EndReason::ConnectionFailed).await;
                Err(e)
            }
        }
    }

    /// Handle a transport happening routed back by the dispatch task
    pub async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::LocalCandidate { peer_id, candidate } => {
                let live = self
                    .sessions
                    .get(&peer_id)
                    .map(|s| !s.is_terminal())
                    .unwrap_or(false);
                if live {
                    if let Err(e) = self.outbound.send(ClientEvent::IceCandidate {
                        target: peer_id,
                        candidate,
                    }) {
                        warn!("Failed to relay local candidate: {}", e);
                    }
                }
            }
            LinkEvent::StateChange { peer_id, state } => {
                self.handle_link_state(&peer_id, state).await;
            }
            LinkEvent::RemoteTrack { peer_id, track } => {
                let Some(session) = self.sessions.get_mut(&peer_id) else {
                    return;
                };
                if session.is_terminal() {
                    return;
                }
                session.add_remote_track(track.clone());
                self.emit(CallEvent::RemoteTrackAdded { peer_id, track });
            }
            LinkEvent::NegotiationNeeded { peer_id } => {
                let _ = self.renegotiate(&peer_id).await;
            }
        }
    }

    async fn handle_link_state(&mut self, peer_id: &str, state: LinkState) {
        let Some(session) = self.sessions.get(peer_id) else {
            return;
        };
        if session.is_terminal() {
            return;
        }
        match state {
            LinkState::Connected => {
                if session.state() != CallState::Connected {
                    self.transition(peer_id, CallState::Connected);
                }
            }
            LinkState::Disconnected | LinkState::Failed => {
                warn!("Transport for {} reported {:?}", peer_id, state);
                self.teardown(peer_id, EndReason::ConnectionFailed).await;
            }
            LinkState::Closed => {
                debug!("Transport for {} confirmed closed", peer_id);
            }
            LinkState::Connecting => {}
        }
    }

    /// A peer invites us; surfaced to the application for acceptance
    pub fn handle_incoming_call(&mut self, from: String) {
        self.emit(CallEvent::IncomingCall { from });
    }

    /// Accept an invitation by initiating toward the caller
    pub async fn accept_call(&mut self, from: String) -> Result<()> {
        self.initiate(Some(from)).await
    }

    /// Record and surface a peer's microphone/camera intent
    pub fn handle_remote_media_toggled(&mut self, peer_id: String, audio: bool, video: bool) {
        self.remote_media.insert(peer_id.clone(), (audio, video));
        self.emit(CallEvent::RemoteMediaToggled {
            peer_id,
            audio,
            video,
        });
    }

    /// Hang up the call with `peer_id`; idempotent and safe from any state
    pub async fn end_call(&mut self, peer_id: &str) -> Result<()> {
        self.teardown(peer_id, EndReason::Hangup).await;
        Ok(())
    }

    /// The peer left the room; its session is torn down
    pub async fn handle_peer_left(&mut self, peer_id: &str) {
        self.teardown(peer_id, EndReason::PeerLeft).await;
    }

    /// The relay connection was lost; every session assumed the old
    /// connection identity and is invalid
    pub async fn invalidate_all(&mut self) {
        let live: Vec<String> = self
            .sessions
            .values()
            .filter(|s| !s.is_terminal())
            .map(|s| s.peer_id().to_string())
            .collect();
        for peer in live {
            self.teardown(&peer, EndReason::SignalingLost).await;
        }
        self.local_peer_id = None;
        self.pending_invite = None;
    }

    async fn teardown(&mut self, peer_id: &str, reason: EndReason) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        if session.is_terminal() {
            return;
        }

        info!("Tearing down call with {} ({:?})", peer_id, reason);
        session.release_local();
        let link = session.link();
        let terminal = reason.terminal_state();
        session.set_state(terminal);

        if let Some(link) = link {
            if let Err(e) = link.close().await {
                debug!("Closing link for {}: {}", peer_id, e);
            }
        }

        self.emit(CallEvent::StateChanged {
            peer_id: peer_id.to_string(),
            state: terminal,
        });
        self.emit(CallEvent::Ended {
            peer_id: peer_id.to_string(),
            reason,
        });
    }

    async fn attach_media(&mut self, remote: &str) -> Result<()> {
        let (mut grant, mode) =
            MediaDeviceGrant::acquire(self.media.as_ref(), self.audio_wanted, self.video_wanted)
                .await?;

        if !self.audio_wanted {
            grant.set_kind_enabled(TrackKind::Audio, false);
        }
        grant.set_mic_gain(self.mic_gain);

        let audio = grant.audio_enabled();
        let video = grant.video_enabled();
        if let Some(session) = self.sessions.get_mut(remote) {
            session.set_media_mode(mode);
            session.set_grant(grant);
        }

        self.emit(CallEvent::MediaModeSelected {
            peer_id: remote.to_string(),
            mode,
        });
        self.outbound.send(ClientEvent::ToggleMedia { audio, video })?;
        Ok(())
    }

    async fn open_link(&mut self, remote: &str) -> Result<Arc<dyn PeerLink>> {
        let link = self.connector.open_link(remote, self.link_tx.clone()).await?;

        let tracks = self
            .sessions
            .get(remote)
            .and_then(|s| s.grant())
            .map(|g| g.tracks().to_vec())
            .unwrap_or_default();
        for track in tracks {
            link.add_track(track).await?;
        }

        if let Some(session) = self.sessions.get_mut(remote) {
            session.set_link(link.clone());
        }
        Ok(link)
    }

    fn transition(&mut self, peer_id: &str, state: CallState) {
        if let Some(session) = self.sessions.get_mut(peer_id) {
            session.set_state(state);
        }
        self.emit(CallEvent::StateChanged {
            peer_id: peer_id.to_string(),
            state,
        });
    }

    pub(in crate::call) fn emit(&self, event: CallEvent) {
        let _ = self.events_tx.send(event);
    }
}
