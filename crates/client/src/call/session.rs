//! Call session bookkeeping

use crate::call::link::PeerLink;
use crate::call::media::{MediaDeviceGrant, MediaMode, TrackKind};
use crate::call::state::CallState;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;
use watchroom_protocol::CandidateInit;

/// Descriptor of a remote media track, tagged with signaling identity
///
/// UI-facing stream construction derives from these descriptors, never from
/// an unqualified "the remote stream".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    /// Transport-level track id
    pub id: String,

    /// Track kind
    pub kind: TrackKind,
}

/// One negotiated or negotiating peer link
///
/// Exclusively owned by the [`super::CallEngine`]; at most one non-terminal
/// session exists per remote peer.
pub struct CallSession {
    remote_peer_id: String,
    state: CallState,
    link: Option<Arc<dyn PeerLink>>,
    grant: Option<MediaDeviceGrant>,
    pending_ice: VecDeque<CandidateInit>,
    remote_description_set: bool,
    remote_tracks: Vec<RemoteTrack>,
    media_mode: Option<MediaMode>,
}

impl CallSession {
    /// New session toward `remote_peer_id`, starting in [`CallState::Idle`]
    pub fn new(remote_peer_id: impl Into<String>) -> Self {
        Self {
            remote_peer_id: remote_peer_id.into(),
            state: CallState::Idle,
            link: None,
            grant: None,
            pending_ice: VecDeque::new(),
            remote_description_set: false,
            remote_tracks: Vec::new(),
            media_mode: None,
        }
    }

    /// Remote peer this session belongs to
    pub fn peer_id(&self) -> &str {
        &self.remote_peer_id
    }

    /// Current state
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Whether the session is terminal
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Transition to `new_state`, logging the change
    pub fn set_state(&mut self, new_state: CallState) {
        if self.state != new_state {
            debug!(
                "Call {} state transition: {:?} -> {:?}",
                self.remote_peer_id, self.state, new_state
            );
            self.state = new_state;
        }
    }

    /// Attach the underlying transport link
    pub fn set_link(&mut self, link: Arc<dyn PeerLink>) {
        self.link = Some(link);
    }

    /// The underlying transport link, if opened
    pub fn link(&self) -> Option<Arc<dyn PeerLink>> {
        self.link.clone()
    }

    /// Attach the acquired media grant
    pub fn set_grant(&mut self, grant: MediaDeviceGrant) {
        self.grant = Some(grant);
    }

    /// The media grant, if acquired
    pub fn grant(&self) -> Option<&MediaDeviceGrant> {
        self.grant.as_ref()
    }

    /// Mutable access to the media grant
    pub fn grant_mut(&mut self) -> Option<&mut MediaDeviceGrant> {
        self.grant.as_mut()
    }

    /// Which media mode acquisition reached
    pub fn media_mode(&self) -> Option<MediaMode> {
        self.media_mode
    }

    /// Record the reached media mode
    pub fn set_media_mode(&mut self, mode: MediaMode) {
        self.media_mode = Some(mode);
    }

    /// Whether the remote description has been applied
    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    /// Record whether the remote description is applied
    ///
    /// Reset to `false` when a renegotiation cycle starts, so candidates for
    /// the new cycle buffer again.
    pub fn mark_remote_description(&mut self, set: bool) {
        self.remote_description_set = set;
    }

    /// Buffer a candidate that arrived before the remote description
    pub fn buffer_candidate(&mut self, candidate: CandidateInit) {
        debug!(
            "Buffering ICE candidate for {} ({} pending)",
            self.remote_peer_id,
            self.pending_ice.len() + 1
        );
        self.pending_ice.push_back(candidate);
    }

    /// Take all buffered candidates in arrival order
    pub fn drain_candidates(&mut self) -> Vec<CandidateInit> {
        self.pending_ice.drain(..).collect()
    }

    /// Number of buffered candidates
    pub fn pending_candidates(&self) -> usize {
        self.pending_ice.len()
    }

    /// Discard buffered candidates
    pub fn clear_candidates(&mut self) {
        self.pending_ice.clear();
    }

    /// Record a remote track for this peer
    pub fn add_remote_track(&mut self, track: RemoteTrack) {
        self.remote_tracks.push(track);
    }

    /// Remote tracks received on this session
    pub fn remote_tracks(&self) -> &[RemoteTrack] {
        &self.remote_tracks
    }

    /// Release local resources: stop the grant's tracks, drop buffers
    ///
    /// Closing the transport link is asynchronous and handled by the engine.
    pub fn release_local(&mut self) {
        if let Some(grant) = self.grant.as_mut() {
            grant.release();
        }
        self.pending_ice.clear();
    }
}
