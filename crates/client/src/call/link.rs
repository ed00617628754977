//! Transport seams for the negotiation engine
//!
//! A [`PeerLink`] is one underlying peer connection; a [`PeerConnector`]
//! creates them. The production implementations in [`super::rtc`] wrap the
//! `webrtc` crate; tests substitute fakes. Links report asynchronous
//! happenings ([`LinkEvent`]) on a channel that the client's dispatch task
//! feeds back into the engine, so engine state is only ever touched from one
//! task.

use crate::call::media::LocalTrack;
use crate::call::session::RemoteTrack;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use watchroom_protocol::{CandidateInit, SignalPayload};

/// Low-level connection state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Negotiation/ICE in progress
    Connecting,
    /// Transport established
    Connected,
    /// Transport lost; treated as failure by the engine
    Disconnected,
    /// Transport failed
    Failed,
    /// Transport closed; terminal confirmation
    Closed,
}

/// Asynchronous transport happenings, tagged with the signaling peer id
///
/// Raw transport APIs do not carry peer identity; the connector stamps each
/// event with the peer id the link was opened for, which is the only
/// identity the engine ever routes by.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A local ICE candidate was discovered and should be relayed
    LocalCandidate {
        /// Peer the candidate belongs to
        peer_id: String,
        /// The discovered candidate
        candidate: CandidateInit,
    },

    /// The transport-level connection state changed
    StateChange {
        /// Peer whose link changed
        peer_id: String,
        /// New transport state
        state: LinkState,
    },

    /// A remote media track arrived
    RemoteTrack {
        /// Peer the track originates from
        peer_id: String,
        /// Track descriptor
        track: RemoteTrack,
    },

    /// The transport wants a new offer/answer cycle
    NegotiationNeeded {
        /// Peer whose link needs renegotiation
        peer_id: String,
    },
}

/// One underlying peer connection
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Create an offer and install it as the local description
    async fn create_offer(&self) -> Result<SignalPayload>;

    /// Create an answer for the applied remote offer
    async fn create_answer(&self) -> Result<SignalPayload>;

    /// Apply the remote session description
    async fn set_remote_description(&self, signal: &SignalPayload) -> Result<()>;

    /// Apply a relayed remote ICE candidate
    async fn add_ice_candidate(&self, candidate: &CandidateInit) -> Result<()>;

    /// Attach a local media track
    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<()>;

    /// Close the connection; must be safe to call more than once
    async fn close(&self) -> Result<()>;
}

/// Factory for [`PeerLink`]s
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Open a link toward `peer_id`, reporting happenings on `events`
    async fn open_link(
        &self,
        peer_id: &str,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Arc<dyn PeerLink>>;
}
