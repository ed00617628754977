//! Watchroom client core
//!
//! The client half of a synchronized group video-watching room with
//! peer-to-peer audio/video calling. The UI is elsewhere; this crate owns
//! the three hard parts and the plumbing between them:
//!
//! - **Signaling channel adapter** ([`channel`]): a typed event channel over
//!   a WebSocket relay connection, with bounded-backoff reconnect and
//!   re-join-first ordering.
//! - **Playback reconciler** ([`playback`]): merges local actions and remote
//!   broadcasts into one authoritative decision for the media sink, with
//!   self-echo suppression, revision gating, and drift correction.
//! - **Call negotiation engine** ([`call`]): offer/answer/ICE lifecycle over
//!   the relay, with candidate buffering, last-offer-wins, renegotiation,
//!   audio-only degradation, and peer-tagged track routing.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  Application (UI, capture, rendering)                 │
//! │  ↕ ClientHandle commands / AppEvent stream            │
//! │  WatchroomClient (single dispatch task)               │
//! │  ├─ SignalingChannel (WebSocket relay, reconnect)     │
//! │  ├─ PlaybackReconciler → MediaSink                    │
//! │  ├─ CallEngine → PeerConnector/MediaSource seams      │
//! │  │   └─ RtcConnector/RtcMediaSource (webrtc crate)    │
//! │  ├─ Roster / VideoLibrary                             │
//! │  └─ watchroom-protocol (wire events)                  │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use watchroom_client::{
//!     ClientConfig, RecordingSink, RtcConnector, RtcMediaSource, WatchroomClient,
//! };
//!
//! let config = ClientConfig {
//!     endpoint: "ws://relay.example.com:4000".to_string(),
//!     display_name: "alice".to_string(),
//!     ..ClientConfig::default()
//! };
//!
//! let connector = Arc::new(RtcConnector::new(&config)?);
//! let (client, mut events) = WatchroomClient::connect(
//!     config,
//!     Arc::new(RecordingSink::new()),
//!     connector,
//!     Arc::new(RtcMediaSource::new()),
//! )
//! .await?;
//!
//! let handle = client.handle();
//! tokio::spawn(client.run());
//!
//! handle.select_video("movie.mp4")?;
//! handle.play()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod library;
pub mod playback;
pub mod roster;

pub use call::{
    CallEngine, CallEvent, CallState, EndReason, LinkEvent, LinkState, LocalTrack,
    MediaDeviceGrant, MediaMode, MediaSource, PeerConnector, PeerLink, RemoteTrack, RtcConnector,
    RtcLocalTrack, RtcMediaSource, TrackKind,
};
pub use channel::{ChannelSender, ChannelStatus, Session, SignalingChannel};
pub use client::{AppEvent, ClientHandle, Command, WatchroomClient};
pub use config::{ClientConfig, IceServerConfig, ReconnectPolicy};
pub use error::{Error, Result};
pub use library::VideoLibrary;
pub use playback::{MediaSink, PlaybackPhase, PlaybackReconciler, RecordingSink, SinkOp};
pub use roster::{Participant, Roster};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
