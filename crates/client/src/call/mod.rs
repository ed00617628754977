//! Call negotiation
//!
//! The engine owns every [`CallSession`] and runs the offer/answer/ICE
//! lifecycle over the relay. The WebRTC stack and device acquisition sit
//! behind the [`PeerConnector`] and [`MediaSource`] seams so the negotiation
//! state machine is testable without a network.

mod controls;
mod engine;
mod link;
mod media;
mod rtc;
mod session;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{CallEngine, CallEvent, EndReason};
pub use link::{LinkEvent, LinkState, PeerConnector, PeerLink};
pub use media::{LocalTrack, MediaDeviceGrant, MediaMode, MediaSource, TrackKind};
pub use rtc::{RtcConnector, RtcLocalTrack, RtcMediaSource};
pub use session::{CallSession, RemoteTrack};
pub use state::CallState;
