//! Signaling payload types carried inside offer/answer/ICE events
//!
//! These mirror the JSON shapes produced by browser peers
//! (`RTCSessionDescription` / `RTCIceCandidateInit`), so a native client can
//! interoperate with web clients over the same relay.

use serde::{Deserialize, Serialize};

/// Kind of session description inside a [`SignalPayload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// SDP offer, sent by the negotiation initiator
    Offer,
    /// SDP answer, sent in response to an offer
    Answer,
}

/// A session description exchanged through the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    /// Description kind
    #[serde(rename = "type")]
    pub kind: SignalKind,

    /// Raw SDP text
    pub sdp: String,
}

impl SignalPayload {
    /// Build an offer payload
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Build an answer payload
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A discovered ICE candidate exchanged through the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateInit {
    /// Candidate description line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Index of the media description this candidate belongs to
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}
