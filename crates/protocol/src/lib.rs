//! Wire protocol for the Watchroom relay channel
//!
//! This crate defines the typed events exchanged between clients and the
//! relay server, the shared [`PlaybackState`] model used for playback
//! synchronization, and the signaling payload types carried inside
//! offer/answer/ICE events. It performs no I/O; the client crate owns the
//! transport.
//!
//! # Wire format
//!
//! Every event is one JSON object per text frame:
//!
//! ```json
//! {"event": "video-state", "data": {"videoId": "movie.mp4", "isPlaying": true, ...}}
//! ```
//!
//! Event names are part of the protocol contract and are covered by tests;
//! renaming a variant here is a wire-breaking change.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod playback;
pub mod signal;

pub use events::{ClientEvent, ServerEvent, UserInfo};
pub use playback::{PlaybackState, ValidationError};
pub use signal::{CandidateInit, SignalKind, SignalPayload};

/// Error raised when a frame cannot be decoded into a protocol event
#[derive(Debug, thiserror::Error)]
#[error("malformed protocol frame: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
