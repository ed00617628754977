//! Signaling channel adapter
//!
//! Wraps the persistent WebSocket connection to the relay behind typed
//! send/receive of protocol events. Owns the reconnect policy and the local
//! [`Session`] identity; everything else in the client consumes events and
//! never touches the transport.

mod connection;

pub use connection::{ChannelSender, ChannelStatus, Session, SignalingChannel};
