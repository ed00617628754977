//! Typed relay channel events
//!
//! [`ServerEvent`] covers everything the relay delivers to a client;
//! [`ClientEvent`] covers everything a client sends. The relay forwards
//! event payloads unchanged, so both directions share payload shapes.

use crate::playback::PlaybackState;
use crate::signal::{CandidateInit, SignalPayload};
use crate::DecodeError;
use serde::{Deserialize, Serialize};

/// One participant as announced by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// Relay-visible connection id
    pub id: String,

    /// Display name chosen at join time
    pub name: String,

    /// Join timestamp in epoch milliseconds, when the relay reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<u64>,
}

/// Events delivered by the relay to this client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Roster snapshot sent right after joining
    ExistingUsers(Vec<UserInfo>),

    /// Another participant joined the room
    UserJoined(UserInfo),

    /// A participant left the room
    UserLeft {
        /// Connection id of the departed participant
        id: String,
    },

    /// Current list of uploaded video filenames
    AvailableVideos(Vec<String>),

    /// A participant selected a video for the room
    VideoSelected {
        /// Selected video filename
        filename: String,
    },

    /// A participant deleted an uploaded video
    VideoDeleted {
        /// Deleted video filename
        filename: String,
    },

    /// Authoritative playback state broadcast
    VideoState(PlaybackState),

    /// A participant pressed play
    Play {
        /// Playhead position at the moment of the action
        time: f64,
    },

    /// A participant pressed pause
    Pause {
        /// Playhead position at the moment of the action
        time: f64,
    },

    /// A participant seeked
    Seek {
        /// Seek target in seconds
        time: f64,
    },

    /// A participant muted shared playback
    Mute,

    /// A participant unmuted shared playback
    Unmute,

    /// A participant changed shared playback volume
    VolumeChange {
        /// New volume in `[0, 1]`
        level: f64,
    },

    /// SDP offer relayed from a peer
    Offer {
        /// Originating peer id
        from: String,
        /// Session description
        signal: SignalPayload,
    },

    /// SDP answer relayed from a peer
    Answer {
        /// Originating peer id
        from: String,
        /// Session description
        signal: SignalPayload,
    },

    /// ICE candidate relayed from a peer
    IceCandidate {
        /// Originating peer id
        from: String,
        /// Discovered candidate
        candidate: CandidateInit,
    },

    /// A peer wants to start a call with us
    IncomingCall {
        /// Calling peer id
        from: String,
    },

    /// The callee accepted our call invitation
    CallAccepted {
        /// Callee's session description
        signal: SignalPayload,
    },

    /// A peer toggled its microphone/camera intent
    RemoteMediaToggled {
        /// Peer whose media changed
        #[serde(rename = "peerId")]
        peer_id: String,
        /// Whether the peer's microphone is enabled
        audio: bool,
        /// Whether the peer's camera is enabled
        video: bool,
    },

    /// The room is at capacity; the relay will drop this connection
    ServerFull,

    /// Upload progress relayed while a participant uploads a video
    UploadProgress {
        /// Fraction complete in `[0, 1]`
        progress: f64,
        /// Estimated seconds remaining
        remaining: f64,
        /// Upload speed in bytes per second
        speed: f64,
    },
}

/// Events sent by this client to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Announce presence; must precede all other traffic on a connection
    ///
    /// Carries the client-chosen connection id so peers and the relay share
    /// one identity for roster entries, signaling routing, and
    /// `lastUpdatedBy` stamps.
    UserJoin {
        /// Display name
        name: String,
        /// Client-chosen connection id
        id: String,
    },

    /// Select a video for the room
    SelectVideo {
        /// Video filename
        filename: String,
    },

    /// Authoritative playback state stamped with our session id and revision
    VideoState(PlaybackState),

    /// Local play action
    Play {
        /// Playhead position at the moment of the action
        time: f64,
    },

    /// Local pause action
    Pause {
        /// Playhead position at the moment of the action
        time: f64,
    },

    /// Local seek action
    Seek {
        /// Seek target in seconds
        time: f64,
    },

    /// Local mute action
    Mute,

    /// Local unmute action
    Unmute,

    /// Local volume change
    VolumeChange {
        /// New volume in `[0, 1]`
        level: f64,
    },

    /// Invite a peer to a call
    CallUser {
        /// Invited peer id
        to: String,
        /// Our peer id
        from: String,
    },

    /// Send an SDP offer to a peer
    Offer {
        /// Destination peer id
        target: String,
        /// Session description
        signal: SignalPayload,
    },

    /// Send an SDP answer to a peer
    Answer {
        /// Destination peer id
        target: String,
        /// Session description
        signal: SignalPayload,
    },

    /// Send an ICE candidate to a peer
    IceCandidate {
        /// Destination peer id
        target: String,
        /// Discovered candidate
        candidate: CandidateInit,
    },

    /// Broadcast our microphone/camera intent
    ToggleMedia {
        /// Whether our microphone is enabled
        audio: bool,
        /// Whether our camera is enabled
        video: bool,
    },

    /// Request the current video list
    GetVideos,
}

impl ServerEvent {
    /// Parse an inbound text frame
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode for loopback/testing
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientEvent {
    /// Encode an outbound text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse for loopback/testing
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_name(json: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        value["event"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_server_event_wire_names() {
        let cases = vec![
            (
                ServerEvent::ExistingUsers(vec![]),
                "existing-users",
            ),
            (
                ServerEvent::UserJoined(UserInfo {
                    id: "abc".into(),
                    name: "alice".into(),
                    joined_at: None,
                }),
                "user-joined",
            ),
            (ServerEvent::UserLeft { id: "abc".into() }, "user-left"),
            (ServerEvent::AvailableVideos(vec![]), "available-videos"),
            (
                ServerEvent::VideoSelected {
                    filename: "movie.mp4".into(),
                },
                "video-selected",
            ),
            (
                ServerEvent::VideoDeleted {
                    filename: "movie.mp4".into(),
                },
                "video-deleted",
            ),
            (ServerEvent::Play { time: 1.0 }, "play"),
            (ServerEvent::Pause { time: 1.0 }, "pause"),
            (ServerEvent::Seek { time: 1.0 }, "seek"),
            (ServerEvent::Mute, "mute"),
            (ServerEvent::Unmute, "unmute"),
            (ServerEvent::VolumeChange { level: 0.5 }, "volume-change"),
            (
                ServerEvent::IncomingCall { from: "abc".into() },
                "incoming-call",
            ),
            (ServerEvent::ServerFull, "server-full"),
            (
                ServerEvent::UploadProgress {
                    progress: 0.4,
                    remaining: 12.0,
                    speed: 1024.0,
                },
                "upload-progress",
            ),
        ];

        for (event, expected) in cases {
            let json = event.to_json().unwrap();
            assert_eq!(wire_name(&json), expected, "payload: {}", json);
        }
    }

    #[test]
    fn test_client_event_wire_names() {
        let cases = vec![
            (
                ClientEvent::UserJoin {
                    name: "alice".into(),
                    id: "peer-1".into(),
                },
                "user-join",
            ),
            (
                ClientEvent::SelectVideo {
                    filename: "movie.mp4".into(),
                },
                "select-video",
            ),
            (ClientEvent::Play { time: 0.0 }, "play"),
            (ClientEvent::Pause { time: 0.0 }, "pause"),
            (ClientEvent::Seek { time: 9.0 }, "seek"),
            (ClientEvent::Mute, "mute"),
            (ClientEvent::Unmute, "unmute"),
            (ClientEvent::VolumeChange { level: 0.2 }, "volume-change"),
            (
                ClientEvent::CallUser {
                    to: "b".into(),
                    from: "a".into(),
                },
                "call-user",
            ),
            (
                ClientEvent::ToggleMedia {
                    audio: true,
                    video: false,
                },
                "toggle-media",
            ),
            (ClientEvent::GetVideos, "get-videos"),
        ];

        for (event, expected) in cases {
            let json = event.to_json().unwrap();
            assert_eq!(wire_name(&json), expected, "payload: {}", json);
        }
    }

    #[test]
    fn test_signaling_events_round_trip() {
        let offer = ClientEvent::Offer {
            target: "peer-b".into(),
            signal: SignalPayload::offer("v=0\r\n"),
        };
        let json = offer.to_json().unwrap();
        assert_eq!(wire_name(&json), "offer");
        assert_eq!(ClientEvent::from_json(&json).unwrap(), offer);

        let candidate = ServerEvent::IceCandidate {
            from: "peer-b".into(),
            candidate: CandidateInit {
                candidate: "candidate:1 1 udp 2130706431 192.0.2.1 54321 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
            },
        };
        let json = candidate.to_json().unwrap();
        assert_eq!(wire_name(&json), "ice-candidate");
        assert_eq!(ServerEvent::from_json(&json).unwrap(), candidate);
    }

    #[test]
    fn test_remote_media_toggled_uses_peer_id_key() {
        let event = ServerEvent::RemoteMediaToggled {
            peer_id: "peer-b".into(),
            audio: false,
            video: true,
        };
        let json = event.to_json().unwrap();
        assert_eq!(wire_name(&json), "remote-media-toggled");
        assert!(json.contains("\"peerId\""));
    }

    #[test]
    fn test_video_state_envelope() {
        let state = PlaybackState::initial("movie.mp4", "session-a");
        let json = ServerEvent::VideoState(state.clone()).to_json().unwrap();
        assert_eq!(wire_name(&json), "video-state");

        let parsed = ServerEvent::from_json(&json).unwrap();
        assert_eq!(parsed, ServerEvent::VideoState(state));
    }

    #[test]
    fn test_unit_events_decode_without_data() {
        let event = ServerEvent::from_json(r#"{"event":"mute"}"#).unwrap();
        assert_eq!(event, ServerEvent::Mute);

        let event = ServerEvent::from_json(r#"{"event":"server-full"}"#).unwrap();
        assert_eq!(event, ServerEvent::ServerFull);
    }

    #[test]
    fn test_unknown_event_is_a_decode_error() {
        assert!(ServerEvent::from_json(r#"{"event":"no-such-event","data":{}}"#).is_err());
        assert!(ServerEvent::from_json("not json at all").is_err());
    }
}
