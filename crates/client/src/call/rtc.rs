//! WebRTC-backed transport and media implementations
//!
//! [`RtcConnector`] and [`RtcLocalTrack`] wrap the `webrtc` crate behind the
//! engine's [`PeerConnector`]/[`PeerLink`]/[`LocalTrack`] seams. Transport
//! callbacks are stamped with the signaling peer id and forwarded as
//! [`LinkEvent`]s; the engine never sees raw transport identities.

use crate::call::link::{LinkEvent, LinkState, PeerConnector, PeerLink};
use crate::call::media::{LocalTrack, MediaSource, TrackKind};
use crate::call::session::RemoteTrack;
use crate::config::{ClientConfig, IceServerConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use watchroom_protocol::{CandidateInit, SignalKind, SignalPayload};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Connector backed by `webrtc::RTCPeerConnection`
pub struct RtcConnector {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl RtcConnector {
    /// Build the WebRTC API once and reuse it for every link
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnectionError(format!("codec registration: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| Error::PeerConnectionError(format!("interceptor registry: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            ice_servers: map_ice_servers(&config.ice_servers),
        })
    }
}

/// Convert configured ICE servers into the transport's representation
fn map_ice_servers(servers: &[IceServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|server| RTCIceServer {
            urls: vec![server.normalized_url()],
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

fn map_connection_state(state: RTCPeerConnectionState) -> Option<LinkState> {
    match state {
        RTCPeerConnectionState::Connecting => Some(LinkState::Connecting),
        RTCPeerConnectionState::Connected => Some(LinkState::Connected),
        RTCPeerConnectionState::Disconnected => Some(LinkState::Disconnected),
        RTCPeerConnectionState::Failed => Some(LinkState::Failed),
        RTCPeerConnectionState::Closed => Some(LinkState::Closed),
        _ => None,
    }
}

#[async_trait]
impl PeerConnector for RtcConnector {
    async fn open_link(
        &self,
        peer_id: &str,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Arc<dyn PeerLink>> {
        let rtc_config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        let pc = Arc::new(
            self.api
                .new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::PeerConnectionError(e.to_string()))?,
        );
        let peer = peer_id.to_string();
        debug!("Opened peer connection toward {}", peer);

        {
            let events = events.clone();
            let peer = peer.clone();
            pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let events = events.clone();
                let peer = peer.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else { return };
                    match candidate.to_json() {
                        Ok(init) => {
                            let _ = events.send(LinkEvent::LocalCandidate {
                                peer_id: peer,
                                candidate: CandidateInit {
                                    candidate: init.candidate,
                                    sdp_mid: init.sdp_mid,
                                    sdp_mline_index: init.sdp_mline_index,
                                },
                            });
                        }
                        Err(e) => warn!("Failed to serialize local candidate: {}", e),
                    }
                })
            }));
        }

        {
            let events = events.clone();
            let peer = peer.clone();
            pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let events = events.clone();
                let peer = peer.clone();
                Box::pin(async move {
                    if let Some(mapped) = map_connection_state(state) {
                        let _ = events.send(LinkEvent::StateChange {
                            peer_id: peer,
                            state: mapped,
                        });
                    }
                })
            }));
        }

        {
            let events = events.clone();
            let peer = peer.clone();
            pc.on_track(Box::new(move |track: Arc<TrackRemote>,
                                       _receiver: Arc<RTCRtpReceiver>,
                                       _transceiver: Arc<RTCRtpTransceiver>| {
                let events = events.clone();
                let peer = peer.clone();
                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Video => TrackKind::Video,
                        _ => TrackKind::Audio,
                    };
                    let _ = events.send(LinkEvent::RemoteTrack {
                        peer_id: peer,
                        track: RemoteTrack {
                            id: track.id(),
                            kind,
                        },
                    });
                })
            }));
        }

        {
            let peer = peer.clone();
            pc.on_negotiation_needed(Box::new(move || {
                let events = events.clone();
                let peer = peer.clone();
                Box::pin(async move {
                    let _ = events.send(LinkEvent::NegotiationNeeded { peer_id: peer });
                })
            }));
        }

        Ok(Arc::new(RtcPeerLink { pc, peer_id: peer }))
    }
}

/// One `RTCPeerConnection` behind the [`PeerLink`] seam
pub struct RtcPeerLink {
    pc: Arc<RTCPeerConnection>,
    peer_id: String,
}

#[async_trait]
impl PeerLink for RtcPeerLink {
    async fn create_offer(&self) -> Result<SignalPayload> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("create offer: {}", e)))?;
        let sdp = offer.sdp.clone();
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("set local offer: {}", e)))?;
        Ok(SignalPayload::offer(sdp))
    }

    async fn create_answer(&self) -> Result<SignalPayload> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("create answer: {}", e)))?;
        let sdp = answer.sdp.clone();
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("set local answer: {}", e)))?;
        Ok(SignalPayload::answer(sdp))
    }

    async fn set_remote_description(&self, signal: &SignalPayload) -> Result<()> {
        let description = match signal.kind {
            SignalKind::Offer => RTCSessionDescription::offer(signal.sdp.clone()),
            SignalKind::Answer => RTCSessionDescription::answer(signal.sdp.clone()),
        }
        .map_err(|e| Error::SdpError(format!("parse remote description: {}", e)))?;

        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| Error::SdpError(format!("set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: &CandidateInit) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate.clone(),
                sdp_mid: candidate.sdp_mid.clone(),
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: None,
            })
            .await
            .map_err(|e| Error::IceCandidateError(e.to_string()))
    }

    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<()> {
        let rtc_track = track
            .as_any()
            .downcast_ref::<RtcLocalTrack>()
            .ok_or_else(|| {
                Error::MediaTrackError("track was not produced by RtcMediaSource".to_string())
            })?
            .rtp_track();

        self.pc
            .add_track(rtc_track as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("add track: {}", e)))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!("Closing peer connection toward {}", self.peer_id);
        self.pc
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(e.to_string()))
    }
}

/// Local track backed by a `TrackLocalStaticSample`
///
/// `enabled` gates the sample writer (a disabled track sends silence by
/// sending nothing), mirroring `track.enabled` on browser tracks. The gain
/// is consumed by whatever feeds samples into the track.
pub struct RtcLocalTrack {
    inner: Arc<TrackLocalStaticSample>,
    kind: TrackKind,
    enabled: AtomicBool,
    gain_permille: AtomicU32,
}

impl RtcLocalTrack {
    fn new(inner: Arc<TrackLocalStaticSample>, kind: TrackKind) -> Self {
        Self {
            inner,
            kind,
            enabled: AtomicBool::new(true),
            gain_permille: AtomicU32::new(1000),
        }
    }

    /// The underlying RTP track for attaching to a peer connection
    pub fn rtp_track(&self) -> Arc<TrackLocalStaticSample> {
        self.inner.clone()
    }

    /// Gain in `[0, 1]` for the sample producer to apply
    pub fn gain(&self) -> f64 {
        f64::from(self.gain_permille.load(Ordering::Relaxed)) / 1000.0
    }

    /// Write one encoded media sample, honoring the enabled flag
    pub async fn write_sample(&self, sample: &Sample) -> Result<()> {
        if !self.enabled.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.inner
            .write_sample(sample)
            .await
            .map_err(|e| Error::MediaTrackError(format!("write sample: {}", e)))
    }
}

impl LocalTrack for RtcLocalTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_gain(&self, gain: f64) {
        let clamped = gain.clamp(0.0, 1.0);
        self.gain_permille
            .store((clamped * 1000.0).round() as u32, Ordering::Relaxed);
    }

    fn stop(&self) {
        // Sample tracks hold no device handle themselves; disabling stops
        // the media flow and the producer observes the flag.
        self.set_enabled(false);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Media source producing Opus/VP8 sample tracks
///
/// Device capture is the embedder's concern: the embedding application
/// feeds captured (encoded) frames into the returned tracks via
/// [`RtcLocalTrack::write_sample`]. A failure to construct tracks surfaces
/// like a device-access failure so the engine's degradation policy applies.
pub struct RtcMediaSource {
    stream_id: String,
}

impl RtcMediaSource {
    /// Source for one logical capture stream
    pub fn new() -> Self {
        Self {
            stream_id: format!("watchroom-{}", uuid::Uuid::new_v4()),
        }
    }
}

impl Default for RtcMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for RtcMediaSource {
    async fn acquire(&self, audio: bool, video: bool) -> Result<Vec<Arc<dyn LocalTrack>>> {
        let mut tracks: Vec<Arc<dyn LocalTrack>> = Vec::new();

        if audio {
            let inner = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    ..Default::default()
                },
                "audio".to_string(),
                self.stream_id.clone(),
            ));
            tracks.push(Arc::new(RtcLocalTrack::new(inner, TrackKind::Audio)));
        }

        if video {
            let inner = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    ..Default::default()
                },
                "video".to_string(),
                self.stream_id.clone(),
            ));
            tracks.push(Arc::new(RtcLocalTrack::new(inner, TrackKind::Video)));
        }

        Ok(tracks)
    }
}
