//! In-memory fakes for the transport and media seams
//!
//! Used by the engine and control-surface unit tests to drive the
//! negotiation state machine without a network or devices.

use crate::call::link::{LinkEvent, LinkState, PeerConnector, PeerLink};
use crate::call::media::{LocalTrack, MediaSource, TrackKind};
use crate::call::session::RemoteTrack;
use crate::{Error, Result};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use watchroom_protocol::{CandidateInit, SignalPayload};

/// Recording fake for one peer link
pub struct FakeLink {
    peer_id: String,
    events: mpsc::UnboundedSender<LinkEvent>,
    inner: Mutex<FakeLinkInner>,
}

#[derive(Default)]
struct FakeLinkInner {
    offers: usize,
    answers: usize,
    remote_descriptions: Vec<SignalPayload>,
    candidates: Vec<CandidateInit>,
    tracks: usize,
    closed: bool,
}

impl FakeLink {
    fn new(peer_id: String, events: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self {
            peer_id,
            events,
            inner: Mutex::new(FakeLinkInner::default()),
        }
    }

    pub fn offers_created(&self) -> usize {
        self.inner.lock().unwrap().offers
    }

    pub fn answers_created(&self) -> usize {
        self.inner.lock().unwrap().answers
    }

    pub fn remote_descriptions(&self) -> Vec<SignalPayload> {
        self.inner.lock().unwrap().remote_descriptions.clone()
    }

    pub fn candidates(&self) -> Vec<CandidateInit> {
        self.inner.lock().unwrap().candidates.clone()
    }

    pub fn tracks_added(&self) -> usize {
        self.inner.lock().unwrap().tracks
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Simulate a transport state report
    pub fn report_state(&self, state: LinkState) {
        let _ = self.events.send(LinkEvent::StateChange {
            peer_id: self.peer_id.clone(),
            state,
        });
    }

    /// Simulate the transport asking for a new offer/answer cycle
    pub fn request_negotiation(&self) {
        let _ = self.events.send(LinkEvent::NegotiationNeeded {
            peer_id: self.peer_id.clone(),
        });
    }

    /// Simulate a remote track arriving on this link
    pub fn arrive_track(&self, id: &str, kind: TrackKind) {
        let _ = self.events.send(LinkEvent::RemoteTrack {
            peer_id: self.peer_id.clone(),
            track: RemoteTrack {
                id: id.to_string(),
                kind,
            },
        });
    }

    /// Simulate a locally discovered candidate
    pub fn discover_candidate(&self, candidate: CandidateInit) {
        let _ = self.events.send(LinkEvent::LocalCandidate {
            peer_id: self.peer_id.clone(),
            candidate,
        });
    }
}

#[async_trait]
impl PeerLink for FakeLink {
    async fn create_offer(&self) -> Result<SignalPayload> {
        let mut inner = self.inner.lock().unwrap();
        inner.offers += 1;
        Ok(SignalPayload::offer(format!(
            "v=0 offer {} #{}",
            self.peer_id, inner.offers
        )))
    }

    async fn create_answer(&self) -> Result<SignalPayload> {
        let mut inner = self.inner.lock().unwrap();
        inner.answers += 1;
        Ok(SignalPayload::answer(format!(
            "v=0 answer {} #{}",
            self.peer_id, inner.answers
        )))
    }

    async fn set_remote_description(&self, signal: &SignalPayload) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .remote_descriptions
            .push(signal.clone());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &CandidateInit) -> Result<()> {
        self.inner.lock().unwrap().candidates.push(candidate.clone());
        Ok(())
    }

    async fn add_track(&self, _track: Arc<dyn LocalTrack>) -> Result<()> {
        self.inner.lock().unwrap().tracks += 1;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.inner.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Connector that hands out [`FakeLink`]s and remembers them per peer
pub struct FakeConnector {
    links: Mutex<HashMap<String, Arc<FakeLink>>>,
    fail_connect: AtomicBool,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            links: Mutex::new(HashMap::new()),
            fail_connect: AtomicBool::new(false),
        }
    }

    /// The most recent link opened toward `peer_id`
    pub fn link_for(&self, peer_id: &str) -> Option<Arc<FakeLink>> {
        self.links.lock().unwrap().get(peer_id).cloned()
    }

    /// Make subsequent `open_link` calls fail
    pub fn fail_connections(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn open_link(
        &self,
        peer_id: &str,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Arc<dyn PeerLink>> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::PeerConnectionError(
                "fake connector refused".to_string(),
            ));
        }
        let link = Arc::new(FakeLink::new(peer_id.to_string(), events));
        self.links
            .lock()
            .unwrap()
            .insert(peer_id.to_string(), link.clone());
        Ok(link)
    }
}

/// Fake device track with observable enabled/stopped/gain state
pub struct FakeTrack {
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    gain: Mutex<f64>,
}

impl FakeTrack {
    fn new(kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            gain: Mutex::new(1.0),
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn gain(&self) -> f64 {
        *self.gain.lock().unwrap()
    }

    pub fn track_kind(&self) -> TrackKind {
        self.kind
    }
}

impl LocalTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_gain(&self, gain: f64) {
        *self.gain.lock().unwrap() = gain;
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Fake device source with failure injection
pub struct FakeMediaSource {
    fail_video: AtomicBool,
    fail_all: AtomicBool,
    tracks: Mutex<Vec<Arc<FakeTrack>>>,
}

impl FakeMediaSource {
    pub fn new() -> Self {
        Self {
            fail_video: AtomicBool::new(false),
            fail_all: AtomicBool::new(false),
            tracks: Mutex::new(Vec::new()),
        }
    }

    /// Deny requests that include video (camera busy/denied)
    pub fn fail_video(&self) {
        self.fail_video.store(true, Ordering::SeqCst);
    }

    /// Let video requests succeed again (camera freed up)
    pub fn allow_video(&self) {
        self.fail_video.store(false, Ordering::SeqCst);
    }

    /// Deny every request (all permissions denied)
    pub fn fail_all(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    /// Every track ever handed out
    pub fn tracks(&self) -> Vec<Arc<FakeTrack>> {
        self.tracks.lock().unwrap().clone()
    }

    /// Whether every handed-out track has been stopped
    pub fn all_tracks_stopped(&self) -> bool {
        self.tracks.lock().unwrap().iter().all(|t| t.stopped())
    }
}

#[async_trait]
impl MediaSource for FakeMediaSource {
    async fn acquire(&self, audio: bool, video: bool) -> Result<Vec<Arc<dyn LocalTrack>>> {
        if self.fail_all.load(Ordering::SeqCst) || (video && self.fail_video.load(Ordering::SeqCst))
        {
            return Err(Error::MediaAccessDenied("permission denied".to_string()));
        }

        let mut handed: Vec<Arc<dyn LocalTrack>> = Vec::new();
        let mut record = self.tracks.lock().unwrap();
        if audio {
            let track = FakeTrack::new(TrackKind::Audio);
            record.push(track.clone());
            handed.push(track);
        }
        if video {
            let track = FakeTrack::new(TrackKind::Video);
            record.push(track.clone());
            handed.push(track);
        }
        Ok(handed)
    }
}
