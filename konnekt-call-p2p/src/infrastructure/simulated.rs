//! In-process stand-in for a browser peer connection.
//!
//! Follows the `RTCPeerConnection` signaling-state rules closely enough to
//! drive the negotiation engine end to end without a media stack. SDP is
//! synthetic but carries `a=msid` lines so the far side can surface the
//! remote streams.

use crate::domain::{
    AnswerOptions, MediaKind, MediaSource, MediaStream, MediaTrack, OfferOptions, RtcConfiguration,
};
use crate::infrastructure::error::CapabilityError;
use crate::infrastructure::peer_connection::{
    PeerConnection, PeerConnectionEvent, PeerConnectionEvents, PeerConnectionFactory,
};
use async_trait::async_trait;
use konnekt_call_core::{
    IceCandidate, IceCandidateInfo, IceConnectionState, Operation, SdpType, SessionDescription,
    SignalingState,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

// ===== Fault injection =====

/// Failures to inject into simulated connections
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    failing: HashSet<Operation>,
    fail_creation: bool,
    latency: Option<Duration>,
}

impl FaultPlan {
    pub fn none() -> Self {
        Self::default()
    }

    /// Reject every call of `operation`
    pub fn fail(mut self, operation: Operation) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Make the factory refuse to build connections
    pub fn fail_creation(mut self) -> Self {
        self.fail_creation = true;
        self
    }

    /// Delay every asynchronous operation
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fails(&self, operation: Operation) -> bool {
        self.failing.contains(&operation)
    }

    fn check(&self, operation: Operation) -> Result<(), CapabilityError> {
        if self.fails(operation) {
            Err(CapabilityError::Rejected(format!("injected {} failure", operation)))
        } else {
            Ok(())
        }
    }
}

// ===== Media =====

/// Track backed by nothing; `stop` only flips its liveness
#[derive(Debug)]
pub struct SimulatedTrack {
    id: String,
    kind: MediaKind,
    live: AtomicBool,
}

impl SimulatedTrack {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            live: AtomicBool::new(true),
        }
    }
}

impl MediaTrack for SimulatedTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Capture device producing one audio and one video track
#[derive(Debug, Clone, Default)]
pub struct SimulatedMediaSource {
    unavailable: bool,
}

impl SimulatedMediaSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source whose capture is always denied
    pub fn unavailable() -> Self {
        Self { unavailable: true }
    }
}

#[async_trait]
impl MediaSource for SimulatedMediaSource {
    async fn capture(&self) -> Result<MediaStream, CapabilityError> {
        if self.unavailable {
            return Err(CapabilityError::Rejected(
                "permission to capture media denied".to_string(),
            ));
        }

        let stream_id = Uuid::new_v4().to_string();
        let tracks: Vec<Arc<dyn MediaTrack>> = vec![
            Arc::new(SimulatedTrack::new(Uuid::new_v4().to_string(), MediaKind::Audio)),
            Arc::new(SimulatedTrack::new(Uuid::new_v4().to_string(), MediaKind::Video)),
        ];
        Ok(MediaStream::new(stream_id, tracks))
    }
}

// ===== Peer connection =====

struct SimState {
    signaling: SignalingState,
    ice: IceConnectionState,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    tracks: Vec<(String, Arc<dyn MediaTrack>)>,
    negotiation_needed: bool,
    gathered: bool,
    remote_candidates: usize,
    closed: bool,
    events: PeerConnectionEvents,
}

/// Simulated `RTCPeerConnection`
///
/// Caller: stable -> have-local-offer -> stable.
/// Callee: stable -> have-remote-offer -> stable.
/// Negotiation-needed fires once, on the first added track. Host candidates
/// are gathered after the local description is applied. ICE reports
/// `checking` then `connected` once both descriptions are applied and a
/// remote candidate arrived.
pub struct SimulatedPeerConnection {
    number: u64,
    candidates: usize,
    faults: FaultPlan,
    config: RtcConfiguration,
    state: Mutex<SimState>,
}

impl SimulatedPeerConnection {
    pub fn new(
        number: u64,
        config: RtcConfiguration,
        events: PeerConnectionEvents,
        candidates: usize,
        faults: FaultPlan,
    ) -> Self {
        Self {
            number,
            candidates,
            faults,
            config,
            state: Mutex::new(SimState {
                signaling: SignalingState::Stable,
                ice: IceConnectionState::New,
                local: None,
                remote: None,
                tracks: Vec::new(),
                negotiation_needed: false,
                gathered: false,
                remote_candidates: 0,
                closed: false,
                events,
            }),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn config(&self) -> &RtcConfiguration {
        &self.config
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.lock().signaling
    }

    pub fn ice_connection_state(&self) -> IceConnectionState {
        self.lock().ice
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.lock().local.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.lock().remote.clone()
    }

    pub fn remote_candidate_count(&self) -> usize {
        self.lock().remote_candidates
    }

    /// Force an ICE connection state, as the network would
    pub fn set_ice_connection_state(&self, ice: IceConnectionState) {
        let events = {
            let mut state = self.lock();
            if state.closed || state.ice == ice {
                return;
            }
            state.ice = ice;
            vec![PeerConnectionEvent::IceConnectionStateChanged(ice)]
        };
        self.emit(events);
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, events: Vec<PeerConnectionEvent>) {
        let listener = self.lock().events.clone();
        for event in events {
            listener.emit(event);
        }
    }

    async fn begin(&self, operation: Operation) -> Result<(), CapabilityError> {
        if let Some(latency) = self.faults.latency {
            tokio::time::sleep(latency).await;
        }
        if self.lock().closed {
            return Err(CapabilityError::Closed);
        }
        self.faults.check(operation)
    }

    fn describe(&self, sdp_type: SdpType, tracks: &[(String, Arc<dyn MediaTrack>)]) -> String {
        let mut sdp = format!(
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=type:{}\r\n",
            self.number, sdp_type
        );
        for (mid, (stream_id, track)) in tracks.iter().enumerate() {
            sdp.push_str(&format!(
                "m={} 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:{}\r\na=msid:{} {}\r\na=sendrecv\r\n",
                track.kind(),
                mid,
                stream_id,
                track.id()
            ));
        }
        sdp
    }

    fn gather(&self) -> Vec<PeerConnectionEvent> {
        let mut events: Vec<_> = (0..self.candidates)
            .map(|n| {
                let candidate = IceCandidate::new(format!(
                    "candidate:{} 1 udp {} 10.0.{}.{} {} typ host generation 0",
                    n + 1,
                    2122260223u32.saturating_sub(n as u32),
                    self.number % 256,
                    n + 1,
                    50000 + n
                ))
                .with_media_line("0", 0);
                PeerConnectionEvent::IceCandidate(Some(candidate))
            })
            .collect();
        events.push(PeerConnectionEvent::IceCandidate(None));
        events
    }

    fn connect_if_ready(state: &mut SimState, events: &mut Vec<PeerConnectionEvent>) {
        if state.ice == IceConnectionState::New
            && state.local.is_some()
            && state.remote.is_some()
            && state.remote_candidates > 0
        {
            state.ice = IceConnectionState::Connected;
            events.push(PeerConnectionEvent::IceConnectionStateChanged(
                IceConnectionState::Checking,
            ));
            events.push(PeerConnectionEvent::IceConnectionStateChanged(
                IceConnectionState::Connected,
            ));
        }
    }
}

/// Rebuild remote streams from the `a=msid` lines of a description
fn remote_streams(sdp: &str) -> Vec<MediaStream> {
    let mut streams: BTreeMap<String, Vec<Arc<dyn MediaTrack>>> = BTreeMap::new();
    let mut kind = MediaKind::Audio;

    for line in sdp.lines() {
        if let Some(media) = line.strip_prefix("m=") {
            kind = if media.starts_with("video") {
                MediaKind::Video
            } else {
                MediaKind::Audio
            };
        } else if let Some(msid) = line.strip_prefix("a=msid:") {
            let mut parts = msid.split_whitespace();
            if let (Some(stream_id), Some(track_id)) = (parts.next(), parts.next()) {
                streams
                    .entry(stream_id.to_string())
                    .or_default()
                    .push(Arc::new(SimulatedTrack::new(track_id, kind)));
            }
        }
    }

    streams
        .into_iter()
        .map(|(id, tracks)| MediaStream::new(id, tracks))
        .collect()
}

#[async_trait]
impl PeerConnection for SimulatedPeerConnection {
    async fn create_offer(
        &self,
        _options: &OfferOptions,
    ) -> Result<SessionDescription, CapabilityError> {
        self.begin(Operation::CreateOffer).await?;
        let state = self.lock();
        Ok(SessionDescription::offer(
            self.describe(SdpType::Offer, &state.tracks),
        ))
    }

    async fn create_answer(
        &self,
        _options: &AnswerOptions,
    ) -> Result<SessionDescription, CapabilityError> {
        self.begin(Operation::CreateAnswer).await?;
        let state = self.lock();
        if state.signaling != SignalingState::HaveRemoteOffer {
            return Err(CapabilityError::Rejected(format!(
                "cannot create an answer in signaling state {}",
                state.signaling
            )));
        }
        Ok(SessionDescription::answer(
            self.describe(SdpType::Answer, &state.tracks),
        ))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), CapabilityError> {
        self.begin(Operation::SetLocalDescription).await?;

        let events = {
            let mut state = self.lock();
            let next = match (state.signaling, description.sdp_type) {
                (SignalingState::Stable, SdpType::Offer) => SignalingState::HaveLocalOffer,
                (SignalingState::HaveRemoteOffer, SdpType::Answer)
                | (SignalingState::HaveLocalPranswer, SdpType::Answer) => SignalingState::Stable,
                (SignalingState::HaveRemoteOffer, SdpType::Pranswer) => {
                    SignalingState::HaveLocalPranswer
                }
                (current, sdp_type) => {
                    return Err(CapabilityError::Rejected(format!(
                        "cannot apply local {} in signaling state {}",
                        sdp_type, current
                    )));
                }
            };

            state.signaling = next;
            state.local = Some(description);

            let mut events = vec![PeerConnectionEvent::SignalingStateChanged(next)];
            if !state.gathered {
                state.gathered = true;
                events.extend(self.gather());
            }
            Self::connect_if_ready(&mut state, &mut events);
            events
        };

        self.emit(events);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), CapabilityError> {
        self.begin(Operation::SetRemoteDescription).await?;

        let events = {
            let mut state = self.lock();
            let next = match (state.signaling, description.sdp_type) {
                (SignalingState::Stable, SdpType::Offer) => SignalingState::HaveRemoteOffer,
                (SignalingState::HaveLocalOffer, SdpType::Answer)
                | (SignalingState::HaveRemotePranswer, SdpType::Answer) => SignalingState::Stable,
                (SignalingState::HaveLocalOffer, SdpType::Pranswer) => {
                    SignalingState::HaveRemotePranswer
                }
                (current, sdp_type) => {
                    return Err(CapabilityError::Rejected(format!(
                        "cannot apply remote {} in signaling state {}",
                        sdp_type, current
                    )));
                }
            };

            let streams = remote_streams(&description.sdp);
            state.signaling = next;
            state.remote = Some(description);

            let mut events = vec![PeerConnectionEvent::SignalingStateChanged(next)];
            if !streams.is_empty() {
                events.push(PeerConnectionEvent::TrackAdded(streams));
            }
            Self::connect_if_ready(&mut state, &mut events);
            events
        };

        self.emit(events);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), CapabilityError> {
        self.begin(Operation::AddIceCandidate).await?;

        if let Err(e) = IceCandidateInfo::parse(&candidate.candidate) {
            return Err(CapabilityError::Rejected(e.to_string()));
        }

        let events = {
            let mut state = self.lock();
            if state.remote.is_none() {
                return Err(CapabilityError::Rejected(
                    "remote description not set".to_string(),
                ));
            }
            state.remote_candidates += 1;

            let mut events = Vec::new();
            Self::connect_if_ready(&mut state, &mut events);
            events
        };

        self.emit(events);
        Ok(())
    }

    async fn add_track(
        &self,
        track: Arc<dyn MediaTrack>,
        stream: &MediaStream,
    ) -> Result<(), CapabilityError> {
        self.begin(Operation::AddTrack).await?;

        let events = {
            let mut state = self.lock();
            state.tracks.push((stream.id().to_string(), track));
            if state.negotiation_needed || state.signaling != SignalingState::Stable {
                Vec::new()
            } else {
                state.negotiation_needed = true;
                vec![PeerConnectionEvent::NegotiationNeeded]
            }
        };

        self.emit(events);
        Ok(())
    }

    fn remove_event_listeners(&self) {
        self.lock().events = PeerConnectionEvents::detached();
    }

    async fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.ice = IceConnectionState::Closed;
    }
}

// ===== Factory =====

/// Builds [`SimulatedPeerConnection`]s and keeps a handle on each
pub struct SimulatedPeerConnectionFactory {
    candidates: usize,
    faults: FaultPlan,
    next_number: AtomicU64,
    created: Mutex<Vec<Arc<SimulatedPeerConnection>>>,
}

impl SimulatedPeerConnectionFactory {
    pub fn new(candidates: usize) -> Self {
        Self::with_faults(candidates, FaultPlan::none())
    }

    pub fn with_faults(candidates: usize, faults: FaultPlan) -> Self {
        Self {
            candidates,
            faults,
            next_number: AtomicU64::new(1),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Every connection built so far, in creation order
    pub fn connections(&self) -> Vec<Arc<SimulatedPeerConnection>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<Arc<SimulatedPeerConnection>> {
        self.connections().pop()
    }
}

impl PeerConnectionFactory for SimulatedPeerConnectionFactory {
    fn create(
        &self,
        config: &RtcConfiguration,
        events: PeerConnectionEvents,
    ) -> Result<Arc<dyn PeerConnection>, CapabilityError> {
        if self.faults.fail_creation {
            return Err(CapabilityError::Rejected(
                "injected peer connection construction failure".to_string(),
            ));
        }

        let number = self.next_number.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(SimulatedPeerConnection::new(
            number,
            config.clone(),
            events,
            self.candidates,
            self.faults.clone(),
        ));

        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(connection.clone());

        Ok(connection)
    }
}
