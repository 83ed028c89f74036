use crate::domain::{AnswerOptions, MediaStream, MediaTrack, OfferOptions, RtcConfiguration};
use crate::infrastructure::error::CapabilityError;
use async_trait::async_trait;
use konnekt_call_core::{IceCandidate, IceConnectionState, SessionDescription, SignalingState};
use std::fmt;
use std::sync::Arc;

/// Events a peer connection reports to its owner
#[derive(Debug, Clone)]
pub enum PeerConnectionEvent {
    /// `None` marks the end of candidate gathering
    IceCandidate(Option<IceCandidate>),
    IceConnectionStateChanged(IceConnectionState),
    SignalingStateChanged(SignalingState),
    NegotiationNeeded,
    TrackAdded(Vec<MediaStream>),
}

/// Listener handle given to a peer connection at construction
///
/// Emitting never blocks. Once the owner is gone `emit` returns `false`
/// and the event is dropped.
#[derive(Clone)]
pub struct PeerConnectionEvents {
    listener: Arc<dyn Fn(PeerConnectionEvent) -> bool + Send + Sync>,
}

impl PeerConnectionEvents {
    pub fn new<F>(listener: F) -> Self
    where
        F: Fn(PeerConnectionEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            listener: Arc::new(listener),
        }
    }

    /// Listener that swallows everything
    pub fn detached() -> Self {
        Self::new(|_| false)
    }

    pub fn emit(&self, event: PeerConnectionEvent) -> bool {
        (self.listener)(event)
    }
}

impl fmt::Debug for PeerConnectionEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnectionEvents").finish_non_exhaustive()
    }
}

/// The WebRTC peer connection seen by a session (`RTCPeerConnection`)
///
/// Every operation may complete on another task; results are awaited by
/// the session and fed back into its negotiation machine.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(
        &self,
        options: &OfferOptions,
    ) -> Result<SessionDescription, CapabilityError>;

    async fn create_answer(
        &self,
        options: &AnswerOptions,
    ) -> Result<SessionDescription, CapabilityError>;

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), CapabilityError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), CapabilityError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), CapabilityError>;

    async fn add_track(
        &self,
        track: Arc<dyn MediaTrack>,
        stream: &MediaStream,
    ) -> Result<(), CapabilityError>;

    /// Stop delivering events; later events are discarded
    fn remove_event_listeners(&self);

    async fn close(&self);
}

/// Builds peer connections for new sessions
pub trait PeerConnectionFactory: Send + Sync {
    fn create(
        &self,
        config: &RtcConfiguration,
        events: PeerConnectionEvents,
    ) -> Result<Arc<dyn PeerConnection>, CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_events_reach_listener() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let events = PeerConnectionEvents::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        assert!(events.emit(PeerConnectionEvent::NegotiationNeeded));
        assert!(events.clone().emit(PeerConnectionEvent::IceCandidate(None)));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_detached_drops_events() {
        let events = PeerConnectionEvents::detached();
        assert!(!events.emit(PeerConnectionEvent::NegotiationNeeded));
    }
}
