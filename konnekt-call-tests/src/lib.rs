use cucumber::World;
use konnekt_call_core::{NegotiationState, PeerId, SessionId, SignalingEnvelope, SignalingOp};
use konnekt_call_p2p::{
    CallError, Dispatch, LocalSignalingHub, MediaSource, RecordingObserver, RegistryConfig,
    SessionRegistry, SessionStatus, SimulatedMediaSource, SimulatedPeerConnectionFactory,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long a scenario waits for asynchronous negotiation to settle
pub const WAIT: Duration = Duration::from_secs(5);

/// One named participant on the scenario's hub
pub struct CallParticipant {
    pub registry: SessionRegistry,
    pub factory: Arc<SimulatedPeerConnectionFactory>,
    pub observer: Arc<RecordingObserver>,
}

#[derive(World)]
pub struct CallWorld {
    /// Shared signaling channel (the system's only wire)
    pub hub: LocalSignalingHub,

    /// Participants by name
    pub participants: BTreeMap<String, CallParticipant>,

    /// Every envelope broadcast on the hub, in send order
    pub traffic: Vec<SignalingEnvelope>,

    /// Last outbound call placed by each participant
    pub calls: BTreeMap<String, SessionId>,

    /// Outcome of the last envelope delivered by hand
    pub last_dispatch: Option<Result<Dispatch, CallError>>,

    /// Results of destroy calls, in order
    pub destroyed: Vec<bool>,

    spy: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Default for CallWorld {
    fn default() -> Self {
        let hub = LocalSignalingHub::new();
        let (_endpoint, spy) = hub.connect("spy");

        Self {
            hub,
            participants: BTreeMap::new(),
            traffic: Vec::new(),
            calls: BTreeMap::new(),
            last_dispatch: None,
            destroyed: Vec::new(),
            spy,
        }
    }
}

impl fmt::Debug for CallWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sessions: BTreeMap<&str, Vec<SessionStatus>> = self
            .participants
            .iter()
            .map(|(name, p)| (name.as_str(), p.registry.statuses()))
            .collect();

        f.debug_struct("CallWorld")
            .field("sessions", &sessions)
            .field("traffic", &self.traffic.len())
            .field("calls", &self.calls)
            .field("last_dispatch", &self.last_dispatch)
            .finish()
    }
}

impl CallWorld {
    /// Attach a participant to the hub, optionally with local media started
    pub async fn join(&mut self, name: &str, with_media: bool) {
        let (endpoint, inbound) = self.hub.connect(name);
        let factory = Arc::new(SimulatedPeerConnectionFactory::new(2));
        let observer = Arc::new(RecordingObserver::new());

        let registry = SessionRegistry::builder(Arc::new(endpoint), factory.clone())
            .config(RegistryConfig::default())
            .observer(observer.clone())
            .build();
        registry.attach_inbound(inbound);

        if with_media {
            let stream = SimulatedMediaSource::new()
                .capture()
                .await
                .expect("simulated capture never fails");
            registry.set_local_stream(stream);
        }

        self.participants.insert(
            name.to_string(),
            CallParticipant {
                registry,
                factory,
                observer,
            },
        );
    }

    /// Get a participant by name (panics if unknown)
    pub fn participant(&self, name: &str) -> &CallParticipant {
        self.participants
            .get(name)
            .unwrap_or_else(|| panic!("Participant '{}' not found", name))
    }

    /// Get the last call placed by `name` (panics if none)
    pub fn call_of(&self, name: &str) -> SessionId {
        *self
            .calls
            .get(name)
            .unwrap_or_else(|| panic!("'{}' has not placed a call", name))
    }

    /// Deliver an envelope to one participant as if it came off the channel
    pub fn deliver(&mut self, name: &str, envelope: SignalingEnvelope) {
        let result = self.participant(name).registry.handle_inbound(envelope);
        self.last_dispatch = Some(result);
    }

    pub fn deliver_bytes(&mut self, name: &str, bytes: &[u8]) {
        let result = self.participant(name).registry.handle_inbound_bytes(bytes);
        self.last_dispatch = Some(result);
    }

    /// Pull everything the hub has carried so far into `traffic`
    pub fn collect_traffic(&mut self) {
        while let Ok(bytes) = self.spy.try_recv() {
            if let Ok(envelope) = SignalingEnvelope::decode(&bytes) {
                self.traffic.push(envelope);
            }
        }
    }

    /// Envelopes sent by `name` with the given op, in send order
    pub fn sent_by(&self, name: &str, op: SignalingOp) -> Vec<(usize, &SignalingEnvelope)> {
        let sender = PeerId::from(name);
        self.traffic
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_from(&sender) && e.op() == op)
            .collect()
    }

    /// Wait until a session of `name` publishes `state`
    pub async fn wait_for_state(
        &self,
        name: &str,
        id: SessionId,
        state: NegotiationState,
    ) -> SessionStatus {
        let mut status = self
            .participant(name)
            .registry
            .watch(id)
            .unwrap_or_else(|| panic!("session {} of '{}' is not live", id, name));

        let reached = tokio::time::timeout(WAIT, status.wait_for(|s| s.state == state))
            .await
            .unwrap_or_else(|_| panic!("session {} of '{}' never reached {}", id, name, state))
            .expect("status channel closed early")
            .clone();
        reached
    }
}

/// Poll `condition` until it holds or the wait expires
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let polling = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT, polling).await.is_ok()
}

/// Parse a kebab-case state name as used in the feature files
pub fn parse_state(name: &str) -> NegotiationState {
    use NegotiationState::*;

    [
        Idle,
        SendOffer,
        SendingOffer,
        WaitAnswer,
        RecvOffer,
        SendAnswer,
        SendingAnswer,
        Completed,
        Failed,
        Closed,
    ]
    .into_iter()
    .find(|state| state.as_str() == name)
    .unwrap_or_else(|| panic!("Unknown negotiation state '{}'", name))
}
