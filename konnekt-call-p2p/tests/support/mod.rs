#![allow(dead_code)]

use konnekt_call_core::{NegotiationState, PeerId, SessionId, SignalingEnvelope};
use konnekt_call_p2p::{
    FaultPlan, LocalSignalingHub, MediaSinkFactory, MediaSource, MemorySinkFactory, RecordingObserver, RegistryConfig, SessionRegistry,
    SessionStatus, SimulatedMediaSource, SimulatedPeerConnectionFactory,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

/// One participant on the shared hub
pub struct Participant {
    pub id: PeerId,
    pub registry: SessionRegistry,
    pub factory: Arc<SimulatedPeerConnectionFactory>,
    pub observer: Arc<RecordingObserver>,
}

impl Participant {
    /// Connect to the hub and attach the inbound loop, without local media
    pub fn join(hub: &LocalSignalingHub, name: &str, config: RegistryConfig) -> Self {
        Self::join_with(
            hub,
            name,
            config,
            SimulatedPeerConnectionFactory::new(2),
        )
    }

    pub fn join_with(
        hub: &LocalSignalingHub,
        name: &str,
        config: RegistryConfig,
        factory: SimulatedPeerConnectionFactory,
    ) -> Self {
        Self::join_with_sinks(hub, name, config, factory, Arc::new(MemorySinkFactory))
    }

    pub fn join_with_sinks(
        hub: &LocalSignalingHub,
        name: &str,
        config: RegistryConfig,
        factory: SimulatedPeerConnectionFactory,
        sinks: Arc<dyn MediaSinkFactory>,
    ) -> Self {
        let (endpoint, inbound) = hub.connect(name);
        let factory = Arc::new(factory);
        let observer = Arc::new(RecordingObserver::new());

        let registry = SessionRegistry::builder(Arc::new(endpoint), factory.clone())
            .config(config)
            .observer(observer.clone())
            .sinks(sinks)
            .build();
        registry.attach_inbound(inbound);

        Self {
            id: PeerId::from(name),
            registry,
            factory,
            observer,
        }
    }

    /// Capture simulated local media
    pub async fn start_media(&self) {
        let stream = SimulatedMediaSource::new()
            .capture()
            .await
            .expect("simulated capture");
        self.registry.set_local_stream(stream);
    }
}

/// Test fixture: N participants sharing one signaling hub
pub struct CallFixture {
    pub hub: LocalSignalingHub,
    pub participants: Vec<Participant>,
}

impl CallFixture {
    /// Participants named A, B, C... with local media started
    pub async fn new(count: usize) -> Self {
        Self::with_config(count, RegistryConfig::default()).await
    }

    pub async fn with_config(count: usize, config: RegistryConfig) -> Self {
        let hub = LocalSignalingHub::new();
        let mut participants = Vec::new();

        for n in 0..count {
            let name = ((b'A' + n as u8) as char).to_string();
            let participant = Participant::join(&hub, &name, config.clone());
            participant.start_media().await;
            participants.push(participant);
        }

        Self { hub, participants }
    }

    pub fn caller(&self) -> &Participant {
        &self.participants[0]
    }

    pub fn callee(&self) -> &Participant {
        &self.participants[1]
    }

    /// A listener that records every envelope broadcast on the hub
    pub fn spy(&self) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (_endpoint, inbound) = self.hub.connect("spy");
        inbound
    }
}

pub fn faulty(candidates: usize, faults: FaultPlan) -> SimulatedPeerConnectionFactory {
    SimulatedPeerConnectionFactory::with_faults(candidates, faults)
}

/// Wait until a session publishes `state`
pub async fn wait_for_state(
    registry: &SessionRegistry,
    id: SessionId,
    state: NegotiationState,
) -> SessionStatus {
    let mut status = registry.watch(id).expect("session should be live");
    let reached = tokio::time::timeout(WAIT, status.wait_for(|s| s.state == state))
        .await
        .unwrap_or_else(|_| panic!("session {} never reached {}", id, state))
        .expect("status channel closed early")
        .clone();
    reached
}

/// Poll `condition` until it holds or the wait expires
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let polling = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT, polling)
        .await
        .expect("condition never held");
}

/// Run `future` and fail the test if it outlives the wait
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("operation timed out")
}

/// Decode everything the spy has seen so far
pub fn drain(spy: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<SignalingEnvelope> {
    let mut envelopes = Vec::new();
    while let Ok(bytes) = spy.try_recv() {
        if let Ok(envelope) = SignalingEnvelope::decode(&bytes) {
            envelopes.push(envelope);
        }
    }
    envelopes
}
