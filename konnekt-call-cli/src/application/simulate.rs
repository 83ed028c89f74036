use crate::infrastructure::error::{CliError, Result};
use konnekt_call_core::{IceConnectionState, NegotiationState, Operation, PeerId, SessionId};
use konnekt_call_p2p::{
    CallController, CallNotice, FaultPlan, LocalSignalingHub, RecordingObserver, RegistryConfig,
    SessionRegistry, SessionStatus, SimulatedMediaSource, SimulatedPeerConnectionFactory,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Parameters of a simulated call
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub peers: usize,
    pub candidates: usize,
    /// Operation every simulated peer connection rejects
    pub fail: Option<Operation>,
    pub registry: RegistryConfig,
    /// How long to wait for the caller to settle
    pub timeout: Duration,
    /// Extra time for candidates to flow after the caller settles
    pub settle: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            peers: 2,
            candidates: 2,
            fail: None,
            registry: RegistryConfig::default(),
            timeout: Duration::from_secs(2),
            settle: Duration::from_millis(100),
        }
    }
}

/// Transport-level view of one peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub ice: IceConnectionState,
    pub remote_candidates: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantReport {
    pub peer: PeerId,
    pub sessions: Vec<SessionStatus>,
    pub connections: Vec<ConnectionReport>,
    pub errors: Vec<String>,
    pub ice_failures: usize,
    pub remote_streams: Vec<String>,
    pub disconnected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub caller: PeerId,
    pub call: SessionId,
    /// Caller session state once it settled
    pub outcome: NegotiationState,
    pub participants: Vec<ParticipantReport>,
}

impl SimulationReport {
    pub fn participant(&self, peer: &str) -> Option<&ParticipantReport> {
        self.participants.iter().find(|p| p.peer.as_str() == peer)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "📞 {} placed call {} -> {}",
            self.caller, self.call, self.outcome
        )?;
        for participant in &self.participants {
            writeln!(f, "\n👤 {}", participant.peer)?;
            for status in &participant.sessions {
                writeln!(
                    f,
                    "   session {:<3} {:<7} {:<15} remote {}",
                    status.id.to_string(),
                    status.role.to_string(),
                    status.state.as_str(),
                    status
                        .remote_peer
                        .as_ref()
                        .map(PeerId::as_str)
                        .unwrap_or("-")
                )?;
            }
            for connection in &participant.connections {
                writeln!(
                    f,
                    "   🧊 ice {:<12} remote candidates {}",
                    connection.ice.as_str(),
                    connection.remote_candidates
                )?;
            }
            for stream in &participant.remote_streams {
                writeln!(f, "   🎥 remote stream {}", stream)?;
            }
            if participant.ice_failures > 0 {
                writeln!(f, "   ⚠️  ice failures: {}", participant.ice_failures)?;
            }
            for error in &participant.errors {
                writeln!(f, "   ❌ {}", error)?;
            }
            writeln!(f, "   disconnected: {}", participant.disconnected)?;
        }
        Ok(())
    }
}

struct SimulatedPeer {
    id: PeerId,
    controller: CallController,
    factory: Arc<SimulatedPeerConnectionFactory>,
    observer: Arc<RecordingObserver>,
}

impl SimulatedPeer {
    fn registry(&self) -> &SessionRegistry {
        self.controller.registry()
    }

    fn report(&self) -> ParticipantReport {
        let mut report = ParticipantReport {
            peer: self.id.clone(),
            sessions: self.registry().statuses(),
            connections: self
                .factory
                .connections()
                .iter()
                .map(|connection| ConnectionReport {
                    ice: connection.ice_connection_state(),
                    remote_candidates: connection.remote_candidate_count(),
                })
                .collect(),
            errors: Vec::new(),
            ice_failures: 0,
            remote_streams: Vec::new(),
            disconnected: 0,
        };

        for notice in self.observer.notices() {
            match notice {
                CallNotice::Error(_, error) => report.errors.push(error.to_string()),
                CallNotice::IceFailed(_) => report.ice_failures += 1,
                CallNotice::RemoteStream(_, stream) => report.remote_streams.push(stream),
                CallNotice::Disconnected(_) => report.disconnected += 1,
            }
        }
        report
    }
}

/// Run one call across `peers` participants on an in-process hub
///
/// Peer 0 places a single call; the offer is broadcast, so every other
/// peer answers it and the first answer binds the caller's session.
pub async fn run_simulation(config: SimulationConfig) -> Result<SimulationReport> {
    if config.peers < 2 {
        return Err(CliError::InvalidConfig(
            "a call needs at least two peers".to_string(),
        ));
    }

    let hub = LocalSignalingHub::new();
    let faults = config
        .fail
        .map(|operation| FaultPlan::none().fail(operation))
        .unwrap_or_default();

    let mut peers = Vec::with_capacity(config.peers);
    for n in 0..config.peers {
        let peer = join(&hub, n, &config, faults.clone());
        if !peer.controller.on_start_stop().await {
            return Err(CliError::Simulation(format!(
                "{} could not start local media",
                peer.id
            )));
        }
        peers.push(peer);
    }
    tracing::info!(peers = peers.len(), "🚀 All peers have local media");

    let caller = &peers[0];
    let call = caller.controller.on_offer()?;
    let outcome = settle(caller.registry(), call, config.timeout).await;
    tokio::time::sleep(config.settle).await;

    let participants = peers.iter().map(SimulatedPeer::report).collect();
    let report = SimulationReport {
        caller: caller.id.clone(),
        call,
        outcome,
        participants,
    };

    for peer in &peers {
        peer.controller.on_start_stop().await;
    }
    tracing::info!(outcome = %report.outcome, "🏁 Simulation finished");

    Ok(report)
}

fn join(
    hub: &LocalSignalingHub,
    index: usize,
    config: &SimulationConfig,
    faults: FaultPlan,
) -> SimulatedPeer {
    let id = PeerId::new(format!("peer-{}", index));
    let (endpoint, inbound) = hub.connect(id.clone());
    let observer = Arc::new(RecordingObserver::new());
    let factory = Arc::new(SimulatedPeerConnectionFactory::with_faults(
        config.candidates,
        faults,
    ));

    let registry = SessionRegistry::builder(Arc::new(endpoint), factory.clone())
        .config(config.registry.clone())
        .observer(observer.clone())
        .build();
    registry.attach_inbound(inbound);

    let controller = CallController::new(
        registry,
        Arc::new(SimulatedMediaSource::new()),
        observer.clone(),
    );

    SimulatedPeer {
        id,
        controller,
        factory,
        observer,
    }
}

/// Wait for the caller session to complete or end
async fn settle(registry: &SessionRegistry, id: SessionId, timeout: Duration) -> NegotiationState {
    let Some(mut status) = registry.watch(id) else {
        return NegotiationState::Closed;
    };

    let settled = |s: &SessionStatus| s.state == NegotiationState::Completed || s.state.is_terminal();
    if tokio::time::timeout(timeout, status.wait_for(settled))
        .await
        .is_err()
    {
        tracing::warn!(session_id = %id, "Caller did not settle in time");
    }

    let state = status.borrow().state;
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(peers: usize) -> SimulationConfig {
        SimulationConfig {
            peers,
            timeout: Duration::from_millis(500),
            settle: Duration::from_millis(100),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_two_peer_call_completes() {
        let report = run_simulation(config(2)).await.unwrap();

        assert_eq!(report.outcome, NegotiationState::Completed);
        assert_eq!(report.caller.as_str(), "peer-0");

        let callee = report.participant("peer-1").unwrap();
        assert_eq!(callee.sessions.len(), 1);
        assert_eq!(callee.sessions[0].state, NegotiationState::Completed);
        assert_eq!(callee.remote_streams.len(), 1);
        assert!(callee.errors.is_empty());

        let connected = ConnectionReport {
            ice: IceConnectionState::Connected,
            remote_candidates: 2,
        };
        for peer in ["peer-0", "peer-1"] {
            let participant = report.participant(peer).unwrap();
            assert_eq!(participant.connections, vec![connected], "{} should connect", peer);
        }
    }

    #[tokio::test]
    async fn test_every_peer_answers_the_broadcast_offer() {
        let report = run_simulation(config(4)).await.unwrap();

        assert_eq!(report.outcome, NegotiationState::Completed);
        for peer in ["peer-1", "peer-2", "peer-3"] {
            let participant = report.participant(peer).unwrap();
            assert_eq!(participant.sessions.len(), 1, "{} should answer", peer);
        }
    }

    #[tokio::test]
    async fn test_injected_failure_is_reported() {
        let report = run_simulation(SimulationConfig {
            fail: Some(Operation::CreateAnswer),
            ..config(2)
        })
        .await
        .unwrap();

        assert_eq!(report.outcome, NegotiationState::WaitAnswer);
        let callee = report.participant("peer-1").unwrap();
        assert!(callee.sessions.is_empty());
        assert_eq!(callee.errors.len(), 1);
        assert!(callee.errors[0].contains("create-answer"));
        assert_eq!(callee.disconnected, 1);
    }

    #[tokio::test]
    async fn test_single_peer_is_rejected() {
        let result = run_simulation(config(1)).await;
        assert!(matches!(result, Err(CliError::InvalidConfig(_))));
    }
}
