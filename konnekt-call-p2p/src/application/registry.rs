use crate::application::session::{self, SessionHandle, SessionSetup, SessionStatus};
use crate::application::{CallObserver, LoggingObserver, OfferPolicy, RegistryConfig};
use crate::domain::{MediaSinkFactory, MediaStream, MemorySinkFactory};
use crate::infrastructure::error::{CallError, CapabilityError, Result};
use crate::infrastructure::peer_connection::PeerConnectionFactory;
use crate::infrastructure::transport::SignalingTransport;
use konnekt_call_core::{
    CodecError, NegotiationMachine, NegotiationState, PeerId, Role, SessionId, SignalingEnvelope,
    SignalingOp, SignalingPayload,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Outcome of dispatching one inbound envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Sent by this participant; discarded
    LoopBack,
    /// Not signaling traffic; discarded
    Foreign,
    /// An offer opened a new callee session
    Created(SessionId),
    /// Delivered to these sessions
    Routed(Vec<SessionId>),
    /// Offer from a party that already has a live session
    Duplicate(SessionId),
    /// Offer received while no local media is active
    Refused,
    /// No session matched; discarded
    Unroutable,
}

/// Live set of peer sessions for one local participant
///
/// The only shared mutable state is the live set itself, guarded by one
/// mutex held for create, lookup, insert and remove. Negotiation runs in
/// the session tasks without it.
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<RegistryShared>,
}

struct RegistryShared {
    local_id: PeerId,
    config: Arc<RegistryConfig>,
    transport: Arc<dyn SignalingTransport>,
    factory: Arc<dyn PeerConnectionFactory>,
    sinks: Arc<dyn MediaSinkFactory>,
    observer: Arc<dyn CallObserver>,
    live: Mutex<LiveSet>,
}

struct LiveSet {
    next_id: SessionId,
    local_stream: Option<MediaStream>,
    sessions: BTreeMap<SessionId, SessionHandle>,
    inbound: Option<JoinHandle<()>>,
}

impl LiveSet {
    fn allocate(&mut self) -> SessionId {
        let id = self.next_id;
        self.next_id = id.next();
        id
    }

    fn bound_to<'a>(&'a self, peer: &'a PeerId) -> impl Iterator<Item = &'a SessionHandle> + 'a {
        self.sessions
            .values()
            .filter(move |handle| handle.remote_peer() == Some(peer))
    }

    /// Caller session that should receive an answer from `peer`
    ///
    /// With `exclusive`, an unbound caller is never handed to a party that
    /// already has a live session.
    fn answer_target(&self, peer: &PeerId, exclusive: bool) -> Option<SessionId> {
        let callers = || {
            self.sessions
                .values()
                .filter(|handle| handle.role() == Role::Caller)
        };

        callers()
            .find(|handle| handle.remote_peer() == Some(peer))
            .or_else(|| {
                if exclusive && self.bound_to(peer).next().is_some() {
                    tracing::warn!(from = %peer, "Answer dropped, already in a session with this party");
                    return None;
                }
                callers().find(|handle| {
                    handle.remote_peer().is_none()
                        && handle.status().state == NegotiationState::WaitAnswer
                })
            })
            .map(SessionHandle::id)
    }
}

/// Builder for [`SessionRegistry`]
pub struct SessionRegistryBuilder {
    transport: Arc<dyn SignalingTransport>,
    factory: Arc<dyn PeerConnectionFactory>,
    config: RegistryConfig,
    sinks: Arc<dyn MediaSinkFactory>,
    observer: Arc<dyn CallObserver>,
}

impl SessionRegistryBuilder {
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn sinks(mut self, sinks: Arc<dyn MediaSinkFactory>) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn build(self) -> SessionRegistry {
        let local_id = self.transport.self_id();
        tracing::info!(peer = %local_id, policy = %self.config.offer_policy, "Session registry ready");

        SessionRegistry {
            shared: Arc::new(RegistryShared {
                local_id,
                config: Arc::new(self.config),
                transport: self.transport,
                factory: self.factory,
                sinks: self.sinks,
                observer: self.observer,
                live: Mutex::new(LiveSet {
                    next_id: SessionId::FIRST,
                    local_stream: None,
                    sessions: BTreeMap::new(),
                    inbound: None,
                }),
            }),
        }
    }
}

impl SessionRegistry {
    pub fn builder(
        transport: Arc<dyn SignalingTransport>,
        factory: Arc<dyn PeerConnectionFactory>,
    ) -> SessionRegistryBuilder {
        SessionRegistryBuilder {
            transport,
            factory,
            config: RegistryConfig::default(),
            sinks: Arc::new(MemorySinkFactory),
            observer: Arc::new(LoggingObserver),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.shared.local_id
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    // ===== Local media =====

    /// Stream whose tracks seed every new session
    pub fn set_local_stream(&self, stream: MediaStream) {
        tracing::debug!(stream = stream.id(), "Local stream set");
        self.shared.lock().local_stream = Some(stream);
    }

    pub fn clear_local_stream(&self) -> Option<MediaStream> {
        self.shared.lock().local_stream.take()
    }

    pub fn local_stream(&self) -> Option<MediaStream> {
        self.shared.lock().local_stream.clone()
    }

    // ===== Lifecycle =====

    /// Open a caller session towards whoever answers first
    pub fn create_outbound(&self) -> Result<SessionId> {
        let machine = NegotiationMachine::caller(self.shared.local_id.clone());

        let started = {
            let mut live = self.shared.lock();
            let stream = live
                .local_stream
                .clone()
                .ok_or_else(|| CallError::MediaUnavailable("no local stream".to_string()))?;
            self.shared.start(&mut live, machine, stream)
        };

        self.shared.report_start(started)
    }

    /// Tear down one session and wait for it; `false` if it was not live
    pub async fn destroy(&self, id: SessionId) -> bool {
        let handle = self.shared.lock().sessions.remove(&id);
        match handle {
            Some(handle) => {
                tracing::debug!(session_id = %id, "Destroying session");
                handle.shutdown().await;
                true
            }
            None => {
                tracing::debug!(session_id = %id, "Session already destroyed");
                false
            }
        }
    }

    /// Tear down every live session; returns how many were live
    pub async fn destroy_all(&self) -> usize {
        let handles: Vec<SessionHandle> = {
            let mut live = self.shared.lock();
            std::mem::take(&mut live.sessions).into_values().collect()
        };

        let count = handles.len();
        if count > 0 {
            tracing::info!(count, "Destroying all sessions");
        }
        futures::future::join_all(handles.into_iter().map(SessionHandle::shutdown)).await;
        count
    }

    // ===== Inbound =====

    /// Own the inbound side of the signaling channel
    ///
    /// Spawns the single dispatch loop. It ends when the channel closes or
    /// the registry is dropped; attaching again replaces the previous loop.
    pub fn attach_inbound(&self, mut inbound: mpsc::UnboundedReceiver<Vec<u8>>) {
        let weak = Arc::downgrade(&self.shared);
        let span = tracing::info_span!("signaling_inbound", peer = %self.shared.local_id);

        let task = tokio::spawn(
            async move {
                while let Some(bytes) = inbound.recv().await {
                    let Some(shared) = Weak::upgrade(&weak) else {
                        break;
                    };
                    let registry = SessionRegistry { shared };
                    if let Err(e) = registry.handle_inbound_bytes(&bytes) {
                        tracing::warn!("🗑️  {}", e);
                    }
                }
                tracing::debug!("Inbound signaling closed");
            }
            .instrument(span),
        );

        if let Some(previous) = self.shared.lock().inbound.replace(task) {
            previous.abort();
        }
    }

    /// Decode and dispatch raw bytes from the channel
    pub fn handle_inbound_bytes(&self, bytes: &[u8]) -> Result<Dispatch> {
        match SignalingEnvelope::decode(bytes) {
            Ok(envelope) => self.handle_inbound(envelope),
            Err(CodecError::ForeignMessage(kind)) => {
                tracing::trace!(?kind, "Ignoring non-signaling message");
                Ok(Dispatch::Foreign)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Route one decoded envelope to its session
    pub fn handle_inbound(&self, envelope: SignalingEnvelope) -> Result<Dispatch> {
        if envelope.is_from(&self.shared.local_id) {
            tracing::trace!(op = %envelope.op(), "Loop-back envelope discarded");
            return Ok(Dispatch::LoopBack);
        }

        match envelope.op() {
            SignalingOp::Offer => self.handle_offer(envelope),
            SignalingOp::Answer => Ok(self.handle_answer(envelope)),
            SignalingOp::Ice => Ok(self.handle_ice(envelope)),
        }
    }

    fn handle_offer(&self, envelope: SignalingEnvelope) -> Result<Dispatch> {
        let SignalingEnvelope {
            sender,
            payload: SignalingPayload::Offer(offer),
        } = envelope
        else {
            return Ok(Dispatch::Unroutable);
        };

        let started = {
            let mut live = self.shared.lock();

            let Some(stream) = live.local_stream.clone() else {
                tracing::warn!(from = %sender, "Offer refused, local media not started");
                return Ok(Dispatch::Refused);
            };

            if self.shared.config.offer_policy == OfferPolicy::SingleSessionPerPeer {
                if let Some(existing) = live.bound_to(&sender).next() {
                    tracing::warn!(
                        from = %sender,
                        session_id = %existing.id(),
                        "Duplicate offer dropped"
                    );
                    return Ok(Dispatch::Duplicate(existing.id()));
                }
            }

            let machine = NegotiationMachine::callee(self.shared.local_id.clone(), sender, offer);
            self.shared.start(&mut live, machine, stream)
        };

        self.shared.report_start(started).map(Dispatch::Created)
    }

    fn handle_answer(&self, envelope: SignalingEnvelope) -> Dispatch {
        let mut live = self.shared.lock();

        let exclusive = self.shared.config.offer_policy == OfferPolicy::SingleSessionPerPeer;
        let Some(id) = live.answer_target(&envelope.sender, exclusive) else {
            tracing::warn!(from = %envelope.sender, "No session waiting for this answer");
            return Dispatch::Unroutable;
        };

        let sender = envelope.sender.clone();
        let Some(handle) = live.sessions.get_mut(&id) else {
            return Dispatch::Unroutable;
        };
        if !handle.deliver(envelope) {
            return Dispatch::Unroutable;
        }

        handle.bind(sender);
        tracing::debug!(session_id = %id, "Answer routed");
        Dispatch::Routed(vec![id])
    }

    fn handle_ice(&self, envelope: SignalingEnvelope) -> Dispatch {
        let live = self.shared.lock();

        let targets: Vec<SessionId> = live
            .bound_to(&envelope.sender)
            .filter(|handle| handle.deliver(envelope.clone()))
            .map(SessionHandle::id)
            .collect();

        if targets.is_empty() {
            tracing::warn!(from = %envelope.sender, "No session for this ice candidate");
            Dispatch::Unroutable
        } else {
            Dispatch::Routed(targets)
        }
    }

    // ===== Queries =====

    pub fn state_of(&self, id: SessionId) -> Option<NegotiationState> {
        self.status_of(id).map(|status| status.state)
    }

    pub fn status_of(&self, id: SessionId) -> Option<SessionStatus> {
        self.shared.lock().sessions.get(&id).map(SessionHandle::status)
    }

    /// Follow a session's status; the receiver sees the final state after teardown
    pub fn watch(&self, id: SessionId) -> Option<watch::Receiver<SessionStatus>> {
        self.shared
            .lock()
            .sessions
            .get(&id)
            .map(SessionHandle::subscribe)
    }

    pub fn live_sessions(&self) -> Vec<SessionId> {
        self.shared.lock().sessions.keys().copied().collect()
    }

    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.shared
            .lock()
            .sessions
            .values()
            .map(SessionHandle::status)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().sessions.is_empty()
    }
}

impl RegistryShared {
    fn lock(&self) -> MutexGuard<'_, LiveSet> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a session and insert it, with the live set already locked
    fn start(
        self: &Arc<Self>,
        live: &mut LiveSet,
        machine: NegotiationMachine,
        local_stream: MediaStream,
    ) -> std::result::Result<SessionId, (SessionId, CapabilityError)> {
        let id = live.allocate();
        let registry = Arc::downgrade(self);

        let setup = SessionSetup {
            id,
            machine,
            local_stream,
            config: self.config.clone(),
            factory: self.factory.clone(),
            transport: self.transport.clone(),
            observer: self.observer.clone(),
            sink: self.sinks.create(id),
            on_exit: Box::new(move |id| {
                if let Some(shared) = registry.upgrade() {
                    shared.lock().sessions.remove(&id);
                }
            }),
        };

        let handle = session::spawn(setup).map_err(|e| (id, e))?;
        live.sessions.insert(id, handle);
        Ok(id)
    }

    /// Report a start outcome once the live set is unlocked
    fn report_start(
        &self,
        started: std::result::Result<SessionId, (SessionId, CapabilityError)>,
    ) -> Result<SessionId> {
        match started {
            Ok(id) => Ok(id),
            Err((id, e)) => {
                let error = CallError::CapabilityCreationFailure(e);
                tracing::error!(session_id = %id, "❌ {}", error);
                self.observer.error(Some(id), &error);
                self.observer.disconnected(id);
                Err(error)
            }
        }
    }
}

impl Drop for RegistryShared {
    fn drop(&mut self) {
        let live = self.live.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(inbound) = live.inbound.take() {
            inbound.abort();
        }
        for handle in live.sessions.values() {
            handle.close();
        }
    }
}
