use crate::application::{CallObserver, RegistryConfig};
use crate::domain::{MediaSink, MediaStream};
use crate::infrastructure::error::{CallError, CapabilityError};
use crate::infrastructure::peer_connection::{
    PeerConnection, PeerConnectionEvent, PeerConnectionEvents, PeerConnectionFactory,
};
use crate::infrastructure::transport::SignalingTransport;
use konnekt_call_core::{
    NegotiationAction, NegotiationError, NegotiationInput, NegotiationMachine, NegotiationState,
    Operation, PeerId, Role, SessionId, SignalingEnvelope, SignalingOp,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Snapshot of one session, published on every change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub id: SessionId,
    pub role: Role,
    pub state: NegotiationState,
    pub remote_peer: Option<PeerId>,
}

pub(crate) enum SessionInput {
    Event(PeerConnectionEvent),
    Negotiation(NegotiationInput),
}

/// Everything a new session needs
pub(crate) struct SessionSetup {
    pub id: SessionId,
    pub machine: NegotiationMachine,
    pub local_stream: MediaStream,
    pub config: Arc<RegistryConfig>,
    pub factory: Arc<dyn PeerConnectionFactory>,
    pub transport: Arc<dyn SignalingTransport>,
    pub observer: Arc<dyn CallObserver>,
    pub sink: Arc<dyn MediaSink>,
    /// Runs once during teardown, before `disconnected` is reported
    pub on_exit: Box<dyn FnOnce(SessionId) + Send>,
}

/// Registry-side handle on a running session task
pub(crate) struct SessionHandle {
    id: SessionId,
    role: Role,
    remote_peer: Option<PeerId>,
    inbox: mpsc::UnboundedSender<SessionInput>,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Remote party this session is bound to, as far as routing knows
    pub fn remote_peer(&self) -> Option<&PeerId> {
        self.remote_peer.as_ref()
    }

    pub fn bind(&mut self, peer: PeerId) {
        self.remote_peer = Some(peer);
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Queue an envelope; `false` once the session has stopped
    pub fn deliver(&self, envelope: SignalingEnvelope) -> bool {
        self.inbox
            .send(SessionInput::Negotiation(NegotiationInput::Remote(envelope)))
            .is_ok()
    }

    /// Ask the session to close and wait for its teardown
    pub async fn shutdown(self) {
        let _ = self
            .inbox
            .send(SessionInput::Negotiation(NegotiationInput::Close));
        if let Err(e) = self.task.await {
            tracing::warn!(session_id = %self.id, "Session task ended abnormally: {}", e);
        }
    }

    /// Ask the session to close without waiting
    pub fn close(&self) {
        let _ = self
            .inbox
            .send(SessionInput::Negotiation(NegotiationInput::Close));
    }
}

/// Build the peer connection and start the session task
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn(setup: SessionSetup) -> Result<SessionHandle, CapabilityError> {
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

    let events_tx = inbox_tx.clone();
    let events =
        PeerConnectionEvents::new(move |event| events_tx.send(SessionInput::Event(event)).is_ok());
    let connection = setup
        .factory
        .create(&setup.config.rtc_configuration(), events)?;

    let id = setup.id;
    let role = setup.machine.role();
    let remote_peer = setup.machine.remote_peer().cloned();
    let (status_tx, status_rx) = watch::channel(SessionStatus {
        id,
        role,
        state: setup.machine.state(),
        remote_peer: remote_peer.clone(),
    });

    let session = PeerSession {
        id,
        machine: setup.machine,
        connection,
        local_stream: setup.local_stream,
        config: setup.config,
        transport: setup.transport,
        observer: setup.observer,
        sink: setup.sink,
        inbox: inbox_tx.clone(),
        status: status_tx,
        on_exit: Some(setup.on_exit),
    };

    let span = tracing::info_span!("peer_session", session_id = %id, role = %role);
    let task = tokio::spawn(session.run(inbox_rx).instrument(span));

    Ok(SessionHandle {
        id,
        role,
        remote_peer,
        inbox: inbox_tx,
        status: status_rx,
        task,
    })
}

/// One remote party: negotiation machine, peer connection and remote media
///
/// Runs as its own task. Capability operations are spawned and report back
/// through the inbox, so a completion arriving after teardown is dropped.
struct PeerSession {
    id: SessionId,
    machine: NegotiationMachine,
    connection: Arc<dyn PeerConnection>,
    local_stream: MediaStream,
    config: Arc<RegistryConfig>,
    transport: Arc<dyn SignalingTransport>,
    observer: Arc<dyn CallObserver>,
    sink: Arc<dyn MediaSink>,
    inbox: mpsc::UnboundedSender<SessionInput>,
    status: watch::Sender<SessionStatus>,
    on_exit: Option<Box<dyn FnOnce(SessionId) + Send>>,
}

impl PeerSession {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionInput>) {
        tracing::info!("📞 Session created");

        self.attach_local_tracks().await;
        self.apply(NegotiationInput::Start);

        while !self.machine.state().is_terminal() {
            match inbox.recv().await {
                Some(SessionInput::Event(event)) => self.handle_event(event),
                Some(SessionInput::Negotiation(input)) => self.apply(input),
                None => break,
            }
        }

        drop(inbox);
        self.teardown().await;
    }

    async fn attach_local_tracks(&mut self) {
        let stream = self.local_stream.clone();
        for track in stream.tracks() {
            if let Err(e) = self.connection.add_track(track.clone(), &stream).await {
                self.apply(NegotiationInput::OperationFailed {
                    operation: Operation::AddTrack,
                    reason: e.to_string(),
                });
                return;
            }
        }
        tracing::debug!(tracks = stream.tracks().len(), "Local tracks attached");
    }

    // ===== Inputs =====

    fn handle_event(&mut self, event: PeerConnectionEvent) {
        match event {
            PeerConnectionEvent::IceCandidate(Some(candidate)) => {
                match candidate.info() {
                    Ok(info) => tracing::trace!(candidate = %info, "🧊 Local candidate"),
                    Err(e) => tracing::debug!("Unparsable local candidate: {}", e),
                }
                self.apply(NegotiationInput::LocalCandidate(candidate));
            }
            PeerConnectionEvent::IceCandidate(None) => {
                tracing::debug!("Candidate gathering complete");
            }
            PeerConnectionEvent::IceConnectionStateChanged(ice) => {
                tracing::info!(ice = %ice, "ICE connection state changed");
                self.apply(NegotiationInput::IceConnectionStateChanged(ice));
            }
            PeerConnectionEvent::SignalingStateChanged(signaling) => {
                tracing::debug!(signaling = %signaling, "Signaling state changed");
                self.apply(NegotiationInput::SignalingStateChanged(signaling));
            }
            PeerConnectionEvent::NegotiationNeeded => {
                self.apply(NegotiationInput::NegotiationNeeded);
            }
            PeerConnectionEvent::TrackAdded(streams) => self.bind_remote_streams(streams),
        }
    }

    fn apply(&mut self, input: NegotiationInput) {
        let actions = match self.machine.handle(input) {
            Ok(actions) => actions,
            Err(error @ NegotiationError::UnexpectedOp { .. }) => {
                tracing::warn!("🗑️  Dropping envelope: {}", error);
                return;
            }
            Err(error) => {
                tracing::warn!("Ignoring input: {}", error);
                return;
            }
        };

        self.publish();
        for action in actions {
            self.execute(action);
        }
    }

    fn publish(&self) {
        let state = self.machine.state();
        let remote_peer = self.machine.remote_peer().cloned();
        self.status.send_if_modified(|status| {
            if status.state == state && status.remote_peer == remote_peer {
                return false;
            }
            status.state = state;
            status.remote_peer = remote_peer;
            true
        });
    }

    // ===== Actions =====

    fn execute(&self, action: NegotiationAction) {
        let connection = self.connection.clone();

        match action {
            NegotiationAction::CreateOffer => {
                let options = self.config.offer_options;
                self.spawn_operation(
                    Operation::CreateOffer,
                    async move { connection.create_offer(&options).await },
                    NegotiationInput::OfferCreated,
                );
            }
            NegotiationAction::CreateAnswer => {
                let options = self.config.answer_options;
                self.spawn_operation(
                    Operation::CreateAnswer,
                    async move { connection.create_answer(&options).await },
                    NegotiationInput::AnswerCreated,
                );
            }
            NegotiationAction::SetLocalDescription(description) => {
                self.spawn_operation(
                    Operation::SetLocalDescription,
                    async move { connection.set_local_description(description).await },
                    |_| NegotiationInput::LocalDescriptionApplied,
                );
            }
            NegotiationAction::SetRemoteDescription(description) => {
                self.spawn_operation(
                    Operation::SetRemoteDescription,
                    async move { connection.set_remote_description(description).await },
                    |_| NegotiationInput::RemoteDescriptionApplied,
                );
            }
            NegotiationAction::AddIceCandidate(candidate) => {
                self.spawn_operation(
                    Operation::AddIceCandidate,
                    async move { connection.add_ice_candidate(candidate).await },
                    |_| NegotiationInput::RemoteCandidateApplied,
                );
            }
            NegotiationAction::Send(envelope) => self.send(envelope),
            NegotiationAction::ReportFailure(failure) => {
                tracing::warn!("💥 {}", failure);
                self.observer
                    .error(Some(self.id), &CallError::NegotiationFailure(failure));
            }
            NegotiationAction::ReportIceFailure => {
                tracing::warn!("ICE connection failed");
                self.observer.ice_failed(self.id);
            }
        }
    }

    fn spawn_operation<T, F, D>(&self, operation: Operation, future: F, done: D)
    where
        T: Send + 'static,
        F: Future<Output = Result<T, CapabilityError>> + Send + 'static,
        D: FnOnce(T) -> NegotiationInput + Send + 'static,
    {
        let inbox = self.inbox.clone();
        let task = async move {
            let input = match future.await {
                Ok(value) => done(value),
                Err(e) => NegotiationInput::OperationFailed {
                    operation,
                    reason: e.to_string(),
                },
            };
            if inbox.send(SessionInput::Negotiation(input)).is_err() {
                tracing::debug!(%operation, "Completion after teardown ignored");
            }
        };
        tokio::spawn(task.in_current_span());
    }

    fn send(&self, envelope: SignalingEnvelope) {
        let op = envelope.op();
        match self.transport.send(envelope.encode()) {
            Ok(()) if op == SignalingOp::Ice => tracing::trace!("📤 Sent ice candidate"),
            Ok(()) => tracing::info!("📤 Sent {}", op),
            Err(e) => {
                tracing::warn!("Could not send {}: {}", op, e);
                self.observer
                    .error(Some(self.id), &CallError::TransportUnavailable(e));
            }
        }
    }

    fn bind_remote_streams(&self, streams: Vec<MediaStream>) {
        for stream in streams {
            if self.sink.current_stream().as_ref() == Some(&stream) {
                tracing::debug!(stream = stream.id(), "Remote stream already bound");
                continue;
            }

            let bound = match self.sink.attach(stream.clone()) {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::warn!("Attaching remote stream failed, using fallback: {}", e);
                    self.sink.attach_fallback(stream.clone())
                }
            };

            match bound {
                Ok(()) => {
                    tracing::info!(stream = stream.id(), "🎥 Remote stream bound");
                    self.observer.remote_stream(self.id, &stream);
                }
                Err(e) => {
                    self.observer
                        .error(Some(self.id), &CallError::MediaUnavailable(e.to_string()));
                }
            }
        }
    }

    // ===== Teardown =====

    async fn teardown(mut self) {
        if !self.machine.state().is_terminal() {
            let _ = self.machine.handle(NegotiationInput::Close);
        }
        self.publish();

        if let Some(stream) = self.sink.current_stream() {
            stream.stop_all();
        }
        self.sink.detach();
        self.connection.remove_event_listeners();
        self.connection.close().await;

        if let Some(on_exit) = self.on_exit.take() {
            on_exit(self.id);
        }

        tracing::info!(state = %self.machine.state(), "📴 Session destroyed");
        self.observer.disconnected(self.id);
    }
}
