use crate::application::CandidateBuffer;
use crate::domain::{
    IceCandidate, IceConnectionState, PeerId, SessionDescription, SignalingEnvelope, SignalingOp,
    SignalingPayload, SignalingState,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the offer/answer exchange a session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Created locally, sends the offer
    Caller,
    /// Created from an inbound offer, sends the answer
    Callee,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Caller => f.write_str("caller"),
            Role::Callee => f.write_str("callee"),
        }
    }
}

/// Negotiation progress of one peer session
///
/// ```text
/// Idle -> SendOffer -> SendingOffer -> WaitAnswer    -> Completed
/// Idle -> RecvOffer -> SendAnswer   -> SendingAnswer -> Completed
/// any non-final state -> Failed | Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NegotiationState {
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
}

impl NegotiationState {
    /// Failed and Closed accept no further input
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Failed | NegotiationState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationState::Idle => "idle",
            NegotiationState::SendOffer => "send-offer",
            NegotiationState::SendingOffer => "sending-offer",
            NegotiationState::WaitAnswer => "wait-answer",
            NegotiationState::RecvOffer => "recv-offer",
            NegotiationState::SendAnswer => "send-answer",
            NegotiationState::SendingAnswer => "sending-answer",
            NegotiationState::Completed => "completed",
            NegotiationState::Failed => "failed",
            NegotiationState::Closed => "closed",
        }
    }

    pub fn can_transition_to(&self, next: NegotiationState) -> bool {
        use NegotiationState::*;

        match (self, next) {
            (Failed | Closed, _) => false,
            (_, Failed | Closed) => true,
            (Idle, SendOffer | RecvOffer) => true,
            (SendOffer, SendingOffer) => true,
            (SendingOffer, WaitAnswer) => true,
            (WaitAnswer, Completed) => true,
            (RecvOffer, SendAnswer) => true,
            (SendAnswer, SendingAnswer) => true,
            (SendingAnswer, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability operation requested by the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
    AddIceCandidate,
    AddTrack,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CreateOffer => "create-offer",
            Operation::CreateAnswer => "create-answer",
            Operation::SetLocalDescription => "set-local-description",
            Operation::SetRemoteDescription => "set-remote-description",
            Operation::AddIceCandidate => "add-ice-candidate",
            Operation::AddTrack => "add-track",
        };
        f.write_str(name)
    }
}

/// The capability rejected an operation; the session is lost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationFailure {
    pub operation: Operation,
    pub reason: String,
}

impl fmt::Display for NegotiationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.reason)
    }
}

/// Everything that can drive a negotiation forward
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationInput {
    /// Leave `Idle`; the role decides the branch
    Start,

    // Capability events
    NegotiationNeeded,
    SignalingStateChanged(SignalingState),
    IceConnectionStateChanged(IceConnectionState),
    LocalCandidate(IceCandidate),

    // Completions of requested operations
    OfferCreated(SessionDescription),
    AnswerCreated(SessionDescription),
    LocalDescriptionApplied,
    RemoteDescriptionApplied,
    RemoteCandidateApplied,
    OperationFailed { operation: Operation, reason: String },

    /// Envelope routed to this session from the signaling channel
    Remote(SignalingEnvelope),

    /// Local teardown request
    Close,
}

/// Side effect the owner of the machine must carry out
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationAction {
    CreateOffer,
    CreateAnswer,
    SetLocalDescription(SessionDescription),
    SetRemoteDescription(SessionDescription),
    AddIceCandidate(IceCandidate),
    Send(SignalingEnvelope),
    ReportFailure(NegotiationFailure),
    /// ICE failed; the session may be replaced by a new call
    ReportIceFailure,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum NegotiationError {
    #[error("Unexpected {op} envelope in state {state}")]
    UnexpectedOp {
        state: NegotiationState,
        op: SignalingOp,
    },

    #[error("Negotiation already started (state {0})")]
    AlreadyStarted(NegotiationState),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: NegotiationState,
        to: NegotiationState,
    },
}

/// Offer/answer protocol engine for one remote party
///
/// Pure input -> actions machine. It never performs I/O itself; the owner
/// executes the returned actions and feeds their completions back as
/// inputs. Outbound descriptions are only emitted once the signaling state
/// proves the local description was applied.
#[derive(Debug, Clone)]
pub struct NegotiationMachine {
    local_id: PeerId,
    role: Role,
    state: NegotiationState,

    /// Remote party, known from the offer (callee) or the accepted answer (caller)
    remote_peer: Option<PeerId>,

    remote_offer: Option<SessionDescription>,
    local_description: Option<SessionDescription>,
    remote_answer: Option<SessionDescription>,
    answer_requested: bool,

    candidates: CandidateBuffer,

    /// Remote candidates that arrived while the accepted answer was being applied
    early_remote_candidates: Vec<IceCandidate>,
}

impl NegotiationMachine {
    /// Machine for a locally initiated call
    pub fn caller(local_id: PeerId) -> Self {
        Self::with_role(local_id, Role::Caller, None, None)
    }

    /// Machine answering `offer` received from `remote_peer`
    pub fn callee(local_id: PeerId, remote_peer: PeerId, offer: SessionDescription) -> Self {
        Self::with_role(local_id, Role::Callee, Some(remote_peer), Some(offer))
    }

    fn with_role(
        local_id: PeerId,
        role: Role,
        remote_peer: Option<PeerId>,
        remote_offer: Option<SessionDescription>,
    ) -> Self {
        Self {
            local_id,
            role,
            state: NegotiationState::Idle,
            remote_peer,
            remote_offer,
            local_description: None,
            remote_answer: None,
            answer_requested: false,
            candidates: CandidateBuffer::new(),
            early_remote_candidates: Vec::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn remote_peer(&self) -> Option<&PeerId> {
        self.remote_peer.as_ref()
    }

    pub fn pending_candidates(&self) -> usize {
        self.candidates.len()
    }

    /// Feed one input and collect the resulting actions
    ///
    /// Inputs that do not fit the current state are ignored (empty action
    /// list). Remote envelopes that do not fit are reported as
    /// [`NegotiationError::UnexpectedOp`] so the caller can log the drop;
    /// the machine is left untouched in that case.
    pub fn handle(
        &mut self,
        input: NegotiationInput,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        if self.state.is_terminal() {
            return Ok(Vec::new());
        }

        match input {
            NegotiationInput::Start => self.handle_start(),
            NegotiationInput::NegotiationNeeded => self.handle_negotiation_needed(),
            NegotiationInput::SignalingStateChanged(signaling) => {
                self.handle_signaling_state(signaling)
            }
            NegotiationInput::IceConnectionStateChanged(ice) => self.handle_ice_state(ice),
            NegotiationInput::LocalCandidate(candidate) => Ok(self.handle_local_candidate(candidate)),
            NegotiationInput::OfferCreated(offer) => self.handle_offer_created(offer),
            NegotiationInput::AnswerCreated(answer) => self.handle_answer_created(answer),
            NegotiationInput::LocalDescriptionApplied => Ok(Vec::new()),
            NegotiationInput::RemoteDescriptionApplied => self.handle_remote_description_applied(),
            NegotiationInput::RemoteCandidateApplied => Ok(Vec::new()),
            NegotiationInput::OperationFailed { operation, reason } => {
                self.handle_operation_failed(operation, reason)
            }
            NegotiationInput::Remote(envelope) => self.handle_remote(envelope),
            NegotiationInput::Close => {
                self.transition(NegotiationState::Closed)?;
                Ok(Vec::new())
            }
        }
    }

    // ===== Local lifecycle =====

    fn handle_start(&mut self) -> Result<Vec<NegotiationAction>, NegotiationError> {
        if self.state != NegotiationState::Idle {
            return Err(NegotiationError::AlreadyStarted(self.state));
        }

        let next = match self.role {
            Role::Caller => NegotiationState::SendOffer,
            Role::Callee => NegotiationState::RecvOffer,
        };
        self.transition(next)?;
        Ok(Vec::new())
    }

    fn handle_negotiation_needed(&mut self) -> Result<Vec<NegotiationAction>, NegotiationError> {
        match self.state {
            NegotiationState::SendOffer => {
                self.transition(NegotiationState::SendingOffer)?;
                Ok(vec![NegotiationAction::CreateOffer])
            }
            NegotiationState::RecvOffer => match self.remote_offer.clone() {
                Some(offer) => {
                    self.transition(NegotiationState::SendAnswer)?;
                    Ok(vec![NegotiationAction::SetRemoteDescription(offer)])
                }
                None => Ok(Vec::new()),
            },
            _ => {
                tracing::debug!(state = %self.state, "Ignoring negotiation-needed");
                Ok(Vec::new())
            }
        }
    }

    fn handle_signaling_state(
        &mut self,
        signaling: SignalingState,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        match (self.state, signaling) {
            (NegotiationState::SendingOffer, SignalingState::HaveLocalOffer) => {
                let Some(offer) = self.local_description.clone() else {
                    return Ok(Vec::new());
                };
                self.transition(NegotiationState::WaitAnswer)?;
                Ok(vec![NegotiationAction::Send(SignalingEnvelope::offer(
                    self.local_id.clone(),
                    offer,
                ))])
            }

            (NegotiationState::SendAnswer, SignalingState::HaveRemoteOffer)
                if !self.answer_requested =>
            {
                self.answer_requested = true;
                Ok(vec![NegotiationAction::CreateAnswer])
            }

            (NegotiationState::SendingAnswer, SignalingState::Stable) => {
                let Some(answer) = self.local_description.clone() else {
                    return Ok(Vec::new());
                };
                self.transition(NegotiationState::Completed)?;

                let mut actions = vec![NegotiationAction::Send(SignalingEnvelope::answer(
                    self.local_id.clone(),
                    answer,
                ))];
                actions.extend(self.flush_candidates());
                Ok(actions)
            }

            _ => {
                tracing::trace!(state = %self.state, %signaling, "Signaling state change");
                Ok(Vec::new())
            }
        }
    }

    fn handle_ice_state(
        &mut self,
        ice: IceConnectionState,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        match ice {
            IceConnectionState::Failed => Ok(vec![NegotiationAction::ReportIceFailure]),
            state if state.ends_session() => {
                self.transition(NegotiationState::Closed)?;
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn handle_local_candidate(&mut self, candidate: IceCandidate) -> Vec<NegotiationAction> {
        match self.candidates.offer(candidate) {
            Some(candidate) => vec![self.send_candidate(candidate)],
            None => Vec::new(),
        }
    }

    // ===== Operation completions =====

    fn handle_offer_created(
        &mut self,
        offer: SessionDescription,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        if self.state != NegotiationState::SendingOffer || self.local_description.is_some() {
            return Ok(Vec::new());
        }

        self.local_description = Some(offer.clone());
        Ok(vec![NegotiationAction::SetLocalDescription(offer)])
    }

    fn handle_answer_created(
        &mut self,
        answer: SessionDescription,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        if self.state != NegotiationState::SendAnswer {
            return Ok(Vec::new());
        }

        self.local_description = Some(answer.clone());
        self.transition(NegotiationState::SendingAnswer)?;
        Ok(vec![NegotiationAction::SetLocalDescription(answer)])
    }

    fn handle_remote_description_applied(
        &mut self,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        if self.state != NegotiationState::WaitAnswer || self.remote_answer.is_none() {
            return Ok(Vec::new());
        }

        self.transition(NegotiationState::Completed)?;

        let mut actions: Vec<NegotiationAction> = self
            .early_remote_candidates
            .drain(..)
            .map(NegotiationAction::AddIceCandidate)
            .collect();
        actions.extend(self.flush_candidates());
        Ok(actions)
    }

    fn handle_operation_failed(
        &mut self,
        operation: Operation,
        reason: String,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        self.transition(NegotiationState::Failed)?;
        Ok(vec![NegotiationAction::ReportFailure(NegotiationFailure {
            operation,
            reason,
        })])
    }

    // ===== Remote envelopes =====

    fn handle_remote(
        &mut self,
        envelope: SignalingEnvelope,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        let unexpected = NegotiationError::UnexpectedOp {
            state: self.state,
            op: envelope.op(),
        };

        if let Some(remote) = &self.remote_peer {
            if !envelope.is_from(remote) {
                return Err(unexpected);
            }
        }

        match envelope.payload {
            SignalingPayload::Answer(answer)
                if self.state == NegotiationState::WaitAnswer && self.remote_answer.is_none() =>
            {
                self.remote_peer = Some(envelope.sender);
                self.remote_answer = Some(answer.clone());
                Ok(vec![NegotiationAction::SetRemoteDescription(answer)])
            }
            SignalingPayload::Ice(candidate) if self.state == NegotiationState::Completed => {
                Ok(vec![NegotiationAction::AddIceCandidate(candidate)])
            }
            // The callee flushes its candidates right behind the answer
            SignalingPayload::Ice(candidate)
                if self.state == NegotiationState::WaitAnswer && self.remote_answer.is_some() =>
            {
                tracing::trace!("Holding remote candidate until the answer is applied");
                self.early_remote_candidates.push(candidate);
                Ok(Vec::new())
            }
            _ => Err(unexpected),
        }
    }

    // ===== Helpers =====

    fn flush_candidates(&mut self) -> Vec<NegotiationAction> {
        self.candidates
            .flush()
            .into_iter()
            .map(|candidate| self.send_candidate(candidate))
            .collect()
    }

    fn send_candidate(&self, candidate: IceCandidate) -> NegotiationAction {
        NegotiationAction::Send(SignalingEnvelope::ice(self.local_id.clone(), candidate))
    }

    fn transition(&mut self, next: NegotiationState) -> Result<(), NegotiationError> {
        if !self.state.can_transition_to(next) {
            return Err(NegotiationError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!(role = %self.role, from = %self.state, to = %next, "Negotiation transition");
        self.state = next;
        Ok(())
    }
}
