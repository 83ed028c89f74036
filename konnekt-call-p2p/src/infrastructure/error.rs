use konnekt_call_core::{CodecError, NegotiationError, NegotiationFailure, SessionId};

/// Error returned by capability implementations (peer connection, media)
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CapabilityError {
    #[error("Operation rejected: {0}")]
    Rejected(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Capability already closed")]
    Closed,
}

/// Error returned by a signaling transport
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum TransportError {
    #[error("Signaling transport unavailable")]
    Unavailable,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Errors surfaced by the call layer
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CallError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error(transparent)]
    UnexpectedOp(#[from] NegotiationError),

    #[error("Negotiation failure: {0}")]
    NegotiationFailure(NegotiationFailure),

    #[error("Cannot create peer connection: {0}")]
    CapabilityCreationFailure(CapabilityError),

    #[error("Transport error: {0}")]
    TransportUnavailable(#[from] TransportError),

    #[error("Local media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
}

impl From<CodecError> for CallError {
    fn from(error: CodecError) -> Self {
        CallError::MalformedEnvelope(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CallError>;
