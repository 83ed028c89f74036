pub mod application;
pub mod domain;

pub use application::{
    CandidateBuffer, NegotiationAction, NegotiationError, NegotiationFailure, NegotiationInput,
    NegotiationMachine, NegotiationState, Operation, Role,
};
pub use domain::{
    CandidateParseError, CodecError, IceCandidate, IceCandidateInfo, IceConnectionState, PeerId,
    SdpType, SessionDescription, SessionId, SignalingEnvelope, SignalingOp, SignalingPayload,
    SignalingState, WireEnvelope, SIGNALING_TYPE,
};
