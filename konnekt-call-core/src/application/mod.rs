mod candidate_buffer;
mod negotiation;

pub use candidate_buffer::CandidateBuffer;
pub use negotiation::{
    NegotiationAction, NegotiationError, NegotiationFailure, NegotiationInput, NegotiationMachine,
    NegotiationState, Operation, Role,
};
