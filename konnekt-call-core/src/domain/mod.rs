pub mod candidate;
pub mod description;
pub mod envelope;
pub mod peer;
pub mod rtc_state;

pub use candidate::{CandidateParseError, IceCandidate, IceCandidateInfo};
pub use description::{SdpType, SessionDescription};
pub use envelope::{
    CodecError, SignalingEnvelope, SignalingOp, SignalingPayload, WireEnvelope, SIGNALING_TYPE,
};
pub use peer::{PeerId, SessionId};
pub use rtc_state::{IceConnectionState, SignalingState};
