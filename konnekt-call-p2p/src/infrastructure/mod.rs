pub mod error;
pub mod peer_connection;
pub mod simulated;
pub mod transport;

pub use peer_connection::{
    PeerConnection, PeerConnectionEvent, PeerConnectionEvents, PeerConnectionFactory,
};
pub use simulated::{
    FaultPlan, SimulatedMediaSource, SimulatedPeerConnection, SimulatedPeerConnectionFactory,
    SimulatedTrack,
};
pub use transport::{HubEndpoint, LocalSignalingHub, SignalingTransport};
