// Domain layer (media and connection parameters)
pub mod domain;

// Application layer (sessions, registry, call controller)
pub mod application;

// Infrastructure layer (capability seams and in-process adapters)
pub mod infrastructure;

// Re-exports for convenience
pub use application::{
    CallController, CallNotice, CallObserver, Dispatch, LoggingObserver, OfferPolicy,
    RecordingObserver, RegistryConfig, SessionRegistry, SessionRegistryBuilder, SessionStatus,
};
pub use domain::{
    AnswerOptions, IceServer, MediaKind, MediaSink, MediaSinkFactory, MediaSource, MediaStream,
    MediaTrack, MemoryMediaSink, MemorySinkFactory, OfferOptions, RtcConfiguration,
};
pub use infrastructure::error::{CallError, CapabilityError, Result, TransportError};
pub use infrastructure::{
    FaultPlan, HubEndpoint, LocalSignalingHub, PeerConnection, PeerConnectionEvent,
    PeerConnectionEvents, PeerConnectionFactory, SignalingTransport, SimulatedMediaSource,
    SimulatedPeerConnection, SimulatedPeerConnectionFactory, SimulatedTrack,
};
