mod config;
mod controller;
mod observer;
mod registry;
mod session;

pub use config::{OfferPolicy, RegistryConfig};
pub use controller::CallController;
pub use observer::{CallNotice, CallObserver, LoggingObserver, RecordingObserver};
pub use registry::{Dispatch, SessionRegistry, SessionRegistryBuilder};
pub use session::SessionStatus;
