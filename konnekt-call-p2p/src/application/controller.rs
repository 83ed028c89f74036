use crate::application::{CallObserver, SessionRegistry};
use crate::domain::MediaSource;
use crate::infrastructure::error::{CallError, Result};
use konnekt_call_core::SessionId;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The two buttons of a call UI: start/stop local media, and call
pub struct CallController {
    registry: SessionRegistry,
    source: Arc<dyn MediaSource>,
    observer: Arc<dyn CallObserver>,
    toggling: Mutex<()>,
}

impl CallController {
    pub fn new(
        registry: SessionRegistry,
        source: Arc<dyn MediaSource>,
        observer: Arc<dyn CallObserver>,
    ) -> Self {
        Self {
            registry,
            source,
            observer,
            toggling: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Whether local media is currently captured
    pub fn is_active(&self) -> bool {
        self.registry.local_stream().is_some()
    }

    /// Start local media when idle, stop everything when active
    ///
    /// Returns `false` only when capture fails.
    pub async fn on_start_stop(&self) -> bool {
        let _guard = self.toggling.lock().await;

        match self.registry.clear_local_stream() {
            None => match self.source.capture().await {
                Ok(stream) => {
                    tracing::info!(stream = stream.id(), "🎬 Local media started");
                    self.registry.set_local_stream(stream);
                    true
                }
                Err(e) => {
                    let error = CallError::MediaUnavailable(e.to_string());
                    tracing::error!("❌ {}", error);
                    self.observer.error(None, &error);
                    false
                }
            },
            Some(stream) => {
                stream.stop_all();
                let destroyed = self.registry.destroy_all().await;
                tracing::info!(destroyed, "⏹️  Local media stopped");
                true
            }
        }
    }

    /// Place a call; refused while local media is not started
    pub fn on_offer(&self) -> Result<SessionId> {
        if !self.is_active() {
            return Err(CallError::MediaUnavailable(
                "start local media before calling".to_string(),
            ));
        }
        self.registry.create_outbound()
    }
}
