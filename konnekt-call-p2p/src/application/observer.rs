use crate::domain::MediaStream;
use crate::infrastructure::error::CallError;
use konnekt_call_core::SessionId;
use std::sync::{Mutex, PoisonError};

/// Callbacks consumed by the UI layer
///
/// Called from session tasks; implementations must not block.
pub trait CallObserver: Send + Sync {
    /// A session was torn down. Called exactly once per session.
    fn disconnected(&self, session: SessionId);

    fn error(&self, session: Option<SessionId>, error: &CallError);

    /// ICE failed; the call may be retried with a new session
    fn ice_failed(&self, _session: SessionId) {}

    fn remote_stream(&self, _session: SessionId, _stream: &MediaStream) {}
}

/// Observer that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl CallObserver for LoggingObserver {
    fn disconnected(&self, session: SessionId) {
        tracing::info!(session_id = %session, "📴 Disconnected");
    }

    fn error(&self, session: Option<SessionId>, error: &CallError) {
        match session {
            Some(session) => tracing::error!(session_id = %session, "❌ {}", error),
            None => tracing::error!("❌ {}", error),
        }
    }

    fn ice_failed(&self, session: SessionId) {
        tracing::warn!(session_id = %session, "ICE failed, call can be retried");
    }
}

/// Everything an observer was told, in order
#[derive(Debug, Clone, PartialEq)]
pub enum CallNotice {
    Disconnected(SessionId),
    Error(Option<SessionId>, CallError),
    IceFailed(SessionId),
    RemoteStream(SessionId, String),
}

/// Observer that records every callback
#[derive(Debug, Default)]
pub struct RecordingObserver {
    notices: Mutex<Vec<CallNotice>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<CallNotice> {
        self.lock().clone()
    }

    pub fn disconnects(&self, session: SessionId) -> usize {
        self.lock()
            .iter()
            .filter(|n| **n == CallNotice::Disconnected(session))
            .count()
    }

    pub fn errors(&self) -> Vec<CallError> {
        self.lock()
            .iter()
            .filter_map(|n| match n {
                CallNotice::Error(_, error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CallNotice>> {
        self.notices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, notice: CallNotice) {
        self.lock().push(notice);
    }
}

impl CallObserver for RecordingObserver {
    fn disconnected(&self, session: SessionId) {
        self.push(CallNotice::Disconnected(session));
    }

    fn error(&self, session: Option<SessionId>, error: &CallError) {
        self.push(CallNotice::Error(session, error.clone()));
    }

    fn ice_failed(&self, session: SessionId) {
        self.push(CallNotice::IceFailed(session));
    }

    fn remote_stream(&self, session: SessionId, stream: &MediaStream) {
        self.push(CallNotice::RemoteStream(session, stream.id().to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_counts_disconnects() {
        let observer = RecordingObserver::new();
        let id = SessionId::new(3);

        observer.disconnected(id);
        observer.error(Some(id), &CallError::SessionNotFound(id));

        assert_eq!(observer.disconnects(id), 1);
        assert_eq!(observer.disconnects(SessionId::FIRST), 0);
        assert_eq!(observer.errors(), vec![CallError::SessionNotFound(id)]);
    }
}
