use crate::infrastructure::error::CapabilityError;
use async_trait::async_trait;
use konnekt_call_core::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// A single audio or video track (`MediaStreamTrack`)
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn kind(&self) -> MediaKind;
    /// Release the underlying source; idempotent
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// Group of tracks; two streams are the same stream when their ids match
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|track| track.is_live())
    }
}

impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MediaStream {}

/// Where a session renders the remote party's media
pub trait MediaSink: Send + Sync {
    fn current_stream(&self) -> Option<MediaStream>;

    fn attach(&self, stream: MediaStream) -> Result<(), CapabilityError>;

    /// Secondary attachment path used when `attach` is rejected
    fn attach_fallback(&self, stream: MediaStream) -> Result<(), CapabilityError>;

    fn detach(&self);
}

/// Creates one sink per session
pub trait MediaSinkFactory: Send + Sync {
    fn create(&self, session: SessionId) -> Arc<dyn MediaSink>;
}

/// Local capture device (`getUserMedia`)
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn capture(&self) -> Result<MediaStream, CapabilityError>;
}

/// Sink that only remembers the attached stream
#[derive(Debug, Default)]
pub struct MemoryMediaSink {
    stream: Mutex<Option<MediaStream>>,
}

impl MemoryMediaSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaSink for MemoryMediaSink {
    fn current_stream(&self) -> Option<MediaStream> {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn attach(&self, stream: MediaStream) -> Result<(), CapabilityError> {
        *self.stream.lock().unwrap_or_else(PoisonError::into_inner) = Some(stream);
        Ok(())
    }

    fn attach_fallback(&self, stream: MediaStream) -> Result<(), CapabilityError> {
        self.attach(stream)
    }

    fn detach(&self) {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Hands out a fresh [`MemoryMediaSink`] per session
#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySinkFactory;

impl MediaSinkFactory for MemorySinkFactory {
    fn create(&self, _session: SessionId) -> Arc<dyn MediaSink> {
        Arc::new(MemoryMediaSink::new())
    }
}
