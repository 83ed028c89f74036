pub mod media;
pub mod rtc_config;

pub use media::{
    MediaKind, MediaSink, MediaSinkFactory, MediaSource, MediaStream, MediaTrack, MemoryMediaSink,
    MemorySinkFactory,
};
pub use rtc_config::{AnswerOptions, IceServer, OfferOptions, RtcConfiguration, DEFAULT_STUN_URL};
