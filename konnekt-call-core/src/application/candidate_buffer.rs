use crate::domain::IceCandidate;
use std::collections::VecDeque;

/// Holds locally discovered candidates until negotiation completes
///
/// Candidates are queued in discovery order. `flush` drains the queue once
/// and releases the buffer; after that every candidate passes straight
/// through `offer`.
#[derive(Debug, Clone, Default)]
pub struct CandidateBuffer {
    queue: VecDeque<IceCandidate>,
    released: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a candidate, or hand it back if the buffer was already flushed
    pub fn offer(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.released {
            Some(candidate)
        } else {
            self.queue.push_back(candidate);
            None
        }
    }

    /// Drain everything queued so far and switch to pass-through
    ///
    /// Only the first call returns candidates.
    pub fn flush(&mut self) -> Vec<IceCandidate> {
        self.released = true;
        self.queue.drain(..).collect()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
