use crate::infrastructure::error::TransportError;
use konnekt_call_core::PeerId;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Outbound half of the signaling channel
///
/// Connection management (connect, reconnect, backoff) belongs to the
/// implementation. Inbound bytes are fed to
/// [`SessionRegistry::attach_inbound`](crate::SessionRegistry::attach_inbound).
pub trait SignalingTransport: Send + Sync {
    /// Identifier stamped on every outbound envelope
    fn self_id(&self) -> PeerId;

    fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError>;
}

/// In-process broadcast bus, one room shared by every endpoint
///
/// A message sent by one endpoint is delivered to every attached endpoint,
/// the sender included unless echo is disabled.
#[derive(Clone)]
pub struct LocalSignalingHub {
    state: Arc<Mutex<HubState>>,
}

struct HubState {
    endpoints: BTreeMap<PeerId, mpsc::UnboundedSender<Vec<u8>>>,
    echo: bool,
    delivered: u64,
}

impl LocalSignalingHub {
    /// Hub that echoes messages back to their sender
    pub fn new() -> Self {
        Self::with_echo(true)
    }

    pub fn with_echo(echo: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                endpoints: BTreeMap::new(),
                echo,
                delivered: 0,
            })),
        }
    }

    /// Attach an endpoint; reconnecting an id replaces its previous inbox
    pub fn connect(
        &self,
        id: impl Into<PeerId>,
    ) -> (HubEndpoint, mpsc::UnboundedReceiver<Vec<u8>>) {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        self.lock().endpoints.insert(id.clone(), tx);
        tracing::debug!(peer = %id, "🔌 Endpoint attached to signaling hub");

        let endpoint = HubEndpoint {
            id,
            hub: self.clone(),
        };
        (endpoint, rx)
    }

    /// Detach an endpoint; its later sends fail with `Unavailable`
    pub fn disconnect(&self, id: &PeerId) -> bool {
        let removed = self.lock().endpoints.remove(id).is_some();
        if removed {
            tracing::debug!(peer = %id, "Endpoint detached from signaling hub");
        }
        removed
    }

    /// Deliver raw bytes to every endpoint, as a third party on the channel would
    pub fn inject(&self, bytes: Vec<u8>) -> usize {
        let mut state = self.lock();
        let mut count = 0;
        for tx in state.endpoints.values() {
            if tx.send(bytes.clone()).is_ok() {
                count += 1;
            }
        }
        state.delivered += count as u64;
        count
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.lock().endpoints.keys().cloned().collect()
    }

    /// Total number of deliveries made so far
    pub fn delivered(&self) -> u64 {
        self.lock().delivered
    }

    fn broadcast(&self, from: &PeerId, bytes: Vec<u8>) -> Result<usize, TransportError> {
        let mut state = self.lock();
        if !state.endpoints.contains_key(from) {
            return Err(TransportError::Unavailable);
        }

        let echo = state.echo;
        let mut count = 0;
        for (peer, tx) in &state.endpoints {
            if peer == from && !echo {
                continue;
            }
            if tx.send(bytes.clone()).is_ok() {
                count += 1;
            }
        }
        state.delivered += count as u64;
        Ok(count)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LocalSignalingHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant's handle on a [`LocalSignalingHub`]
#[derive(Clone)]
pub struct HubEndpoint {
    id: PeerId,
    hub: LocalSignalingHub,
}

impl HubEndpoint {
    pub fn hub(&self) -> &LocalSignalingHub {
        &self.hub
    }
}

impl SignalingTransport for HubEndpoint {
    fn self_id(&self) -> PeerId {
        self.id.clone()
    }

    fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let count = self.hub.broadcast(&self.id, bytes)?;
        tracing::trace!(peer = %self.id, receivers = count, "📤 Broadcast on signaling hub");
        Ok(())
    }
}
