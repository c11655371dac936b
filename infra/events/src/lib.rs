//! Cache invalidation fan-out across processes.
//!
//! When one process invalidates a key or namespace, its peers should drop
//! their L1 copies promptly instead of waiting for local expiry. This
//! crate defines the event model, the bus contract, and an in-process
//! broadcast implementation. The bus is optional: without one,
//! invalidation is local-only and peers converge at TTL expiry.
//!
//! Receivers filter on `source_id` so a process never reacts to its own
//! publications (its L1 was already updated synchronously).

mod bus;
mod error;

pub use bus::LocalBus;
pub use error::BusError;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// What to drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationScope {
    /// One composite cache key.
    Key(String),
    /// Every key in a namespace.
    Namespace(String),
    /// Everything.
    All,
}

/// A single invalidation, tagged with the publishing process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub scope: InvalidationScope,
    pub source_id: String,
}

impl InvalidationEvent {
    /// Compact binary frame for bridging onto a remote transport.
    ///
    /// # Errors
    /// Returns [`BusError::Codec`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>, BusError> {
        postcard::to_stdvec(self).map_err(BusError::from)
    }

    /// Decodes a frame produced by [`InvalidationEvent::encode`].
    ///
    /// # Errors
    /// Returns [`BusError::Codec`] if the frame is corrupt.
    pub fn decode(bytes: &[u8]) -> Result<Self, BusError> {
        postcard::from_bytes(bytes).map_err(BusError::from)
    }
}

/// Publish/subscribe contract for invalidation fan-out.
///
/// Delivery is at-most-once, best-effort. Implementations must be cheap to
/// clone or share; the cache handler keeps one subscription task per
/// process.
pub trait InvalidationBus: Send + Sync + std::fmt::Debug {
    /// Broadcasts an event; returns how many subscribers received it.
    ///
    /// # Errors
    /// Implementation-defined; the in-process bus only fails on
    /// misconfiguration.
    fn publish(&self, event: InvalidationEvent) -> Result<usize, BusError>;

    /// Opens a subscription stream.
    fn subscribe(&self) -> broadcast::Receiver<Arc<InvalidationEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_roundtrip() {
        let events = [
            InvalidationEvent {
                scope: InvalidationScope::Key("ns:users:func:get:args:00ff".into()),
                source_id: "proc-a".into(),
            },
            InvalidationEvent {
                scope: InvalidationScope::Namespace("users".into()),
                source_id: "proc-b".into(),
            },
            InvalidationEvent { scope: InvalidationScope::All, source_id: "proc-c".into() },
        ];

        for event in events {
            let frame = event.encode().unwrap();
            assert_eq!(InvalidationEvent::decode(&frame).unwrap(), event);
        }
    }

    #[test]
    fn test_corrupt_frame_fails() {
        assert!(InvalidationEvent::decode(&[0xff, 0x07, 0x01]).is_err());
    }
}
