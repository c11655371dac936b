use crate::error::BusError;
use crate::{InvalidationBus, InvalidationEvent};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// A safe default for the broadcast buffer. Invalidations are small and
/// bursty; 128 absorbs a namespace sweep without lagging receivers.
const DEFAULT_CAPACITY: usize = 128;
const MIN_CAPACITY: usize = 1;

/// In-process [`InvalidationBus`] over a tokio broadcast channel.
///
/// Delivery is at-most-once and best-effort: a receiver that lags past the
/// buffer drops the oldest events and serves slightly stale data until
/// local expiry, which is the documented degradation for missed
/// invalidations. Deployments that span processes bridge this bus onto
/// their transport by forwarding [`InvalidationEvent::encode`]d frames
/// both ways.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<Arc<InvalidationEvent>>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBus {
    /// Creates a bus with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    /// Creates a bus with an explicit buffer capacity.
    ///
    /// # Errors
    /// Returns [`BusError::InvalidCapacity`] if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Result<Self, BusError> {
        if capacity < MIN_CAPACITY {
            return Err(BusError::InvalidCapacity { requested: capacity });
        }
        let (sender, _) = broadcast::channel(capacity);
        Ok(Self { sender })
    }
}

impl InvalidationBus for LocalBus {
    fn publish(&self, event: InvalidationEvent) -> Result<usize, BusError> {
        match self.sender.send(Arc::new(event)) {
            Ok(count) => {
                trace!(count, "Invalidation dispatched");
                Ok(count)
            },
            Err(_) => {
                trace!("Invalidation dropped: no active subscribers");
                Ok(0)
            },
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<InvalidationEvent>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InvalidationScope;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = LocalBus::new();
        let mut rx_a = bus.subscribe();
        let mut rx_b = bus.subscribe();

        let event = InvalidationEvent {
            scope: InvalidationScope::Key("ns:k".into()),
            source_id: "proc-1".into(),
        };
        assert_eq!(bus.publish(event.clone()).unwrap(), 2);

        assert_eq!(*rx_a.recv().await.unwrap(), event);
        assert_eq!(*rx_b.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = LocalBus::new();
        let event =
            InvalidationEvent { scope: InvalidationScope::All, source_id: "proc-1".into() };
        assert_eq!(bus.publish(event).unwrap(), 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            LocalBus::with_capacity(0),
            Err(BusError::InvalidCapacity { requested: 0 })
        ));
    }
}
