//! In-process event bus.

use std::sync::{Mutex, PoisonError, mpsc};

use crate::bus::{EventBus, Subscription};
use crate::event::AgentEvent;

/// Bus carrying the agent's events to UI collaborators.
pub type AgentBus = InMemoryEventBus<AgentEvent>;

#[derive(Debug)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    Poisoned,
}

/// In-memory fan-out bus.
///
/// - No IO, no async
/// - Subscribers whose receiver was dropped are pruned on the next publish
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriber count (as of the last publish).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| InMemoryBusError::Poisoned)?;

        subs.retain(|tx| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Subscription::new(rx)
    }
}

impl InMemoryEventBus<AgentEvent> {
    /// Publish and log; a failed publish must never take the caller down.
    pub fn emit(&self, event: AgentEvent) {
        tracing::debug!(event = event.name(), "publishing agent event");
        if let Err(err) = self.publish(event) {
            tracing::error!(error = ?err, "failed to publish agent event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_gets_every_message_in_order() {
        let bus = InMemoryEventBus::<u32>::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        for n in 0..5 {
            bus.publish(n).unwrap();
        }

        assert_eq!(a.drain(), vec![0, 1, 2, 3, 4]);
        assert_eq!(b.drain(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = InMemoryEventBus::<u32>::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(1).unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.drain(), vec![1]);
    }

    #[test]
    fn late_subscriber_misses_earlier_messages() {
        let bus = AgentBus::new();
        bus.emit(AgentEvent::Unlocked);
        let late = bus.subscribe();
        bus.emit(AgentEvent::ModulesChanged {
            store_active: true,
            pharmacy_active: false,
        });
        assert_eq!(
            late.drain(),
            vec![AgentEvent::ModulesChanged {
                store_active: true,
                pharmacy_active: false
            }]
        );
    }
}
