//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from the supervisor control loop.
//!
//! ## Architecture
//! ```text
//! Publisher:                          Consumers:
//!   Supervisor ──► Bus ──┬──► subscriber_listener ────► SubscriberSet ──► LogWriter
//!                        └──► tests / embedders (Bus::subscribe)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active subscribers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn publish_without_receivers_is_silent() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ReloadRequested));
    }

    #[test]
    fn receivers_see_events_after_subscribing() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::ReloadRequested));
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ReloadApplied).with_count(3));

        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::ReloadApplied);
        assert_eq!(ev.count, Some(3));
        assert!(rx.try_recv().is_err());
    }
}
