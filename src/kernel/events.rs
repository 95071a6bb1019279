//! Terminal notifications
//!
//! Consumers subscribe and receive every event sent after subscribing.
//! Subscribers whose receiver has been dropped are pruned on the next send.

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use std::sync::Mutex;

/// Events delivered to the rendering layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalEvent {
    /// The line buffer changed; carries the buffer revision after the change
    BufferChanged(u64),
    /// The job queue drained and new input may be accepted
    Idle,
}

/// Fan-out of events to any number of subscribers
pub struct Notifier<T> {
    subscribers: Mutex<Vec<UnboundedSender<T>>>,
}

impl<T: Clone> Notifier<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded();
        super::lock(&self.subscribers).push(tx);
        rx
    }

    /// Send an event to all live subscribers
    pub fn notify(&self, event: T) {
        super::lock(&self.subscribers).retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}

impl<T: Clone> Default for Notifier<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_receive_events() {
        let notifier = Notifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        notifier.notify(TerminalEvent::BufferChanged(1));
        notifier.notify(TerminalEvent::Idle);

        assert_eq!(a.try_next().unwrap(), Some(TerminalEvent::BufferChanged(1)));
        assert_eq!(a.try_next().unwrap(), Some(TerminalEvent::Idle));
        assert_eq!(b.try_next().unwrap(), Some(TerminalEvent::BufferChanged(1)));
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let notifier = Notifier::new();
        notifier.notify(TerminalEvent::Idle);
        let mut rx = notifier.subscribe();
        assert!(rx.try_next().is_err());
    }

    #[test]
    fn test_dropped_subscribers_pruned() {
        let notifier = Notifier::new();
        let rx = notifier.subscribe();
        let mut keep = notifier.subscribe();

        drop(rx);
        notifier.notify(TerminalEvent::Idle);
        notifier.notify(TerminalEvent::BufferChanged(1));
        assert_eq!(crate::kernel::lock(&notifier.subscribers).len(), 1);
        assert_eq!(keep.try_next().unwrap(), Some(TerminalEvent::Idle));
        assert_eq!(keep.try_next().unwrap(), Some(TerminalEvent::BufferChanged(1)));
    }
}
