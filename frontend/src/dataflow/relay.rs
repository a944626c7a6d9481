//! Fan-out event streaming Relay
//!
//! A Relay delivers every sent value to each live subscriber in the order
//! subscribers registered. Subscribers are plain unbounded channels, so a
//! send never blocks and never re-enters the sender.

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use std::sync::{Arc, Mutex, MutexGuard};

/// Type-safe event streaming relay.
///
/// # Event-Source Naming Convention
///
/// Relays follow the `{source}_{event}_relay` naming pattern:
/// - `view_range_changed_relay` - Viewport controller moved the visible window
/// - `fetch_event_relay` - A fetch coordinator replaced its items or changed status
/// - `lanes_rebuilt_relay` - Lanes were regrouped from the latest item sets
///
/// # Examples
///
/// ```rust
/// use futures::StreamExt;
/// use timeline::dataflow::relay;
///
/// let (view_range_changed_relay, mut stream) = relay::<u32>();
/// view_range_changed_relay.send(7);
/// # futures::executor::block_on(async {
/// assert_eq!(stream.next().await, Some(7));
/// # });
/// ```
#[derive(Debug)]
pub struct Relay<T>
where
    T: Clone + 'static,
{
    subscribers: Arc<Mutex<Vec<UnboundedSender<T>>>>,
}

/// Error type for Relay operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Every subscriber has been dropped
    NoSubscribers,
}

impl<T> Clone for Relay<T>
where
    T: Clone + 'static,
{
    fn clone(&self) -> Self {
        Relay {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for Relay<T>
where
    T: Clone + 'static,
{
    fn default() -> Self {
        Relay {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> Relay<T>
where
    T: Clone + 'static,
{
    /// Create a new Relay together with its first subscription stream.
    pub fn new() -> (Self, UnboundedReceiver<T>) {
        let relay = Relay::default();
        let receiver = relay.subscribe();
        (relay, receiver)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<UnboundedSender<T>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register another subscriber. It only sees values sent afterwards.
    pub fn subscribe(&self) -> UnboundedReceiver<T> {
        let (sender, receiver) = unbounded();
        self.lock().push(sender);
        receiver
    }

    /// Send an event to every live subscriber.
    ///
    /// Values sent while nobody listens are discarded.
    pub fn send(&self, value: T) {
        let _ = self.try_send(value);
    }

    /// Send an event, reporting when no subscriber received it.
    pub fn try_send(&self, value: T) -> Result<(), RelayError> {
        let mut subscribers = self.lock();
        subscribers.retain(|sender| sender.unbounded_send(value.clone()).is_ok());
        if subscribers.is_empty() {
            Err(RelayError::NoSubscribers)
        } else {
            Ok(())
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|sender| !sender.is_closed());
        subscribers.len()
    }
}

/// Convenience function to create a new Relay with its subscription stream.
pub fn relay<T>() -> (Relay<T>, UnboundedReceiver<T>)
where
    T: Clone + 'static,
{
    Relay::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let (numbers_relay, mut first) = relay::<u32>();
        let mut second = numbers_relay.subscribe();

        numbers_relay.send(1);
        numbers_relay.send(2);

        assert_eq!(first.next().await, Some(1));
        assert_eq!(first.next().await, Some(2));
        assert_eq!(second.next().await, Some(1));
        assert_eq!(second.next().await, Some(2));
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_new_events() {
        let (numbers_relay, _first) = relay::<u32>();
        numbers_relay.send(1);
        let mut late = numbers_relay.subscribe();
        numbers_relay.send(2);
        assert_eq!(late.next().await, Some(2));
    }

    #[test]
    fn prunes_dropped_subscribers() {
        let (numbers_relay, first) = relay::<u32>();
        let _second = numbers_relay.subscribe();
        assert_eq!(numbers_relay.subscriber_count(), 2);

        drop(first);
        assert!(numbers_relay.try_send(5).is_ok());
        assert_eq!(numbers_relay.subscriber_count(), 1);
    }

    #[test]
    fn reports_missing_subscribers() {
        let (numbers_relay, receiver) = relay::<u32>();
        drop(receiver);
        assert_eq!(numbers_relay.try_send(1), Err(RelayError::NoSubscribers));
    }
}
