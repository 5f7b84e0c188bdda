//! Subscriber registry: subscriber id -> delivery sink.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::client::SubscriptionMessage;
use crate::error::{NetworkError, Result};

/// Identifier of one subscription on a connection.
///
/// Issued in increasing order by the owning client and never reused.
/// On the wire it travels as its decimal string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Wrap a raw identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Parse a wire id. Ids this client never issues (non-numeric) yield `None`.
    pub fn parse(wire: &str) -> Option<Self> {
        wire.parse().ok().map(Self)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Write side of a subscriber's output sequence.
///
/// Dropping the last sender ends the sequence.
pub(crate) type SubscriberSink = mpsc::Sender<SubscriptionMessage>;

struct RegistryState {
    sinks: HashMap<SubscriberId, SubscriberSink>,
    closed: bool,
}

/// Concurrency-safe table of live subscribers.
///
/// Shared by the dispatch loop and the subscription management calls.
/// The lock is never held across an `.await`: lookups hand out a clone of
/// the sink.
pub(crate) struct SubscriberRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                sinks: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Register a sink. Fails once the registry has been bulk-closed, so a
    /// subscription racing with shutdown can never be left open.
    pub fn insert(&self, id: SubscriberId, sink: SubscriberSink) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(NetworkError::Closed);
        }
        state.sinks.insert(id, sink);
        Ok(())
    }

    pub fn get(&self, id: SubscriberId) -> Option<SubscriberSink> {
        self.state.lock().sinks.get(&id).cloned()
    }

    /// Remove a subscriber, returning its sink. Only the first caller for a
    /// given id gets `Some`.
    pub fn remove(&self, id: SubscriberId) -> Option<SubscriberSink> {
        self.state.lock().sinks.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().sinks.len()
    }

    /// Close every sink and refuse further inserts. Returns how many
    /// subscribers were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.sinks.drain().collect()
        };
        // Senders drop outside the lock.
        drained.len()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sink() -> (SubscriberSink, mpsc::Receiver<SubscriptionMessage>) {
        mpsc::channel(4)
    }

    #[test]
    fn test_subscriber_id_wire_form() {
        let id = SubscriberId::from_raw(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(SubscriberId::parse("42"), Some(id));
        assert_eq!(SubscriberId::parse("x42"), None);
        assert_eq!(SubscriberId::parse("-1"), None);
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = SubscriberRegistry::new();
        let (tx, _rx) = sink();
        let id = SubscriberId::from_raw(0);

        registry.insert(id, tx).unwrap();
        assert!(registry.get(id).is_some());
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.get(id).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_remove_closes_sequence() {
        let registry = SubscriberRegistry::new();
        let (tx, mut rx) = sink();
        let id = SubscriberId::from_raw(1);
        registry.insert(id, tx).unwrap();

        drop(registry.remove(id));
        assert!(rx.try_recv().is_err());
        assert!(rx.is_closed());
    }

    #[test]
    fn test_close_all_refuses_inserts() {
        let registry = SubscriberRegistry::new();
        let (tx_a, rx_a) = sink();
        let (tx_b, rx_b) = sink();
        registry.insert(SubscriberId::from_raw(0), tx_a).unwrap();
        registry.insert(SubscriberId::from_raw(1), tx_b).unwrap();

        assert_eq!(registry.close_all(), 2);
        assert!(rx_a.is_closed());
        assert!(rx_b.is_closed());

        let (tx_c, _rx_c) = sink();
        let result = registry.insert(SubscriberId::from_raw(2), tx_c);
        assert!(matches!(result, Err(NetworkError::Closed)));
        assert_eq!(registry.close_all(), 0);
    }

    #[test]
    fn test_concurrent_inserts_and_removes() {
        let registry = Arc::new(SubscriberRegistry::new());
        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..100u64 {
                        let id = SubscriberId::from_raw(worker * 1000 + i);
                        let (tx, _rx) = mpsc::channel(1);
                        registry.insert(id, tx).unwrap();
                        if i % 2 == 0 {
                            assert!(registry.remove(id).is_some());
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 8 * 50);
    }
}
