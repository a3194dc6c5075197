//! Append-only event log shared between recorders and summary readers

use std::sync::{PoisonError, RwLock};

use crate::types::Event;

/// Ordered, append-only sequence of events for one source.
///
/// Appends take the write lock, snapshots the read lock. A poisoned lock
/// is recovered: the vector is only ever pushed to, so it stays consistent.
#[derive(Debug, Default)]
pub struct EventLog {
    events: RwLock<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event at the end of the log
    pub fn append(&self, event: Event) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Append `event` if `accept` returns true. `accept` runs under the
    /// write lock. Returns whether the event was appended.
    pub fn append_if(&self, event: Event, accept: impl FnOnce() -> bool) -> bool {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if !accept() {
            return false;
        }
        events.push(event);
        true
    }

    /// Run `f` with appends blocked
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Copy of the log as it is right now
    pub fn snapshot(&self) -> Vec<Event> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, Payload};

    fn event(kind: EventKind, timestamp: f64) -> Event {
        Event {
            kind,
            timestamp,
            payload: Payload::new(),
        }
    }

    #[test]
    fn test_append_keeps_arrival_order() {
        let log = EventLog::new();
        assert!(log.is_empty());

        // Out-of-order timestamps stay in arrival order
        log.append(event(EventKind::AuctionInit, 5.0));
        log.append(event(EventKind::BidResponse, 3.0));
        log.append(event(EventKind::AuctionEnd, 9.0));

        let kinds: Vec<_> = log.snapshot().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::AuctionInit, EventKind::BidResponse, EventKind::AuctionEnd]
        );
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let log = EventLog::new();
        log.append(event(EventKind::BidWon, 1.0));
        let snapshot = log.snapshot();
        log.append(event(EventKind::BidWon, 2.0));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_append_if() {
        let log = EventLog::new();
        assert!(log.append_if(event(EventKind::BidWon, 1.0), || true));
        assert!(!log.append_if(event(EventKind::BidWon, 2.0), || false));
        assert_eq!(log.len(), 1);
        assert_eq!(log.exclusive(|| 7), 7);
    }

    #[test]
    fn test_concurrent_appends() {
        let log = std::sync::Arc::new(EventLog::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for n in 0..250 {
                        log.append(event(EventKind::BidResponse, (i * 1000 + n) as f64));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 1000);
    }
}
