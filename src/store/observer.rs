//! Observers notified on every stored record

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::error::ObserverError;
use crate::record::Record;

/// Receives every record the store appends or updates
///
/// Implementations must return quickly: they run on the thread that
/// captured the exchange.
pub trait RecordObserver: Send + Sync {
    /// Handle an appended or updated record
    ///
    /// # Errors
    ///
    /// Returning an error unregisters the observer.
    fn on_record(&self, record: &Record) -> Result<(), ObserverError>;
}

impl<F> RecordObserver for F
where
    F: Fn(&Record) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_record(&self, record: &Record) -> Result<(), ObserverError> {
        self(record)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Set of registered observers
///
/// Registration and removal may happen while a notification is running;
/// each notification works on a copy of the handles taken up front.
pub(crate) struct ObserverSet {
    observers: DashMap<ObserverId, Arc<dyn RecordObserver>>,
    next_id: AtomicU64,
}

impl ObserverSet {
    pub(crate) fn new() -> Self {
        Self {
            observers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn insert(&self, observer: Arc<dyn RecordObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.insert(id, observer);
        id
    }

    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    /// Deliver a record to every observer once
    pub(crate) fn notify(&self, record: &Record) {
        let snapshot: Vec<_> = self
            .observers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        for (id, observer) in snapshot {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                observer.on_record(record)
            }))
            .unwrap_or_else(|_| Err(ObserverError::Failed("observer panicked".to_string())));

            if let Err(e) = outcome {
                if e != ObserverError::Disconnected {
                    warn!("Dropping observer {:?}: {}", id, e);
                }
                self.observers.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Headers;
    use std::sync::atomic::AtomicUsize;

    fn record(id: &str) -> Record {
        Record::pending(id, "GET", "http://x", Headers::new(), None, 0)
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn RecordObserver>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let observer = move |_: &Record| -> Result<(), ObserverError> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        (count, Arc::new(observer))
    }

    #[test]
    fn test_notify_reaches_every_observer_once() {
        let set = ObserverSet::new();
        let (a, obs_a) = counter();
        let (b, obs_b) = counter();
        set.insert(obs_a);
        set.insert(obs_b);

        set.notify(&record("1"));

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_observer_is_dropped_alone() {
        let set = ObserverSet::new();
        let (count, healthy) = counter();
        set.insert(healthy);
        set.insert(Arc::new(|_: &Record| -> Result<(), ObserverError> {
            Err(ObserverError::Failed("boom".to_string()))
        }));
        set.insert(Arc::new(|_: &Record| -> Result<(), ObserverError> {
            panic!("observer bug")
        }));

        set.notify(&record("1"));
        assert_eq!(set.len(), 1);

        set.notify(&record("2"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remove() {
        let set = ObserverSet::new();
        let (count, observer) = counter();
        let id = set.insert(observer);

        assert!(set.remove(id));
        assert!(!set.remove(id));

        set.notify(&record("1"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
