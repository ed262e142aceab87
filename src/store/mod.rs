//! Bounded in-memory store of captured records

mod observer;

pub use observer::{ObserverId, RecordObserver};

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::DEFAULT_MAX_REQUESTS;
use crate::record::Record;

use observer::ObserverSet;

struct Entry {
    /// Insertion sequence; the eviction and tie-break order
    seq: u64,
    record: Record,
}

#[derive(Default)]
struct Inner {
    /// Oldest insertion at the front
    entries: VecDeque<Entry>,
    next_seq: u64,
}

impl Inner {
    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.record.id == id)
    }

    fn push(&mut self, record: Record, max_requests: usize) -> usize {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(Entry { seq, record });

        let mut evicted = 0;
        while self.entries.len() > max_requests {
            self.entries.pop_front();
            evicted += 1;
        }
        evicted
    }
}

/// Thread-safe store holding the most recent `max_requests` records
///
/// Every operation takes a single short lock on the record list, so
/// appends, updates, clears and listings are linearizable. Observers are
/// notified after the lock is released.
pub struct RecordStore {
    inner: Mutex<Inner>,
    observers: ObserverSet,
    max_requests: usize,
}

impl RecordStore {
    /// Create a store that keeps at most `max_requests` records
    ///
    /// # Panics
    ///
    /// Panics if `max_requests` is 0
    #[must_use]
    pub fn new(max_requests: usize) -> Self {
        assert!(max_requests > 0, "max_requests must be > 0");

        Self {
            inner: Mutex::new(Inner::default()),
            observers: ObserverSet::new(),
            max_requests,
        }
    }

    /// Insert a new record, evicting the oldest insertions past capacity
    ///
    /// A record whose id is already stored replaces the old one and counts
    /// as a fresh insertion.
    pub fn append(&self, record: Record) {
        let evicted = {
            let mut inner = self.inner.lock();
            if let Some(index) = inner.position(&record.id) {
                inner.entries.remove(index);
            }
            inner.push(record.clone(), self.max_requests)
        };

        if evicted > 0 {
            debug!("Evicted {} record(s) at capacity {}", evicted, self.max_requests);
        }

        self.observers.notify(&record);
    }

    /// Replace the record with the same id, keeping its insertion slot
    ///
    /// Inserts the record if it is no longer stored (for instance after
    /// eviction).
    pub fn update(&self, record: Record) {
        {
            let mut inner = self.inner.lock();
            match inner.position(&record.id) {
                Some(index) => inner.entries[index].record = record.clone(),
                None => {
                    debug!("Record {} not stored, inserting on update", record.id);
                    inner.push(record.clone(), self.max_requests);
                }
            }
        }

        self.observers.notify(&record);
    }

    /// Snapshot of all records, newest first
    ///
    /// Sorted by `created_at` descending; equal timestamps put the later
    /// insertion first.
    #[must_use]
    pub fn list(&self) -> Vec<Record> {
        let mut entries: Vec<(u64, Record)> = {
            let inner = self.inner.lock();
            inner
                .entries
                .iter()
                .map(|entry| (entry.seq, entry.record.clone()))
                .collect()
        };

        entries.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });

        entries.into_iter().map(|(_, record)| record).collect()
    }

    /// Look up a record by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Record> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .find(|entry| entry.record.id == id)
            .map(|entry| entry.record.clone())
    }

    /// Remove every record
    ///
    /// Observers are not notified.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Register an observer for appends and updates
    pub fn subscribe(&self, observer: Arc<dyn RecordObserver>) -> ObserverId {
        let id = self.observers.insert(observer);
        debug!("Observer {:?} subscribed", id);
        id
    }

    /// Remove an observer; returns whether it was still registered
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.observers.remove(id);
        if removed {
            debug!("Observer {:?} unsubscribed", id);
        }
        removed
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Maximum number of records kept
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max_requests
    }

    /// Number of registered observers
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS)
    }
}
