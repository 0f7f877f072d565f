//! SubscriberRegistry - name-keyed, insertion-ordered subscriber table

use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::Subscriber;

/// Thread-safe subscriber table
///
/// Entries keep their registration order. Re-registering a name replaces
/// the entry in place, so its position is kept.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    entries: Mutex<Vec<Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        // Callbacks never run under this lock, a poisoned guard still holds
        // a consistent table.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a subscriber
    ///
    /// Returns true if an existing entry was replaced.
    pub fn insert(&self, subscriber: Subscriber) -> bool {
        let mut entries = self.entries();
        match entries.iter_mut().find(|e| e.name == subscriber.name) {
            Some(existing) => {
                *existing = subscriber;
                true
            }
            None => {
                entries.push(subscriber);
                false
            }
        }
    }

    /// Remove a subscriber by name
    ///
    /// Returns true if an entry was removed; unknown names are ignored.
    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| e.name != name);
        entries.len() != before
    }

    /// Copy of the current entries in registration order
    pub fn snapshot(&self) -> Vec<Subscriber> {
        self.entries().clone()
    }

    /// Remove every entry, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries().iter().any(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries().iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
