use std::collections::{HashMap, VecDeque};

use crate::types::EventRecord;

pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Bounded map from line number to a fetched [`EventRecord`].
///
/// Eviction is by insertion order: reading an entry does not refresh it, so
/// the oldest insert is always the first to go.
#[derive(Debug, Clone)]
pub struct EventCache {
    capacity: usize,
    entries: HashMap<u64, EventRecord>,
    order: VecDeque<u64>,
}

impl Default for EventCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl EventCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, line: u64) -> Option<&EventRecord> {
        self.entries.get(&line)
    }

    pub fn contains(&self, line: u64) -> bool {
        self.entries.contains_key(&line)
    }

    /// Insert a record, evicting the oldest insert when full. Replacing an
    /// existing line keeps its original position in the eviction order.
    pub fn put(&mut self, line: u64, record: EventRecord) {
        if self.capacity == 0 {
            return;
        }
        if let Some(existing) = self.entries.get_mut(&line) {
            *existing = record;
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(line);
        self.entries.insert(line, record);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
