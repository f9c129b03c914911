//! Bounded snippet cache.
//!
//! A mutex-guarded map with eviction of the least-recently-accessed entry
//! once capacity is exceeded. Access time is refreshed on reads.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

struct Entry {
    value: String,
    last_access: Instant,
}

pub struct SnippetCache {
    capacity: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl SnippetCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get_mut(key)?;
        entry.last_access = Instant::now();
        Some(entry.value.clone())
    }

    pub fn put(&self, key: String, value: String) {
        let mut entries = match self.entries.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(
            key,
            Entry {
                value,
                last_access: Instant::now(),
            },
        );
        if entries.len() > self.capacity {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
