//! QueryContextCache: the small ordered set of opaque HTAP optimiser hints
//! exchanged with every query (spec §3.1, Invariant 3.2.5).

use serde::{Deserialize, Serialize};

/// One entry of the cache. `payload` is opaque to the driver; it is only
/// ever round-tripped between the server and subsequent submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContextEntry {
    pub id: u64,
    pub timestamp: i64,
    pub priority: u64,
    pub payload: String,
}

/// Bounded, deduplicated, priority-ordered cache (spec Invariant 3.2.5: at
/// most one entry per id; among entries for the same id the one with the
/// newer timestamp wins, ties broken by lower priority).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryContextCache {
    entries: Vec<QueryContextEntry>,
    max_size: Option<usize>,
}

impl QueryContextCache {
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            entries: Vec::new(),
            max_size,
        }
    }

    /// Merges one entry in, enforcing Invariant 3.2.5. Returns `true` if
    /// the cache contents changed.
    pub fn merge(&mut self, incoming: QueryContextEntry) -> bool {
        if let Some(existing_idx) = self.entries.iter().position(|e| e.id == incoming.id) {
            let existing = &self.entries[existing_idx];
            let replace = match incoming.timestamp.cmp(&existing.timestamp) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Equal => incoming.priority < existing.priority,
                std::cmp::Ordering::Less => false,
            };
            if replace {
                self.entries[existing_idx] = incoming;
                self.sort_and_truncate();
                return true;
            }
            false
        } else {
            self.entries.push(incoming);
            self.sort_and_truncate();
            true
        }
    }

    pub fn merge_all(&mut self, incoming: impl IntoIterator<Item = QueryContextEntry>) {
        for entry in incoming {
            self.merge(entry);
        }
    }

    fn sort_and_truncate(&mut self) {
        self.entries.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(max) = self.max_size {
            self.entries.truncate(max);
        }
    }

    pub fn entries(&self) -> &[QueryContextEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot sent with the next query submit (spec §4.1).
    pub fn snapshot(&self) -> Vec<QueryContextEntry> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, timestamp: i64, priority: u64) -> QueryContextEntry {
        QueryContextEntry {
            id,
            timestamp,
            priority,
            payload: format!("payload-{id}-{timestamp}"),
        }
    }

    #[test]
    fn no_duplicate_ids_after_merge() {
        let mut cache = QueryContextCache::new(None);
        cache.merge(entry(1, 100, 5));
        cache.merge(entry(1, 200, 5));
        cache.merge(entry(2, 50, 1));
        assert_eq!(cache.len(), 2);
        assert!(cache.entries().iter().filter(|e| e.id == 1).count() == 1);
    }

    #[test]
    fn newer_timestamp_wins() {
        let mut cache = QueryContextCache::new(None);
        cache.merge(entry(1, 100, 5));
        cache.merge(entry(1, 50, 1));
        let e = cache.entries().iter().find(|e| e.id == 1).unwrap();
        assert_eq!(e.timestamp, 100);
    }

    #[test]
    fn equal_timestamp_lower_priority_wins() {
        let mut cache = QueryContextCache::new(None);
        cache.merge(entry(1, 100, 5));
        cache.merge(entry(1, 100, 1));
        let e = cache.entries().iter().find(|e| e.id == 1).unwrap();
        assert_eq!(e.priority, 1);
    }

    #[test]
    fn stale_update_is_ignored() {
        let mut cache = QueryContextCache::new(None);
        cache.merge(entry(1, 100, 5));
        let changed = cache.merge(entry(1, 50, 0));
        assert!(!changed);
        assert_eq!(cache.entries()[0].timestamp, 100);
    }

    #[test]
    fn bounded_size_truncates_by_priority() {
        let mut cache = QueryContextCache::new(Some(2));
        cache.merge(entry(1, 100, 3));
        cache.merge(entry(2, 100, 1));
        cache.merge(entry(3, 100, 2));
        assert_eq!(cache.len(), 2);
        let ids: Vec<u64> = cache.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
