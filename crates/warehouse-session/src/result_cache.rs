//! Per-connection result cache: descriptors for recently completed
//! queries are kept around for a bounded TTL so a caller that asks for
//! the same query id twice (pagination, retry after a dropped response)
//! doesn't re-poll the server (supplemental feature; see DESIGN.md for
//! what this is and isn't grounded on).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use warehouse_core::domain::ResultDescriptor;

const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

struct Entry {
    descriptor: ResultDescriptor,
    inserted_at: Instant,
    refcount: Arc<()>,
}

/// Keyed by the connection's `Config::cache_id()` plus query id, so
/// multiple connections sharing a process never collide.
pub struct ResultCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn key(cache_id: &str, query_id: &str) -> String {
        format!("{cache_id}:{query_id}")
    }

    pub fn insert(&self, cache_id: &str, descriptor: ResultDescriptor) {
        let query_id = descriptor.query_id.as_str().to_string();
        self.entries.insert(
            Self::key(cache_id, &query_id),
            Entry {
                descriptor,
                inserted_at: Instant::now(),
                refcount: Arc::new(()),
            },
        );
    }

    /// Returns a clone of the cached descriptor if present and not past
    /// its TTL; expired entries are evicted on access rather than by a
    /// background sweep.
    pub fn get(&self, cache_id: &str, query_id: &str) -> Option<ResultDescriptor> {
        let key = Self::key(cache_id, query_id);
        let expired = match self.entries.get(&key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(&key);
            return None;
        }
        self.entries.get(&key).map(|e| e.descriptor.clone())
    }

    /// Drops every entry for `cache_id` whose only remaining reference
    /// is the cache's own (no in-flight cursor still holds one), used
    /// when a connection closes.
    pub fn evict_unreferenced(&self, cache_id: &str) {
        self.entries
            .retain(|key, entry| !key.starts_with(cache_id) || Arc::strong_count(&entry.refcount) > 1);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warehouse_core::domain::{QueryId, ResultFormat};

    fn descriptor(id: &str) -> ResultDescriptor {
        ResultDescriptor {
            query_id: QueryId::new(id).unwrap(),
            columns: vec![],
            inline_rows: vec![],
            chunks: vec![],
            format: ResultFormat::JsonRowSet,
            qrmk: None,
            total_row_count: 0,
            sql_state: None,
            statement_handles: vec![],
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.insert("conn1", descriptor("q1"));
        assert!(cache.get("conn1", "q1").is_some());
        assert!(cache.get("conn1", "q2").is_none());
    }

    #[test]
    fn expired_entry_is_evicted_on_access() {
        let cache = ResultCache::new(Duration::from_millis(0));
        cache.insert("conn1", descriptor("q1"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("conn1", "q1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn evict_unreferenced_drops_only_matching_connection() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.insert("conn1", descriptor("q1"));
        cache.insert("conn2", descriptor("q1"));
        cache.evict_unreferenced("conn1");
        assert!(cache.get("conn1", "q1").is_none());
        assert!(cache.get("conn2", "q1").is_some());
    }
}
