//! In-memory cache layer
//!
//! A thin adapter over a bounded moka cache. The layer has no recency policy
//! of its own beyond what moka applies under its byte budget, and entries may
//! be dropped at any time; callers must tolerate a miss immediately after a
//! put. Oversized values are never admitted so a single large record cannot
//! dominate the memory budget.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use tracing::debug;

/// A value resident in memory, stamped with its admission time
#[derive(Clone)]
pub(crate) struct MemoryEntry<V> {
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub size: u64,
}

#[derive(Clone)]
pub(crate) struct MemoryCache<V> {
    entries: Cache<String, MemoryEntry<V>>,
    max_record_size: u64,
}

impl<V: Clone + Send + Sync + 'static> MemoryCache<V> {
    pub(crate) fn new(max_size_bytes: u64, max_record_size: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_size_bytes)
            .weigher(|_key: &String, entry: &MemoryEntry<V>| {
                entry.size.min(u32::MAX as u64) as u32
            })
            .build();
        Self {
            entries,
            max_record_size,
        }
    }

    pub(crate) async fn get(&self, key: &str) -> Option<MemoryEntry<V>> {
        self.entries.get(key).await
    }

    /// Store a value, unless its encoded size is at or above the admission
    /// gate. An oversized overwrite also drops any smaller value previously
    /// held for the key.
    pub(crate) async fn put(&self, key: &str, value: V, size: u64) {
        if size >= self.max_record_size {
            debug!(key = %key, size, "Value too large for memory cache");
            self.entries.invalidate(key).await;
            return;
        }
        let entry = MemoryEntry {
            value,
            created_at: Utc::now(),
            size,
        };
        self.entries.insert(key.to_string(), entry).await;
    }

    pub(crate) async fn remove(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    pub(crate) fn remove_all(&self) {
        self.entries.invalidate_all();
    }
}
