//! Disk metadata index
//!
//! An in-memory mirror of the cache directory, ordered by file modification
//! time so the least-recently-used entry is always at the front. Keeping the
//! mirror current makes capacity enforcement near constant time per write
//! instead of a directory scan.
//!
//! The index is trusted only while "fresh". It goes stale when there is no
//! recorded baseline yet, or when the directory's own modification time has
//! advanced past the baseline by at least one filesystem-timestamp unit,
//! which signals that another instance or process wrote into the directory.
//! Staleness is advisory: directory mtimes on some platforms only change on
//! create/delete, so external in-place rewrites can go unnoticed.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// One known on-disk record
#[derive(Debug, Clone)]
pub(crate) struct MetadataRef {
    /// File name under the cache directory (the digest of the key)
    pub name: String,
    /// Original key, when this engine wrote the record. Records discovered
    /// by a directory rebuild have no key.
    pub key: Option<String>,
    pub modified_at: DateTime<Utc>,
    pub size: u64,
}

pub(crate) struct MetadataIndex {
    /// Refs sorted ascending by modification time; front is the LRU entry
    refs: VecDeque<MetadataRef>,
    total_bytes: u64,
    /// Directory modification time as of our last update, `None` when the
    /// index cannot be trusted and must be rebuilt
    baseline: Option<DateTime<Utc>>,
    granularity_secs: u64,
}

impl MetadataIndex {
    pub(crate) fn new(granularity_secs: u64) -> Self {
        Self {
            refs: VecDeque::new(),
            total_bytes: 0,
            baseline: None,
            granularity_secs,
        }
    }

    /// Whether the index must be rebuilt before it can be trusted
    pub(crate) fn needs_refresh(&self, dir_modified: Option<DateTime<Utc>>) -> bool {
        let baseline = match self.baseline {
            Some(t) => t,
            None => return true,
        };
        match dir_modified {
            Some(dir) => (dir - baseline).num_seconds() >= self.granularity_secs as i64,
            // Can't read the directory timestamp, assume the worst
            None => true,
        }
    }

    /// Replace the whole index with the result of a directory scan
    pub(crate) fn rebuild(&mut self, mut refs: Vec<MetadataRef>, baseline: DateTime<Utc>) {
        refs.sort_by(|a, b| a.modified_at.cmp(&b.modified_at));
        self.total_bytes = refs.iter().map(|r| r.size).sum();
        self.refs = VecDeque::from(refs);
        self.baseline = Some(baseline);
    }

    /// Binary-search insertion keeping the sequence sorted. Entries with an
    /// equal timestamp land after existing ones, so ties evict in insertion
    /// order.
    pub(crate) fn insert(&mut self, entry: MetadataRef) {
        let at = self
            .refs
            .partition_point(|r| r.modified_at <= entry.modified_at);
        self.total_bytes += entry.size;
        self.refs.insert(at, entry);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<MetadataRef> {
        let at = self.refs.iter().position(|r| r.name == name)?;
        let entry = self.refs.remove(at)?;
        self.total_bytes -= entry.size;
        Some(entry)
    }

    pub(crate) fn pop_oldest(&mut self) -> Option<MetadataRef> {
        let entry = self.refs.pop_front()?;
        self.total_bytes -= entry.size;
        Some(entry)
    }

    /// Discard everything and require a rebuild before the next use
    pub(crate) fn clear(&mut self) {
        self.refs.clear();
        self.total_bytes = 0;
        self.baseline = None;
    }

    pub(crate) fn record_update(&mut self, dir_modified: DateTime<Utc>) {
        self.baseline = Some(dir_modified);
    }

    pub(crate) fn over_capacity(&self, max_records: usize, max_bytes: u64) -> bool {
        self.refs.len() > max_records || self.total_bytes > max_bytes
    }

    pub(crate) fn len(&self) -> usize {
        self.refs.len()
    }

    pub(crate) fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}
