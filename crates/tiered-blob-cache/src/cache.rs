//! Tiered cache engine
//!
//! Combines the in-memory layer with file-based storage. Reads check memory
//! first and fall through to disk; every disk mutation (write, touch, remove,
//! rebalance) is funneled through a single worker task in FIFO order, while
//! disk reads proceed concurrently under the read half of a `RwLock`. The
//! worker keeps the metadata index current and enforces the record-count and
//! byte-size capacity bounds after each write.
//!
//! Cache failures never surface to callers: I/O errors degrade to a miss on
//! reads and to a logged no-op on writes and removals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::digest::{KeyDigest, Sha256KeyDigest};
use crate::disk::DiskStore;
use crate::error::Result;
use crate::index::{MetadataIndex, MetadataRef};
use crate::memory::MemoryCache;
use crate::types::{CacheConfig, CacheStats};

/// A queued disk mutation, executed by the worker task
enum Job {
    Write {
        key: String,
        name: String,
        bytes: Vec<u8>,
        done: Option<oneshot::Sender<()>>,
    },
    Touch {
        name: String,
    },
    Remove {
        name: String,
    },
    RemoveAll,
    Drain(oneshot::Sender<()>),
}

/// Disk-side state shared between the worker and fallback reads
struct DiskState {
    disk: DiskStore,
    index: MetadataIndex,
}

impl DiskState {
    /// Rebuild the metadata index from a directory scan when it can no
    /// longer be trusted: first write after startup, or another writer
    /// advanced the directory's modification time past our baseline.
    async fn refresh_if_stale(&mut self) {
        let dir_modified = self.disk.dir_modified().await;
        if !self.index.needs_refresh(dir_modified) {
            return;
        }
        match self.disk.scan().await {
            Ok(refs) => {
                let count = refs.len();
                self.index
                    .rebuild(refs, dir_modified.unwrap_or_else(Utc::now));
                debug!(entries = count, "Rebuilt cache metadata index");
            }
            Err(e) => {
                warn!(error = %e, "Failed to scan cache directory");
                self.index.rebuild(Vec::new(), Utc::now());
            }
        }
    }

    /// Re-read the directory timestamp after one of our own mutations so it
    /// is not mistaken for external interference
    async fn record_update(&mut self) {
        let t = self.disk.dir_modified().await.unwrap_or_else(Utc::now);
        self.index.record_update(t);
    }
}

/// Two-tier cache: in-memory layer in front of digest-named files on disk.
///
/// Generic over the [`Codec`] that turns values into stored bytes, so string
/// and binary payloads share one engine.
pub struct TieredCache<C: Codec> {
    codec: C,
    digest: Arc<dyn KeyDigest>,
    config: CacheConfig,
    memory: MemoryCache<C::Value>,
    state: Arc<RwLock<DiskState>>,
    jobs: mpsc::UnboundedSender<Job>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<C: Codec> TieredCache<C> {
    /// Create a cache with the default SHA-256 key digest.
    ///
    /// Spawns the disk worker task, so this must be called from within a
    /// Tokio runtime.
    pub fn new(config: CacheConfig, codec: C) -> Self {
        Self::with_digest(config, codec, Sha256KeyDigest)
    }

    pub fn with_digest(config: CacheConfig, codec: C, digest: impl KeyDigest + 'static) -> Self {
        let memory = MemoryCache::new(
            config.max_memory_size_bytes,
            config.max_memory_record_size_bytes,
        );
        let state = Arc::new(RwLock::new(DiskState {
            disk: DiskStore::new(config.cache_dir.clone()),
            index: MetadataIndex::new(config.fs_timestamp_granularity_secs),
        }));
        let (jobs, job_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_worker(
            state.clone(),
            memory.clone(),
            job_rx,
            config.max_disk_records,
            config.max_disk_size_bytes,
        ));

        Self {
            codec,
            digest: Arc::new(digest),
            config,
            memory,
            state,
            jobs,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Ensure the cache directory exists
    pub async fn init(&self) -> Result<()> {
        let st = self.state.read().await;
        st.disk.init().await?;
        info!(cache_dir = ?self.config.cache_dir, "Cache initialized");
        Ok(())
    }

    /// Look up a value using the configured default max age
    pub async fn get(&self, key: &str) -> Option<C::Value> {
        self.get_with_max_age(key, self.config.default_max_age_secs)
            .await
    }

    /// Look up a value no older than `max_age_secs` (`u64::MAX` for no
    /// limit). A hit schedules an asynchronous recency touch of the disk
    /// record; an aged entry is evicted from both layers and reported as a
    /// miss.
    pub async fn get_with_max_age(&self, key: &str, max_age_secs: u64) -> Option<C::Value> {
        let name = self.digest.digest(key);

        if let Some(entry) = self.memory.get(key).await {
            let age_secs = age_secs_since(entry.created_at);
            if age_secs <= max_age_secs {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Memory cache hit");
                self.enqueue(Job::Touch { name });
                return Some(entry.value);
            }
            debug!(key = %key, age_secs, max_age_secs, "Memory entry expired");
            self.memory.remove(key).await;
            self.enqueue(Job::Remove { name });
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        // Fall through to disk under the read half of the serializer
        let bytes = {
            let st = self.state.read().await;
            let modified = match st.disk.modified(&name).await {
                Some(t) => t,
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            };

            let age_secs = age_secs_since(modified);
            if age_secs > max_age_secs {
                drop(st);
                debug!(key = %key, age_secs, max_age_secs, "Disk entry expired");
                self.enqueue(Job::Remove { name });
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }

            match st.disk.read(&name).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read cached file");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        };

        let value = match self.codec.decode(&bytes) {
            Some(value) => value,
            None => {
                debug!(key = %key, "Failed to decode cached bytes");
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Disk cache hit");
        self.memory.put(key, value.clone(), bytes.len() as u64).await;
        self.enqueue(Job::Touch { name });
        Some(value)
    }

    /// Store a value: the memory layer is updated synchronously, the disk
    /// write (and the rebalance it triggers) is queued. Returns before the
    /// write is durable.
    pub async fn set(&self, key: &str, value: C::Value) {
        self.enqueue_set(key, value, None).await;
    }

    /// Like [`set`](Self::set), but returns a receiver resolved once the
    /// disk write and its rebalance have settled
    pub async fn set_with_completion(&self, key: &str, value: C::Value) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.enqueue_set(key, value, Some(tx)).await;
        rx
    }

    async fn enqueue_set(&self, key: &str, value: C::Value, done: Option<oneshot::Sender<()>>) {
        let bytes = self.codec.encode(&value);
        self.memory.put(key, value, bytes.len() as u64).await;
        self.enqueue(Job::Write {
            key: key.to_string(),
            name: self.digest.digest(key),
            bytes,
            done,
        });
    }

    /// Remove a single entry: memory synchronously, disk via the queue
    pub async fn remove(&self, key: &str) {
        self.memory.remove(key).await;
        self.enqueue(Job::Remove {
            name: self.digest.digest(key),
        });
    }

    /// Remove every entry. The metadata index is discarded, so the next
    /// write rebuilds it from the (then empty) directory.
    pub async fn remove_all(&self) {
        self.memory.remove_all();
        self.enqueue(Job::RemoveAll);
    }

    /// Existence check using the configured default max age
    pub async fn has_value(&self, key: &str) -> bool {
        self.has_value_with_max_age(key, self.config.default_max_age_secs)
            .await
    }

    /// Existence check without reading, decoding or touching content. Aged
    /// entries are still evicted, like the front half of a `get`.
    pub async fn has_value_with_max_age(&self, key: &str, max_age_secs: u64) -> bool {
        let name = self.digest.digest(key);

        if let Some(entry) = self.memory.get(key).await {
            if age_secs_since(entry.created_at) <= max_age_secs {
                return true;
            }
            self.memory.remove(key).await;
            self.enqueue(Job::Remove { name });
            return false;
        }

        let modified = {
            let st = self.state.read().await;
            st.disk.modified(&name).await
        };
        match modified {
            Some(modified) if age_secs_since(modified) <= max_age_secs => true,
            Some(_) => {
                self.enqueue(Job::Remove { name });
                false
            }
            None => false,
        }
    }

    /// Block until all currently queued disk work has completed. Intended
    /// for tests and graceful shutdown, not steady-state use.
    pub async fn drain(&self) {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Job::Drain(tx));
        let _ = rx.await;
    }

    /// Current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let st = self.state.read().await;
        CacheStats {
            entries: st.index.len(),
            total_size: st.index.total_bytes(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn enqueue(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            warn!("Cache worker is gone, dropping disk operation");
        }
    }
}

fn age_secs_since(t: DateTime<Utc>) -> u64 {
    (Utc::now() - t).num_seconds().max(0) as u64
}

/// Executes queued disk mutations in FIFO order. Each mutation takes the
/// write half of the serializer, so fallback reads see either the state
/// before a mutation or after it, never the middle.
async fn run_worker<V: Clone + Send + Sync + 'static>(
    state: Arc<RwLock<DiskState>>,
    memory: MemoryCache<V>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    max_records: usize,
    max_bytes: u64,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Write {
                key,
                name,
                bytes,
                done,
            } => {
                let mut st = state.write().await;
                st.refresh_if_stale().await;
                match st.disk.write(&name, &bytes).await {
                    Ok((modified_at, size)) => {
                        // Overwrites replace the previous ref in place
                        st.index.remove(&name);
                        st.index.insert(MetadataRef {
                            name,
                            key: Some(key),
                            modified_at,
                            size,
                        });
                        rebalance(&mut st, &memory, max_records, max_bytes).await;
                    }
                    Err(e) => warn!(key = %key, error = %e, "Disk write failed"),
                }
                st.record_update().await;
                if let Some(tx) = done {
                    let _ = tx.send(());
                }
            }
            Job::Touch { name } => {
                let mut st = state.write().await;
                match st.disk.touch(&name) {
                    Ok(()) => {
                        if let Some(mut entry) = st.index.remove(&name) {
                            entry.modified_at =
                                st.disk.modified(&name).await.unwrap_or_else(Utc::now);
                            st.index.insert(entry);
                        }
                    }
                    // The disk copy may be gone while a memory copy lingers
                    Err(e) => debug!(name = %name, error = %e, "Touch skipped"),
                }
            }
            Job::Remove { name } => {
                let mut st = state.write().await;
                if let Err(e) = st.disk.remove(&name).await {
                    warn!(name = %name, error = %e, "Failed to remove cached file");
                }
                st.index.remove(&name);
                st.record_update().await;
            }
            Job::RemoveAll => {
                let mut st = state.write().await;
                if let Err(e) = st.disk.remove_all().await {
                    warn!(error = %e, "Failed to clear cache directory");
                }
                st.index.clear();
            }
            Job::Drain(tx) => {
                let _ = tx.send(());
            }
        }
    }
}

/// Evict oldest entries until the record-count and byte-size bounds hold
/// again. A single remaining entry is retained even when oversized, so one
/// huge record cannot empty the cache in a loop. Failed deletions are logged
/// and the ref is dropped anyway to keep the index close to disk reality.
async fn rebalance<V: Clone + Send + Sync + 'static>(
    st: &mut DiskState,
    memory: &MemoryCache<V>,
    max_records: usize,
    max_bytes: u64,
) {
    while st.index.len() > 1 && st.index.over_capacity(max_records, max_bytes) {
        let evicted = match st.index.pop_oldest() {
            Some(entry) => entry,
            None => break,
        };
        if let Err(e) = st.disk.remove(&evicted.name).await {
            warn!(name = %evicted.name, error = %e, "Failed to delete evicted cache file");
        }
        // Keep the layers consistent: a record evicted from disk should not
        // keep serving from memory. Records discovered by rebuild carry no
        // key and have no memory copy to drop.
        if let Some(key) = &evicted.key {
            memory.remove(key).await;
        }
        debug!(name = %evicted.name, size = evicted.size, "Evicted oldest cache entry");
    }
}
