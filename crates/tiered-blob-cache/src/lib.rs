//! Two-tier blob cache with disk persistence, TTL expiration and LRU eviction
//!
//! Values live in a bounded in-memory layer for fast hits and are persisted
//! to a flat directory of digest-named files. An in-memory metadata index
//! mirrors the directory ordered by recency, so enforcing the record-count
//! and byte-size capacity bounds stays near constant time per write. A
//! single worker task serializes all disk mutations while reads proceed
//! concurrently, and the engine resynchronizes itself when another process
//! writes into a shared cache directory.

mod cache;
mod codec;
mod digest;
mod disk;
mod error;
mod index;
mod memory;
mod types;

pub use cache::TieredCache;
pub use codec::{BytesCodec, Codec, JsonCodec, StringCodec};
pub use digest::{KeyDigest, Sha256KeyDigest};
pub use error::{CacheError, Result};
pub use types::{CacheConfig, CacheStats};

/// Cache for UTF-8 string payloads
pub type StringCache = TieredCache<StringCodec>;

/// Cache for raw binary payloads
pub type BytesCache = TieredCache<BytesCodec>;
