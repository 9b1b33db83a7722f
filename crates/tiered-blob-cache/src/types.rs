//! Cache configuration and statistics types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the tiered cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory where cached blobs are stored
    pub cache_dir: PathBuf,
    /// Maximum number of records kept on disk
    pub max_disk_records: usize,
    /// Maximum total size of on-disk records in bytes
    pub max_disk_size_bytes: u64,
    /// Records at or above this encoded size are never held in memory
    pub max_memory_record_size_bytes: u64,
    /// Total budget for the in-memory layer in bytes
    pub max_memory_size_bytes: u64,
    /// Age beyond which an entry is considered expired, unless a call
    /// supplies its own limit
    pub default_max_age_secs: u64,
    /// Resolution of filesystem timestamps, used when deciding whether
    /// another writer touched the cache directory
    pub fs_timestamp_granularity_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache/blobs"),
            max_disk_records: 1000,
            max_disk_size_bytes: 1024 * 1024 * 1024, // 1GB
            max_memory_record_size_bytes: 1024 * 1024, // 1MB
            max_memory_size_bytes: 64 * 1024 * 1024, // 64MB
            default_max_age_secs: 24 * 60 * 60,      // 24 hours
            fs_timestamp_granularity_secs: 1,
        }
    }
}

impl CacheConfig {
    /// Preset sized for media payloads: more records, longer retention
    pub fn media() -> Self {
        Self {
            max_disk_records: 10_000,
            max_disk_size_bytes: 4 * 1024 * 1024 * 1024, // 4GB
            max_memory_record_size_bytes: 8 * 1024 * 1024, // 8MB
            max_memory_size_bytes: 256 * 1024 * 1024,    // 256MB
            default_max_age_secs: 7 * 24 * 60 * 60,      // 7 days
            ..Default::default()
        }
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.cache_dir, PathBuf::from("./cache/blobs"));
        assert_eq!(config.max_disk_records, 1000);
        assert_eq!(config.max_disk_size_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.default_max_age_secs, 24 * 60 * 60);
        assert_eq!(config.fs_timestamp_granularity_secs, 1);
    }

    #[test]
    fn test_media_config() {
        let config = CacheConfig::media();
        assert_eq!(config.max_disk_records, 10_000);
        assert_eq!(config.default_max_age_secs, 7 * 24 * 60 * 60);
        // Shares the generic cache directory default
        assert_eq!(config.cache_dir, PathBuf::from("./cache/blobs"));
    }

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_cache_stats_serialization() {
        let stats = CacheStats {
            entries: 3,
            total_size: 4096,
            hits: 10,
            misses: 2,
        };

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("4096"));

        let deserialized: CacheStats = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.entries, 3);
        assert_eq!(deserialized.hits, 10);
    }
}
