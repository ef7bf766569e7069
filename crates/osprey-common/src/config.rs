//! Configuration structures for OspreyDB.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the database engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for data files (relation columns, catalogs, indexes).
    pub data_dir: PathBuf,
    /// Buffer pool size in number of page frames.
    pub buffer_pool_pages: usize,
    /// Enable fsync for durability.
    pub fsync_enabled: bool,
    /// Verify page checksums on read.
    pub verify_checksums: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            buffer_pool_pages: 1024, // 16 MB with 16 KB pages
            fsync_enabled: true,
            verify_checksums: true,
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.buffer_pool_pages * crate::page::PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.buffer_pool_pages, 1024);
        assert!(config.fsync_enabled);
        assert!(config.verify_checksums);
    }

    #[test]
    fn test_buffer_pool_size_bytes() {
        let config = StorageConfig {
            buffer_pool_pages: 4,
            ..Default::default()
        };
        assert_eq!(config.buffer_pool_size_bytes(), 4 * crate::page::PAGE_SIZE);
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = StorageConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: StorageConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.buffer_pool_pages, config.buffer_pool_pages);
        assert_eq!(back.data_dir, config.data_dir);
    }
}
