//! Persistence layer for the response cache

use crate::cache::ResponseCacheEntry;
use crate::error::StorageError;
use std::path::Path;

const TREE_RESPONSES: &str = "courier_responses";

/// Durable backend for cache entries stored in persistent mode
pub trait CacheStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<ResponseCacheEntry>, StorageError>;

    fn set(&self, entry: &ResponseCacheEntry) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Sled-based implementation of CacheStorage
pub struct SledCacheStorage {
    db: sled::Db,
    responses: sled::Tree,
}

impl SledCacheStorage {
    /// Open (or create) a cache database at the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Use an already opened database; entries live in their own tree
    pub fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let responses = db.open_tree(TREE_RESPONSES)?;
        Ok(Self { db, responses })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl CacheStorage for SledCacheStorage {
    fn get(&self, key: &str) -> Result<Option<ResponseCacheEntry>, StorageError> {
        let Some(raw) = self.responses.get(key.as_bytes())? else {
            return Ok(None);
        };
        let entry = serde_json::from_slice(&raw).map_err(|e| StorageError::InvalidEntry {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(entry))
    }

    fn set(&self, entry: &ResponseCacheEntry) -> Result<(), StorageError> {
        let value = serde_json::to_vec(entry).map_err(|e| StorageError::InvalidEntry {
            key: entry.key.clone(),
            message: e.to_string(),
        })?;
        self.responses.insert(entry.key.as_bytes(), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.responses.remove(key.as_bytes())?;
        Ok(())
    }
}
