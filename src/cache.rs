//! Response Cache
//!
//! Keyed store of resolved response values with lazy expiry. Memory entries are always
//! kept; entries cached in persistent mode are also written through to a [`CacheStorage`]
//! backend and hydrated back into memory on a miss.

use crate::method::{CacheMode, CachePolicy, Expiry, Method, RequestKind};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

pub mod persistence;

pub use persistence::{CacheStorage, SledCacheStorage};

/// Default TTL applied to GET requests without an explicit policy
pub const DEFAULT_GET_TTL_MS: u64 = 300_000;

/// Source of wall-clock milliseconds used for expiry
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Manually advanced clock for deterministic expiry tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<u64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Mutex::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by_ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let mut now = self.now.lock();
        *now = now.saturating_add(by_ms);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        *self.now.lock()
    }
}

/// One cached response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseCacheEntry {
    pub key: String,
    pub value: Value,
    /// Epoch milliseconds; `None` never expires
    pub expires_at: Option<u64>,
    pub mode: CacheMode,
}

impl ResponseCacheEntry {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at, Some(at) if now_ms >= at)
    }
}

/// Shared response cache
pub struct ResponseCache {
    entries: RwLock<HashMap<String, ResponseCacheEntry>>,
    storage: Option<Arc<dyn CacheStorage>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    /// Memory-only cache on the wall clock
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            storage: None,
            clock: Arc::new(SystemClock),
            default_ttl: Duration::from_millis(DEFAULT_GET_TTL_MS),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// TTL used for GET methods that carry no policy; zero disables the default.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Effective policy: the method's own, else GET requests get the default TTL in memory.
    pub fn policy_for(&self, method: &Method) -> CachePolicy {
        match method.cache_policy() {
            Some(policy) => policy,
            None if method.kind() == RequestKind::Get => CachePolicy::ttl(self.default_ttl),
            None => CachePolicy::disabled(),
        }
    }

    /// Look up a value; expired entries are evicted as a side effect.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_millis();

        let cached = self.entries.read().get(key).cloned();
        let entry = match cached {
            Some(entry) => entry,
            None => self.hydrate(key)?,
        };

        if !entry.is_expired(now) {
            return Some(entry.value);
        }
        self.evict_expired(key, now)
    }

    /// Re-check under the write lock so a `set` that landed since the read survives.
    fn evict_expired(&self, key: &str, now: u64) -> Option<Value> {
        let mut entries = self.entries.write();
        if let Some(current) = entries.get(key) {
            if !current.is_expired(now) {
                return Some(current.value.clone());
            }
        }

        trace!(key = %key, "Evicting expired cache entry");
        entries.remove(key);
        self.remove_persisted(key);
        None
    }

    /// Store a value under `policy`. Disabled policies store nothing.
    pub fn set(&self, key: &str, value: Value, policy: &CachePolicy) {
        if !policy.is_enabled() {
            return;
        }

        let expires_at = match policy.expire {
            Expiry::After(ttl) => {
                let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
                Some(self.clock.now_millis().saturating_add(ttl_ms))
            }
            Expiry::Never => None,
            Expiry::Disabled => return,
        };

        let entry = ResponseCacheEntry {
            key: key.to_string(),
            value,
            expires_at,
            mode: policy.mode,
        };

        // Storage and memory are written under one lock so eviction cannot split them
        let mut entries = self.entries.write();
        if entry.mode == CacheMode::Persistent {
            match &self.storage {
                Some(storage) => {
                    if let Err(e) = storage.set(&entry) {
                        warn!(key = %key, error = %e, "Failed to persist cache entry");
                    }
                }
                None => debug!(key = %key, "Persistent cache requested without storage, keeping in memory"),
            }
        }

        entries.insert(key.to_string(), entry);
    }

    /// Explicit invalidation
    pub fn remove(&self, key: &str) {
        let mut entries = self.entries.write();
        entries.remove(key);
        self.remove_persisted(key);
    }

    fn remove_persisted(&self, key: &str) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.remove(key) {
                warn!(key = %key, error = %e, "Failed to remove persisted cache entry");
            }
        }
    }

    /// Drop every memory entry (persisted entries stay in storage)
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of entries currently held in memory
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn hydrate(&self, key: &str) -> Option<ResponseCacheEntry> {
        let storage = self.storage.as_ref()?;
        match storage.get(key) {
            Ok(Some(entry)) => {
                trace!(key = %key, "Hydrated cache entry from storage");
                // A concurrent set may have filled memory while storage was read
                let mut entries = self.entries.write();
                Some(entries.entry(key.to_string()).or_insert(entry).clone())
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read persisted cache entry");
                None
            }
        }
    }
}
