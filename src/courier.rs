//! Courier facade
//!
//! Owns everything orchestrators share: the transport, the response cache, the state
//! registry and the in-flight request table. Also the entry point for cache
//! manipulation by method.

use crate::cache::{ResponseCache, SledCacheStorage};
use crate::config::{CourierConfig, ValidationError};
use crate::error::CourierError;
use crate::key::KeyGenerator;
use crate::method::Method;
use crate::orchestrator::{OrchestratorServices, RequestOrchestrator, SharedRequests};
use crate::state::{StateAdapter, StatePatch, StateRegistry};
use crate::transport::{ReqwestTransport, Transport};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct Courier {
    transport: Arc<dyn Transport>,
    cache: Arc<ResponseCache>,
    registry: Arc<StateRegistry>,
    shared: Arc<SharedRequests>,
    config: CourierConfig,
}

impl Courier {
    /// Build from a validated configuration. Opens the sled store when
    /// `cache.persistent` is set.
    pub fn new(transport: Arc<dyn Transport>, config: CourierConfig) -> Result<Self, CourierError> {
        config.validate().map_err(validation_failure)?;

        let mut cache = ResponseCache::new()
            .with_default_ttl(Duration::from_millis(config.cache.default_ttl_ms));
        if config.cache.persistent {
            let path = config.cache.resolved_storage_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CourierError::StorageError(e.into()))?;
            }
            let storage = SledCacheStorage::new(&path)?;
            info!(storage_path = %path.display(), "Persistent response cache opened");
            cache = cache.with_storage(Arc::new(storage));
        }

        Ok(Self {
            transport,
            cache: Arc::new(cache),
            registry: Arc::new(StateRegistry::new()),
            shared: Arc::new(SharedRequests::new()),
            config,
        })
    }

    /// Courier over the bundled reqwest transport
    pub fn http(config: CourierConfig) -> Result<Self, CourierError> {
        let transport = ReqwestTransport::new(&config.transport)?;
        Self::new(Arc::new(transport), config)
    }

    /// Replace the response cache (custom clock or storage)
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// New orchestrator for one use site
    pub fn orchestrator<A: StateAdapter>(&self, adapter: Arc<A>) -> RequestOrchestrator<A> {
        RequestOrchestrator::new(
            adapter,
            OrchestratorServices {
                transport: Arc::clone(&self.transport),
                cache: Arc::clone(&self.cache),
                registry: Arc::clone(&self.registry),
                shared: Arc::clone(&self.shared),
                defaults: self.config.requests.clone(),
            },
        )
    }

    pub fn get_cache(&self, method: &Method) -> Option<Value> {
        self.cache.get(&KeyGenerator::key(method))
    }

    /// Store `value` under `method`'s effective policy; a non-caching policy stores nothing
    pub fn set_cache(&self, method: &Method, value: Value) {
        let policy = self.cache.policy_for(method);
        self.cache.set(&KeyGenerator::key(method), value, &policy);
    }

    pub fn invalidate(&self, method: &Method) {
        let key = KeyGenerator::key(method);
        debug!(key = %key, "Invalidating cached response");
        self.cache.remove(&key);
    }

    /// Rewrite the `data` of every live use site bound to `method`, and the cached value
    /// if one exists. Returns false when no use site is bound.
    pub fn update_state<F>(&self, method: &Method, update: F) -> bool
    where
        F: Fn(&Value) -> Value,
    {
        let key = KeyGenerator::key(method);
        let bindings = self.registry.bindings_for(&key);
        if bindings.is_empty() {
            debug!(key = %key, "No bound states to update");
            return false;
        }

        let mut last = None;
        for binding in &bindings {
            let next = update(&(binding.read_data)());
            (binding.write)(StatePatch::new().data(next.clone()));
            last = Some(next);
        }

        if let (Some(next), Some(_)) = (last, self.cache.get(&key)) {
            let policy = self.cache.policy_for(method);
            self.cache.set(&key, next, &policy);
        }
        true
    }

    /// Whether any live use site shows `method`
    pub fn is_bound(&self, method: &Method) -> bool {
        self.registry.is_bound(&KeyGenerator::key(method))
    }

    /// Number of transport calls currently shared between attempts
    pub fn in_flight(&self) -> usize {
        self.shared.len()
    }
}

fn validation_failure(errors: Vec<ValidationError>) -> CourierError {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    CourierError::ConfigError(messages.join("; "))
}
