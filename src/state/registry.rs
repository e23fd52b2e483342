//! Live front states indexed by method key
//!
//! Orchestrators bind their active front states here while mounted so that
//! `Courier::update_state` can reach every use site showing a given request.

use crate::state::StatePatch;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Read/write access to one use site's states
#[derive(Clone)]
pub struct StateBinding {
    pub read_data: Arc<dyn Fn() -> Value + Send + Sync>,
    pub write: Arc<dyn Fn(StatePatch) + Send + Sync>,
}

/// method key -> hook id -> binding
#[derive(Default)]
pub struct StateRegistry {
    bindings: RwLock<HashMap<String, HashMap<u64, StateBinding>>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a hook's states to `key`, replacing any previous binding of that hook
    pub fn register(&self, key: &str, hook_id: u64, binding: StateBinding) {
        self.bindings
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(hook_id, binding);
    }

    pub fn unregister(&self, key: &str, hook_id: u64) {
        let mut bindings = self.bindings.write();
        if let Some(hooks) = bindings.get_mut(key) {
            hooks.remove(&hook_id);
            if hooks.is_empty() {
                bindings.remove(key);
            }
        }
    }

    pub fn bindings_for(&self, key: &str) -> Vec<StateBinding> {
        self.bindings
            .read()
            .get(key)
            .map(|hooks| hooks.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_bound(&self, key: &str) -> bool {
        self.bindings.read().contains_key(key)
    }
}
