//! Headless state binding
//!
//! Plain shared cells plus a minimal effect scheduler: an effect runs on first mount when
//! immediate, and re-runs with the watched index whenever a watched cell is set.

use crate::error::RequestError;
use crate::state::{
    EffectHandler, EffectRequest, FrontStates, HookScope, Progress, RemoveStatesFn,
    StateAdapter, StatePatch, StateValue,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Shared state cell
#[derive(Clone)]
pub struct MemoryState {
    id: u64,
    cell: Arc<RwLock<StateValue>>,
}

impl MemoryState {
    fn new(id: u64, initial: StateValue) -> Self {
        Self {
            id,
            cell: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn get(&self) -> StateValue {
        self.cell.read().clone()
    }

    pub fn data(&self) -> Value {
        self.get().as_data().cloned().unwrap_or(Value::Null)
    }

    pub fn flag(&self) -> bool {
        self.get().as_flag().unwrap_or(false)
    }

    pub fn error(&self) -> Option<RequestError> {
        self.get().as_error().cloned()
    }

    pub fn progress(&self) -> Progress {
        self.get().as_progress().unwrap_or_default()
    }

    fn replace(&self, value: StateValue) {
        *self.cell.write() = value;
    }
}

impl fmt::Debug for MemoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryState")
            .field("id", &self.id)
            .field("value", &*self.cell.read())
            .finish()
    }
}

struct MountedEffect {
    hook_id: u64,
    watched: Vec<u64>,
    handler: EffectHandler,
    remove_states: RemoveStatesFn,
}

/// In-process [`StateAdapter`] for hosts without a UI framework
pub struct MemoryStateAdapter {
    interactive: bool,
    next_id: AtomicU64,
    effects: Mutex<Vec<MountedEffect>>,
}

impl Default for MemoryStateAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStateAdapter {
    pub fn new() -> Self {
        Self {
            interactive: true,
            next_id: AtomicU64::new(1),
            effects: Mutex::new(Vec::new()),
        }
    }

    /// Adapter for server-side rendering passes: effects are never scheduled
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            ..Self::new()
        }
    }

    /// Create a standalone cell, typically used as a watched input
    pub fn state(&self, initial: StateValue) -> MemoryState {
        MemoryState::new(self.next_id.fetch_add(1, Ordering::Relaxed), initial)
    }

    /// Set a cell and trigger every mounted effect watching it
    pub fn set(&self, state: &MemoryState, value: StateValue) {
        state.replace(value);

        let triggered: Vec<(EffectHandler, usize)> = self
            .effects
            .lock()
            .iter()
            .filter_map(|effect| {
                effect
                    .watched
                    .iter()
                    .position(|id| *id == state.id)
                    .map(|index| (effect.handler.clone(), index))
            })
            .collect();

        for (handler, index) in triggered {
            handler(Some(index));
        }
    }

    pub fn mounted(&self) -> usize {
        self.effects.lock().len()
    }

    /// Tear down the effect of one use site
    pub fn unmount(&self, hook_id: u64) -> bool {
        let removed = {
            let mut effects = self.effects.lock();
            let position = effects.iter().position(|e| e.hook_id == hook_id);
            position.map(|index| effects.remove(index))
        };
        match removed {
            Some(effect) => {
                (effect.remove_states)();
                true
            }
            None => false,
        }
    }

    pub fn unmount_all(&self) {
        let drained: Vec<MountedEffect> = self.effects.lock().drain(..).collect();
        for effect in drained {
            (effect.remove_states)();
        }
    }
}

impl StateAdapter for MemoryStateAdapter {
    type Handle = MemoryState;
    type Exported = MemoryState;

    fn create(&self, initial: StateValue, _scope: &HookScope) -> MemoryState {
        self.state(initial)
    }

    fn export(&self, handle: &MemoryState, _scope: &HookScope) -> MemoryState {
        handle.clone()
    }

    fn dehydrate(&self, handle: &MemoryState, _scope: &HookScope) -> StateValue {
        handle.get()
    }

    fn update(&self, patch: &StatePatch, states: &FrontStates<MemoryState>, scope: &HookScope) {
        for (slot, value) in patch.iter() {
            match states.get(slot) {
                Some(handle) => handle.replace(value.clone()),
                None => trace!(hook_id = scope.hook_id, slot = %slot, "Ignoring unknown state slot"),
            }
        }
    }

    fn effect_request(&self, request: EffectRequest<MemoryState>, scope: &HookScope) {
        if !self.interactive {
            return;
        }

        (request.save_states)(&request.front_states);

        let watched = request
            .watching_states
            .as_ref()
            .map(|states| states.iter().map(MemoryState::id).collect())
            .unwrap_or_default();
        let mounted = MountedEffect {
            hook_id: scope.hook_id,
            watched,
            handler: request.handler.clone(),
            remove_states: request.remove_states.clone(),
        };

        // Re-entry replaces the mounted effect; immediate only applies to the first mount
        let first_mount = {
            let mut effects = self.effects.lock();
            match effects.iter_mut().find(|e| e.hook_id == scope.hook_id) {
                Some(existing) => {
                    *existing = mounted;
                    false
                }
                None => {
                    effects.push(mounted);
                    true
                }
            }
        };

        if first_mount && request.immediate {
            (request.handler)(None);
        }
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}
