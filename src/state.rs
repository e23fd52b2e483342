//! State binding interface
//!
//! The orchestrator never owns the containers that callers observe. A host supplies a
//! [`StateAdapter`] that creates, exports, updates and reads state handles and that
//! schedules the orchestrator's effect according to its own rules.

use crate::error::RequestError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub mod memory;
pub mod registry;

pub use memory::{MemoryState, MemoryStateAdapter};
pub use registry::StateRegistry;

pub const DATA: &str = "data";
pub const LOADING: &str = "loading";
/// Background-fetch alias of [`LOADING`]
pub const FETCHING: &str = "fetching";
pub const ERROR: &str = "error";
pub const DOWNLOADING: &str = "downloading";
pub const UPLOADING: &str = "uploading";

/// Transfer progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub loaded: u64,
    pub total: u64,
}

/// Value held by one state slot
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Data(Value),
    Flag(bool),
    Error(Option<RequestError>),
    Progress(Progress),
}

impl StateValue {
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            StateValue::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            StateValue::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&RequestError> {
        match self {
            StateValue::Error(error) => error.as_ref(),
            _ => None,
        }
    }

    pub fn as_progress(&self) -> Option<Progress> {
        match self {
            StateValue::Progress(progress) => Some(*progress),
            _ => None,
        }
    }
}

/// Partial state update, keyed by slot name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch(BTreeMap<String, StateValue>);

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, slot: impl Into<String>, value: StateValue) -> Self {
        self.0.insert(slot.into(), value);
        self
    }

    pub fn data(self, value: Value) -> Self {
        self.set(DATA, StateValue::Data(value))
    }

    pub fn loading(self, loading: bool) -> Self {
        self.set(LOADING, StateValue::Flag(loading))
    }

    pub fn fetching(self, fetching: bool) -> Self {
        self.set(FETCHING, StateValue::Flag(fetching))
    }

    pub fn error(self, error: Option<RequestError>) -> Self {
        self.set(ERROR, StateValue::Error(error))
    }

    pub fn downloading(self, progress: Progress) -> Self {
        self.set(DOWNLOADING, StateValue::Progress(progress))
    }

    pub fn uploading(self, progress: Progress) -> Self {
        self.set(UPLOADING, StateValue::Progress(progress))
    }

    pub fn get(&self, slot: &str) -> Option<&StateValue> {
        self.0.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fold the background-fetch flag onto the primary loading flag
    pub fn normalize_fetching(mut self) -> Self {
        if let Some(fetching) = self.0.remove(FETCHING) {
            self.0.insert(LOADING.to_string(), fetching);
        }
        self
    }
}

/// Handles for every slot of one orchestration entry
#[derive(Debug, Clone)]
pub struct FrontStates<H> {
    pub data: H,
    pub loading: H,
    pub error: H,
    pub downloading: H,
    pub uploading: H,
    /// Caller-supplied slots, merged in verbatim
    pub extra: BTreeMap<String, H>,
}

impl<H> FrontStates<H> {
    pub fn get(&self, slot: &str) -> Option<&H> {
        match slot {
            DATA => Some(&self.data),
            LOADING => Some(&self.loading),
            ERROR => Some(&self.error),
            DOWNLOADING => Some(&self.downloading),
            UPLOADING => Some(&self.uploading),
            other => self.extra.get(other),
        }
    }
}

/// Identity of the use site an adapter call belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookScope {
    pub hook_id: u64,
}

pub type EffectHandler = Arc<dyn Fn(Option<usize>) + Send + Sync>;
pub type RemoveStatesFn = Arc<dyn Fn() + Send + Sync>;
pub type SaveStatesFn<H> = Arc<dyn Fn(&FrontStates<H>) + Send + Sync>;

/// Side effect registered with the host on every orchestration entry
pub struct EffectRequest<H> {
    /// Run with `None` for the immediate run, `Some(index)` when watched input `index` changed
    pub handler: EffectHandler,
    pub remove_states: RemoveStatesFn,
    pub save_states: SaveStatesFn<H>,
    pub front_states: FrontStates<H>,
    /// `None` when no watched inputs were supplied; an empty list is distinct from that
    pub watching_states: Option<Vec<H>>,
    pub immediate: bool,
}

impl<H> fmt::Debug for EffectRequest<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRequest")
            .field(
                "watching_states",
                &self.watching_states.as_ref().map(Vec::len),
            )
            .field("immediate", &self.immediate)
            .finish()
    }
}

/// Host state-binding primitives
pub trait StateAdapter: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;
    type Exported: Clone;

    fn create(&self, initial: StateValue, scope: &HookScope) -> Self::Handle;

    fn export(&self, handle: &Self::Handle, scope: &HookScope) -> Self::Exported;

    /// Read the current value behind a handle
    fn dehydrate(&self, handle: &Self::Handle, scope: &HookScope) -> StateValue;

    /// Merge `patch` into the matching handles of `states`
    fn update(&self, patch: &StatePatch, states: &FrontStates<Self::Handle>, scope: &HookScope);

    fn effect_request(&self, request: EffectRequest<Self::Handle>, scope: &HookScope);

    /// False while rendering without a live event loop (e.g. server-side rendering)
    fn is_interactive(&self) -> bool {
        true
    }
}
