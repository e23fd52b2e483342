//! Request Orchestrator
//!
//! One [`RequestOrchestrator`] serves one use site. The host re-enters it on every
//! evaluation cycle; each entry swaps in a fresh [`ExecutionContext`], registers the
//! request effect with the [`StateAdapter`] and hands back a [`RequestExposure`].
//!
//! Front state handles are created on the first entry and reused afterwards, so the
//! initial `data`/`loading` values are only computed once per use site.

use crate::cache::ResponseCache;
use crate::config::RequestDefaults;
use crate::context::ExecutionContext;
use crate::debounce::{DebounceDelay, DebounceScheduler};
use crate::error::RequestError;
use crate::events::{CompleteEvent, ErrorEvent, SuccessEvent};
use crate::key::KeyGenerator;
use crate::method::{Method, MethodSource};
use crate::state::registry::StateBinding;
use crate::state::{
    EffectHandler, EffectRequest, FrontStates, HookScope, RemoveStatesFn, SaveStatesFn,
    StateAdapter, StatePatch, StateRegistry, StateValue,
};
use crate::transport::Transport;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

mod send;
pub mod shared;

pub use shared::SharedRequests;

static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(1);

type ForcePredicate = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

/// Whether an attempt bypasses the response cache
#[derive(Clone, Default)]
pub enum ForceRequest {
    #[default]
    Never,
    Always,
    /// Decided per attempt from the send arguments
    When(ForcePredicate),
}

impl ForceRequest {
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        ForceRequest::When(Arc::new(predicate))
    }

    pub fn evaluate(&self, args: &[Value]) -> bool {
        match self {
            ForceRequest::Never => false,
            ForceRequest::Always => true,
            ForceRequest::When(predicate) => predicate(args),
        }
    }
}

impl From<bool> for ForceRequest {
    fn from(force: bool) -> Self {
        if force {
            ForceRequest::Always
        } else {
            ForceRequest::Never
        }
    }
}

impl fmt::Debug for ForceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForceRequest::Never => f.write_str("Never"),
            ForceRequest::Always => f.write_str("Always"),
            ForceRequest::When(_) => f.write_str("When(..)"),
        }
    }
}

/// Options of one orchestration entry
#[derive(Debug, Clone, Default)]
pub struct HookConfig {
    /// Fire when first mounted; unset falls back to `requests.immediate`
    pub immediate: Option<bool>,
    /// `data` before the first response when nothing is cached
    pub initial_data: Option<Value>,
    pub force: ForceRequest,
    /// Applied to watched-input triggers only
    pub debounce: DebounceDelay,
    /// Unset falls back to `requests.share_request`
    pub share_request: Option<bool>,
    /// Caller-owned slots created next to the standard ones
    pub extra_states: BTreeMap<String, StateValue>,
}

impl HookConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = Some(immediate);
        self
    }

    pub fn initial_data(mut self, data: Value) -> Self {
        self.initial_data = Some(data);
        self
    }

    pub fn force(mut self, force: impl Into<ForceRequest>) -> Self {
        self.force = force.into();
        self
    }

    pub fn debounce(mut self, delay: DebounceDelay) -> Self {
        self.debounce = delay;
        self
    }

    pub fn share_request(mut self, share: bool) -> Self {
        self.share_request = Some(share);
        self
    }

    pub fn extra_state(mut self, name: impl Into<String>, initial: StateValue) -> Self {
        self.extra_states.insert(name.into(), initial);
        self
    }
}

/// Services shared by every orchestrator of one `Courier`
#[derive(Clone)]
pub(crate) struct OrchestratorServices {
    pub transport: Arc<dyn Transport>,
    pub cache: Arc<ResponseCache>,
    pub registry: Arc<StateRegistry>,
    pub shared: Arc<SharedRequests>,
    pub defaults: RequestDefaults,
}

pub(crate) struct OrchestratorInner<A: StateAdapter> {
    adapter: Arc<A>,
    services: OrchestratorServices,
    scope: HookScope,
    front_states: Mutex<Option<FrontStates<A::Handle>>>,
    context: Mutex<Option<ExecutionContext<A::Handle>>>,
    /// Method keys this hook's states are currently bound under in the registry
    bound_keys: Mutex<BTreeSet<String>>,
    debounce: Arc<DebounceScheduler>,
    runtime: Option<Handle>,
}

/// Orchestrates requests for one use site
pub struct RequestOrchestrator<A: StateAdapter> {
    inner: Arc<OrchestratorInner<A>>,
}

impl<A: StateAdapter> Clone for RequestOrchestrator<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: StateAdapter> RequestOrchestrator<A> {
    pub(crate) fn new(adapter: Arc<A>, services: OrchestratorServices) -> Self {
        let runtime = Handle::try_current().ok();
        let debounce = match &runtime {
            Some(handle) => DebounceScheduler::with_runtime(handle.clone()),
            None => DebounceScheduler::new(),
        };
        Self {
            inner: Arc::new(OrchestratorInner {
                adapter,
                services,
                scope: HookScope {
                    hook_id: NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed),
                },
                front_states: Mutex::new(None),
                context: Mutex::new(None),
                bound_keys: Mutex::new(BTreeSet::new()),
                debounce: Arc::new(debounce),
                runtime,
            }),
        }
    }

    pub fn hook_id(&self) -> u64 {
        self.inner.scope.hook_id
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.inner.adapter
    }

    /// Enter for one evaluation cycle.
    ///
    /// `watched` switches the effect to the debounced watcher path; `Some(vec![])` is a
    /// watcher with no inputs, which differs from `None`.
    pub fn enter(
        &self,
        source: impl Into<MethodSource>,
        config: HookConfig,
        watched: Option<Vec<A::Handle>>,
    ) -> RequestExposure<A> {
        let inner = &self.inner;
        let source = source.into();
        let config = Arc::new(config);
        let immediate = config.immediate.unwrap_or(inner.services.defaults.immediate);

        let front_states = self.front_states_for(&source, &config, immediate);

        let mut next = ExecutionContext::new(front_states.clone(), config.clone(), source.clone());
        let bind_key = KeyGenerator::key(&source.resolve(&[]));
        let weak = Arc::downgrade(inner);
        next.save_states.push(Arc::new(move |states: &FrontStates<A::Handle>| {
            if let Some(inner) = weak.upgrade() {
                inner.bind_states(&bind_key, states);
            }
        }));
        let weak = Arc::downgrade(inner);
        next.remove_states.push(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.debounce.cancel();
                inner.unbind_states();
            }
        }));

        {
            let mut slot = inner.context.lock();
            let entered = ExecutionContext::succeed(slot.as_ref(), next);
            *slot = Some(entered);
        }
        trace!(hook_id = inner.scope.hook_id, immediate, "Entered orchestrator");

        if inner.adapter.is_interactive() {
            let request = EffectRequest {
                handler: self.effect_handler(watched.is_some(), &config.debounce),
                remove_states: self.remove_states_fn(),
                save_states: self.save_states_fn(),
                front_states: front_states.clone(),
                watching_states: watched,
                immediate,
            };
            inner.adapter.effect_request(request, &inner.scope);
        }

        RequestExposure::new(self.clone(), &front_states, config)
    }

    /// Entry without watched inputs: fires once when mounted (immediate by default)
    pub fn use_request(
        &self,
        source: impl Into<MethodSource>,
        config: HookConfig,
    ) -> RequestExposure<A> {
        self.enter(source, config, None)
    }

    /// Entry re-sending whenever a watched input changes (not immediate by default)
    pub fn use_watcher(
        &self,
        source: impl Into<MethodSource>,
        watched: Vec<A::Handle>,
        mut config: HookConfig,
    ) -> RequestExposure<A> {
        if config.immediate.is_none() {
            config.immediate = Some(false);
        }
        self.enter(source, config, Some(watched))
    }

    /// Run one attempt. Rejections propagate to the caller.
    pub async fn send(
        &self,
        args: Vec<Value>,
        method_override: Option<Method>,
        background: bool,
    ) -> Result<Value, RequestError> {
        Arc::clone(&self.inner)
            .send(args, method_override, background)
            .await
    }

    /// Merge a patch into the front states; `fetching` is written as `loading`
    pub fn update(&self, patch: StatePatch) {
        if let Some(states) = self.inner.front_states.lock().clone() {
            self.inner.patch_states(patch, &states);
        }
    }

    /// Abort the in-flight attempt of the active context; no-op when idle
    pub fn abort(&self) {
        let signal = self
            .inner
            .context
            .lock()
            .as_ref()
            .and_then(|context| context.in_flight().cloned());
        match signal {
            Some(signal) => {
                debug!(hook_id = self.inner.scope.hook_id, "Aborting in-flight request");
                signal.abort();
            }
            None => trace!(hook_id = self.inner.scope.hook_id, "Abort with nothing in flight"),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner
            .context
            .lock()
            .as_ref()
            .is_some_and(|context| context.in_flight().is_some())
    }

    /// Drop a pending debounced trigger
    pub fn cancel_pending(&self) {
        self.inner.debounce.cancel();
    }

    fn with_context<F>(&self, f: F)
    where
        F: FnOnce(&mut ExecutionContext<A::Handle>),
    {
        match self.inner.context.lock().as_mut() {
            Some(context) => f(context),
            None => warn!(
                hook_id = self.inner.scope.hook_id,
                "Handler registered before the orchestrator was entered"
            ),
        }
    }

    fn front_states_for(
        &self,
        source: &MethodSource,
        config: &HookConfig,
        immediate: bool,
    ) -> FrontStates<A::Handle> {
        let inner = &self.inner;
        let existing = inner.front_states.lock().clone();
        let states = match existing {
            Some(mut states) => {
                for (name, initial) in &config.extra_states {
                    if !states.extra.contains_key(name) {
                        let handle = inner.adapter.create(initial.clone(), &inner.scope);
                        states.extra.insert(name.clone(), handle);
                    }
                }
                states
            }
            None => self.create_front_states(source, config, immediate),
        };
        *inner.front_states.lock() = Some(states.clone());
        states
    }

    fn create_front_states(
        &self,
        source: &MethodSource,
        config: &HookConfig,
        immediate: bool,
    ) -> FrontStates<A::Handle> {
        let inner = &self.inner;
        let method = source.resolve(&[]);
        let cached = inner.cached_value(&method);
        let loading = immediate && (config.force.evaluate(&[]) || cached.is_none());
        let data = cached
            .or_else(|| config.initial_data.clone())
            .unwrap_or(Value::Null);

        let adapter = &inner.adapter;
        let scope = &inner.scope;
        FrontStates {
            data: adapter.create(StateValue::Data(data), scope),
            loading: adapter.create(StateValue::Flag(loading), scope),
            error: adapter.create(StateValue::Error(None), scope),
            downloading: adapter.create(StateValue::Progress(Default::default()), scope),
            uploading: adapter.create(StateValue::Progress(Default::default()), scope),
            extra: config
                .extra_states
                .iter()
                .map(|(name, initial)| (name.clone(), adapter.create(initial.clone(), scope)))
                .collect(),
        }
    }

    /// Effect run by the host: spawns an attempt whose rejection is only logged
    fn effect_handler(&self, watched: bool, debounce: &DebounceDelay) -> EffectHandler {
        let weak: Weak<OrchestratorInner<A>> = Arc::downgrade(&self.inner);
        let runtime = self.inner.runtime.clone();
        let send_effect: EffectHandler = Arc::new(move |changed_index: Option<usize>| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let Some(runtime) = runtime.clone().or_else(|| Handle::try_current().ok()) else {
                warn!(
                    hook_id = inner.scope.hook_id,
                    "No tokio runtime available, skipping effect"
                );
                return;
            };
            runtime.spawn(async move {
                let hook_id = inner.scope.hook_id;
                if let Err(err) = inner.send(Vec::new(), None, false).await {
                    debug!(hook_id, ?changed_index, error = %err, "Effect request rejected");
                }
            });
        });

        if watched {
            self.inner.debounce.wrap(debounce.clone(), send_effect)
        } else {
            send_effect
        }
    }

    fn save_states_fn(&self) -> SaveStatesFn<A::Handle> {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |states: &FrontStates<A::Handle>| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let callbacks = inner
                .context
                .lock()
                .as_ref()
                .map(|context| context.save_states.clone())
                .unwrap_or_default();
            for callback in callbacks {
                callback(states);
            }
        })
    }

    fn remove_states_fn(&self) -> RemoveStatesFn {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let callbacks = inner
                .context
                .lock()
                .as_ref()
                .map(|context| context.remove_states.clone())
                .unwrap_or_default();
            for callback in callbacks {
                callback();
            }
        })
    }
}

impl<A: StateAdapter> OrchestratorInner<A> {
    /// Cached value for `method`, consulted only when its policy caches at all
    fn cached_value(&self, method: &Method) -> Option<Value> {
        let policy = self.services.cache.policy_for(method);
        if !policy.is_enabled() {
            return None;
        }
        self.services.cache.get(&KeyGenerator::key(method))
    }

    fn patch_states(&self, patch: StatePatch, states: &FrontStates<A::Handle>) {
        let patch = patch.normalize_fetching();
        if !patch.is_empty() {
            self.adapter.update(&patch, states, &self.scope);
        }
    }

    fn bind_states(&self, key: &str, states: &FrontStates<A::Handle>) {
        let read_adapter = Arc::clone(&self.adapter);
        let read_scope = self.scope.clone();
        let data = states.data.clone();
        let write_adapter = Arc::clone(&self.adapter);
        let write_scope = self.scope.clone();
        let write_states = states.clone();

        let binding = StateBinding {
            read_data: Arc::new(move || {
                read_adapter
                    .dehydrate(&data, &read_scope)
                    .as_data()
                    .cloned()
                    .unwrap_or(Value::Null)
            }),
            write: Arc::new(move |patch: StatePatch| {
                write_adapter.update(&patch.normalize_fetching(), &write_states, &write_scope)
            }),
        };
        self.services
            .registry
            .register(key, self.scope.hook_id, binding);
        self.bound_keys.lock().insert(key.to_string());
    }

    fn unbind_states(&self) {
        let keys = std::mem::take(&mut *self.bound_keys.lock());
        for key in keys {
            self.services.registry.unregister(&key, self.scope.hook_id);
        }
    }
}

/// What a use site sees after entering
pub struct RequestExposure<A: StateAdapter> {
    pub data: A::Exported,
    pub loading: A::Exported,
    pub error: A::Exported,
    pub downloading: A::Exported,
    pub uploading: A::Exported,
    pub extra: BTreeMap<String, A::Exported>,
    orchestrator: RequestOrchestrator<A>,
    config: Arc<HookConfig>,
}

impl<A: StateAdapter> Clone for RequestExposure<A> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            loading: self.loading.clone(),
            error: self.error.clone(),
            downloading: self.downloading.clone(),
            uploading: self.uploading.clone(),
            extra: self.extra.clone(),
            orchestrator: self.orchestrator.clone(),
            config: self.config.clone(),
        }
    }
}

impl<A: StateAdapter> RequestExposure<A> {
    fn new(
        orchestrator: RequestOrchestrator<A>,
        states: &FrontStates<A::Handle>,
        config: Arc<HookConfig>,
    ) -> Self {
        let adapter = Arc::clone(&orchestrator.inner.adapter);
        let scope = orchestrator.inner.scope.clone();
        let export = |handle: &A::Handle| adapter.export(handle, &scope);
        Self {
            data: export(&states.data),
            loading: export(&states.loading),
            error: export(&states.error),
            downloading: export(&states.downloading),
            uploading: export(&states.uploading),
            extra: states
                .extra
                .iter()
                .map(|(name, handle)| (name.clone(), export(handle)))
                .collect(),
            orchestrator,
            config,
        }
    }

    /// Background-fetch name of the loading state
    pub fn fetching(&self) -> &A::Exported {
        &self.loading
    }

    pub fn on_success<F>(&self, handler: F) -> &Self
    where
        F: Fn(&SuccessEvent) + Send + Sync + 'static,
    {
        self.orchestrator
            .with_context(|context| context.events.on_success(Arc::new(handler)));
        self
    }

    pub fn on_error<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.orchestrator
            .with_context(|context| context.events.on_error(Arc::new(handler)));
        self
    }

    pub fn on_complete<F>(&self, handler: F) -> &Self
    where
        F: Fn(&CompleteEvent) + Send + Sync + 'static,
    {
        self.orchestrator
            .with_context(|context| context.events.on_complete(Arc::new(handler)));
        self
    }

    pub fn update(&self, patch: StatePatch) {
        self.orchestrator.update(patch);
    }

    pub fn abort(&self) {
        self.orchestrator.abort();
    }

    /// Send with the entry's method source
    pub async fn send(&self, args: Vec<Value>) -> Result<Value, RequestError> {
        self.orchestrator.send(args, None, false).await
    }

    /// Send a specific method instead of the entry's source
    pub async fn send_method(&self, method: Method, args: Vec<Value>) -> Result<Value, RequestError> {
        self.orchestrator.send(args, Some(method), false).await
    }

    /// Background fetch: drives `fetching` and pushes the result into every state bound
    /// to `method`'s key
    pub async fn fetch(&self, method: Method) -> Result<Value, RequestError> {
        self.orchestrator.send(Vec::new(), Some(method), true).await
    }

    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &RequestOrchestrator<A> {
        &self.orchestrator
    }
}
