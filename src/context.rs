//! Execution context of one orchestration entry
//!
//! Every entry builds a brand-new [`ExecutionContext`] and swaps it in whole, so handler
//! lists registered during an earlier entry can never be observed by later attempts.

use crate::events::EventBus;
use crate::method::MethodSource;
use crate::orchestrator::HookConfig;
use crate::state::{FrontStates, StatePatch};
use crate::transport::AbortFn;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub type RemoveCallback = Arc<dyn Fn() + Send + Sync>;
pub type SaveCallback<H> = Arc<dyn Fn(&FrontStates<H>) + Send + Sync>;

struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
    on_abort: Mutex<Option<AbortFn>>,
}

/// Cancellation handle of one in-flight attempt
#[derive(Clone)]
pub struct AbortSignal {
    state: Arc<AbortState>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AbortState {
                aborted: AtomicBool::new(false),
                notify: Notify::new(),
                on_abort: Mutex::new(None),
            }),
        }
    }

    /// Bind the transport's abort function; runs it at once if already aborted
    pub fn bind(&self, abort: AbortFn) {
        if self.is_aborted() {
            abort();
            return;
        }
        *self.state.on_abort.lock() = Some(abort);
        // abort() may have raced the store above
        if self.is_aborted() {
            if let Some(abort) = self.state.on_abort.lock().take() {
                abort();
            }
        }
    }

    /// Idempotent
    pub fn abort(&self) {
        if self.state.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.notify.notify_waiters();
        let bound = self.state.on_abort.lock().take();
        if let Some(abort) = bound {
            abort();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once `abort()` has been called
    pub async fn aborted(&self) {
        let notified = self.state.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_aborted() {
            return;
        }
        notified.await;
    }

    pub fn same_as(&self, other: &AbortSignal) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Per-entry bookkeeping, owned by the orchestrator
pub struct ExecutionContext<H> {
    pub front_states: FrontStates<H>,
    pub events: EventBus,
    pub remove_states: Vec<RemoveCallback>,
    pub save_states: Vec<SaveCallback<H>>,
    /// Abort signal of the in-flight attempt, if any
    pub abort: Option<AbortSignal>,
    pub config: Arc<HookConfig>,
    pub source: MethodSource,
}

impl<H: Clone> ExecutionContext<H> {
    pub fn new(front_states: FrontStates<H>, config: Arc<HookConfig>, source: MethodSource) -> Self {
        Self {
            front_states,
            events: EventBus::new(),
            remove_states: Vec::new(),
            save_states: Vec::new(),
            abort: None,
            config,
            source,
        }
    }

    /// Build the context for a new entry. The in-flight abort binding survives re-entry
    /// because the attempt it belongs to is still running.
    pub fn succeed(previous: Option<&ExecutionContext<H>>, next: ExecutionContext<H>) -> Self {
        let mut next = next;
        if let Some(previous) = previous {
            next.abort = previous.abort.clone();
        }
        next
    }

    /// Signal of the attempt still in flight, if any. Callers abort it after releasing the
    /// lock that guards this context.
    pub fn in_flight(&self) -> Option<&AbortSignal> {
        self.abort.as_ref()
    }

    /// Clear the abort binding only if it still belongs to `signal`
    pub fn release_abort(&mut self, signal: &AbortSignal) {
        if self.abort.as_ref().is_some_and(|s| s.same_as(signal)) {
            self.abort = None;
        }
    }
}

/// Convenience for building patches that reset transfer progress
pub fn progress_reset() -> StatePatch {
    StatePatch::new()
        .downloading(Default::default())
        .uploading(Default::default())
}
