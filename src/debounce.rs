//! Trailing-edge debouncing of watched-input triggers
//!
//! Only one timer is ever pending per scheduler: a new trigger aborts the pending task
//! before arming its own, so superseded triggers never run their effect.

use crate::state::EffectHandler;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{trace, warn};

/// Delay applied when a watched input changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceDelay {
    /// Same delay whichever input changed
    Uniform(Duration),
    /// Delay per watched-input index; missing entries mean no delay
    PerIndex(Vec<Duration>),
}

impl Default for DebounceDelay {
    fn default() -> Self {
        DebounceDelay::Uniform(Duration::ZERO)
    }
}

impl DebounceDelay {
    pub fn millis(ms: u64) -> Self {
        DebounceDelay::Uniform(Duration::from_millis(ms))
    }

    pub fn per_index_millis(ms: &[u64]) -> Self {
        DebounceDelay::PerIndex(ms.iter().copied().map(Duration::from_millis).collect())
    }

    /// The immediate trigger (no changed index) is never debounced
    pub fn resolve(&self, changed_index: Option<usize>) -> Duration {
        let Some(index) = changed_index else {
            return Duration::ZERO;
        };
        match self {
            DebounceDelay::Uniform(delay) => *delay,
            DebounceDelay::PerIndex(delays) => delays.get(index).copied().unwrap_or(Duration::ZERO),
        }
    }
}

/// Holds the single pending timer of one orchestrator
pub struct DebounceScheduler {
    pending: Mutex<Option<JoinHandle<()>>>,
    runtime: Option<Handle>,
}

impl Default for DebounceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DebounceScheduler {
    /// Uses the ambient tokio runtime when there is one
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            runtime: Handle::try_current().ok(),
        }
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            pending: Mutex::new(None),
            runtime: Some(runtime),
        }
    }

    /// Cancel whatever is pending, then run `task` after `delay` (zero runs it inline).
    pub fn trigger<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(superseded) = pending.take() {
            superseded.abort();
        }

        if delay.is_zero() {
            drop(pending);
            task();
            return;
        }

        // Deadline is fixed now, not when the spawned task is first polled
        let deadline = Instant::now() + delay;
        let timer = async move {
            sleep_until(deadline).await;
            task();
        };

        let runtime = self.runtime.clone().or_else(|| Handle::try_current().ok());
        match runtime {
            Some(runtime) => {
                trace!(delay_ms = delay.as_millis() as u64, "Debounce timer armed");
                *pending = Some(runtime.spawn(timer));
            }
            None => warn!("No tokio runtime available, dropping debounced trigger"),
        }
    }

    /// Drop the pending trigger, if any
    pub fn cancel(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wrap an effect so every trigger goes through this scheduler with `delay`
    pub fn wrap(self: &Arc<Self>, delay: DebounceDelay, effect: EffectHandler) -> EffectHandler {
        let scheduler = Arc::clone(self);
        Arc::new(move |changed_index| {
            let effect = effect.clone();
            let wait = delay.resolve(changed_index);
            scheduler.trigger(wait, move || effect(changed_index));
        })
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
