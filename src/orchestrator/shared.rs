//! In-flight request sharing
//!
//! Concurrent attempts whose methods produce the same key join one transport call instead
//! of issuing their own. Entries leave the table when the call settles or is aborted.

use crate::error::RequestError;
use crate::transport::{AbortFn, RawResponse, TransportCall};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

type TransportResponse = BoxFuture<'static, Result<RawResponse, RequestError>>;
type SharedResponse = Shared<TransportResponse>;

struct InFlightEntry {
    call_id: u64,
    response: SharedResponse,
    abort: AbortFn,
}

/// Abort bookkeeping for a call whose transport starts on first poll
#[derive(Default)]
struct StartState {
    aborted: bool,
    transport_abort: Option<AbortFn>,
}

impl StartState {
    /// Start the transport unless the call was aborted first. Neither the lock nor the
    /// transport abort is held across the other.
    fn start<F>(state: &Mutex<Self>, start: F) -> Option<TransportResponse>
    where
        F: FnOnce() -> TransportCall,
    {
        if state.lock().aborted {
            return None;
        }
        let call = start();
        let aborted_meanwhile = {
            let mut state = state.lock();
            if !state.aborted {
                state.transport_abort = Some(call.abort.clone());
            }
            state.aborted
        };
        if aborted_meanwhile {
            (call.abort)();
        }
        Some(call.response)
    }

    fn abort(state: &Mutex<Self>) {
        let transport_abort = {
            let mut state = state.lock();
            state.aborted = true;
            state.transport_abort.take()
        };
        if let Some(transport_abort) = transport_abort {
            transport_abort();
        }
    }
}

/// A transport call as seen by one attempt
pub struct JoinedCall {
    pub response: TransportResponse,
    pub abort: AbortFn,
    /// False when this attempt started the call
    pub joined: bool,
}

/// key -> in-flight transport call
#[derive(Default)]
pub struct SharedRequests {
    inflight: Mutex<HashMap<String, InFlightEntry>>,
    next_call_id: AtomicU64,
}

impl SharedRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight call for `key`, or publish a new one that runs `start` when it is
    /// first polled.
    ///
    /// Lookup and publication happen under one lock so concurrent attempts never both
    /// miss. With `share == false` the call is always started fresh and never published.
    pub fn join<F>(self: &Arc<Self>, key: &str, share: bool, start: F) -> JoinedCall
    where
        F: FnOnce() -> TransportCall + Send + 'static,
    {
        if !share {
            let call = start();
            return JoinedCall {
                response: call.response,
                abort: call.abort,
                joined: false,
            };
        }

        let mut inflight = self.inflight.lock();
        if let Some(entry) = inflight.get(key) {
            // A settled call that was never polled to completion is stale
            if entry.response.peek().is_none() {
                debug!(key = %key, "Joining in-flight request");
                return JoinedCall {
                    response: entry.response.clone().boxed(),
                    abort: entry.abort.clone(),
                    joined: true,
                };
            }
        }

        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let started = Arc::new(Mutex::new(StartState::default()));

        let table: Weak<Self> = Arc::downgrade(self);
        let settle_key = key.to_string();
        let lazy = Arc::clone(&started);
        let response: SharedResponse = async move {
            let result = match StartState::start(&lazy, start) {
                Some(response) => response.await,
                None => Err(RequestError::Aborted),
            };
            if let Some(table) = table.upgrade() {
                table.release(&settle_key, call_id);
            }
            result
        }
        .boxed()
        .shared();

        let table: Weak<Self> = Arc::downgrade(self);
        let abort_key = key.to_string();
        let abort: AbortFn = Arc::new(move || {
            if let Some(table) = table.upgrade() {
                table.release(&abort_key, call_id);
            }
            StartState::abort(&started);
        });

        inflight.insert(
            key.to_string(),
            InFlightEntry {
                call_id,
                response: response.clone(),
                abort: abort.clone(),
            },
        );

        JoinedCall {
            response: response.boxed(),
            abort,
            joined: false,
        }
    }

    /// Number of calls currently published
    pub fn len(&self) -> usize {
        self.inflight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: &str, call_id: u64) {
        let mut inflight = self.inflight.lock();
        if inflight.get(key).is_some_and(|entry| entry.call_id == call_id) {
            inflight.remove(key);
        }
    }
}
