//! Lifecycle event dispatch
//!
//! Ordered registries of success, error and completion handlers. Dispatch isolates
//! handlers from each other: a panicking handler is logged and the next one still runs.

use crate::error::RequestError;
use crate::method::Method;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// Successful attempt
#[derive(Debug, Clone)]
pub struct SuccessEvent {
    pub data: Value,
    pub method: Method,
    pub send_args: Vec<Value>,
    /// Served from the response cache without reaching the transport
    pub from_cache: bool,
}

/// Failed attempt (transport, transform or abort)
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub error: RequestError,
    pub method: Method,
    pub send_args: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteStatus {
    Success,
    Error,
}

/// Fired after success or error handlers
#[derive(Debug, Clone)]
pub struct CompleteEvent {
    pub status: CompleteStatus,
    pub data: Option<Value>,
    pub error: Option<RequestError>,
    pub method: Method,
    pub send_args: Vec<Value>,
    pub from_cache: bool,
}

impl From<&SuccessEvent> for CompleteEvent {
    fn from(event: &SuccessEvent) -> Self {
        Self {
            status: CompleteStatus::Success,
            data: Some(event.data.clone()),
            error: None,
            method: event.method.clone(),
            send_args: event.send_args.clone(),
            from_cache: event.from_cache,
        }
    }
}

impl From<&ErrorEvent> for CompleteEvent {
    fn from(event: &ErrorEvent) -> Self {
        Self {
            status: CompleteStatus::Error,
            data: None,
            error: Some(event.error.clone()),
            method: event.method.clone(),
            send_args: event.send_args.clone(),
            from_cache: false,
        }
    }
}

pub type SuccessHandler = Arc<dyn Fn(&SuccessEvent) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;
pub type CompleteHandler = Arc<dyn Fn(&CompleteEvent) + Send + Sync>;

/// Handler registries of one execution context.
///
/// Cloning copies the lists, which is how an attempt snapshots the handlers registered
/// before it resolved.
#[derive(Clone, Default)]
pub struct EventBus {
    success: Vec<SuccessHandler>,
    error: Vec<ErrorHandler>,
    complete: Vec<CompleteHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(&mut self, handler: SuccessHandler) {
        self.success.push(handler);
    }

    pub fn on_error(&mut self, handler: ErrorHandler) {
        self.error.push(handler);
    }

    pub fn on_complete(&mut self, handler: CompleteHandler) {
        self.complete.push(handler);
    }

    pub fn handler_counts(&self) -> (usize, usize, usize) {
        (self.success.len(), self.error.len(), self.complete.len())
    }

    /// Success handlers, then completion handlers
    pub fn emit_success(&self, event: &SuccessEvent) {
        dispatch("success", &self.success, event);
        self.emit_complete(&CompleteEvent::from(event));
    }

    /// Error handlers, then completion handlers
    pub fn emit_error(&self, event: &ErrorEvent) {
        dispatch("error", &self.error, event);
        self.emit_complete(&CompleteEvent::from(event));
    }

    fn emit_complete(&self, event: &CompleteEvent) {
        dispatch("complete", &self.complete, event);
    }
}

fn dispatch<E: ?Sized>(registry: &str, handlers: &[Arc<dyn Fn(&E) + Send + Sync>], event: &E) {
    for (index, handler) in handlers.iter().enumerate() {
        if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            error!(registry = registry, index = index, "Event handler panicked");
        }
    }
}
