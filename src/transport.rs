//! Transport Abstraction
//!
//! The orchestrator never performs I/O itself. A [`Transport`] receives a resolved
//! [`Method`] and hands back the pending response together with a way to abort it.

use crate::error::RequestError;
use crate::method::Method;
use crate::state::Progress;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub mod http;

pub use http::ReqwestTransport;

/// Response as produced by a transport, before the method's transform runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl RawResponse {
    /// 200 response carrying `body`
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body,
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Cancels the underlying transport call
pub type AbortFn = Arc<dyn Fn() + Send + Sync>;

/// Progress callbacks handed to the transport
#[derive(Clone)]
pub struct ProgressHandlers {
    pub on_download: ProgressCallback,
    pub on_upload: ProgressCallback,
}

impl ProgressHandlers {
    pub fn noop() -> Self {
        Self {
            on_download: Arc::new(|_| {}),
            on_upload: Arc::new(|_| {}),
        }
    }
}

impl fmt::Debug for ProgressHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressHandlers")
    }
}

/// A started transport call
pub struct TransportCall {
    pub response: BoxFuture<'static, Result<RawResponse, RequestError>>,
    pub abort: AbortFn,
}

/// Performs the actual request I/O
pub trait Transport: Send + Sync {
    fn send(&self, method: &Method, progress: ProgressHandlers) -> TransportCall;
}
