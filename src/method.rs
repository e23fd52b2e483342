//! Request descriptors
//!
//! A [`Method`] describes one request: what to call, how to turn the raw response into
//! the value exposed to callers, and how long that value may be served from cache.

use crate::error::RequestError;
use crate::transport::RawResponse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Request kind (HTTP verb for HTTP transports)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestKind {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Get => "GET",
            RequestKind::Post => "POST",
            RequestKind::Put => "PUT",
            RequestKind::Delete => "DELETE",
            RequestKind::Patch => "PATCH",
            RequestKind::Head => "HEAD",
            RequestKind::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a cached response lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    #[default]
    Memory,
    /// Memory plus write-through to the configured `CacheStorage`
    Persistent,
}

/// How long a response stays valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Do not cache
    Disabled,
    /// Never expires
    Never,
    After(Duration),
}

/// Cache policy attached to a method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub expire: Expiry,
    pub mode: CacheMode,
}

impl CachePolicy {
    pub fn disabled() -> Self {
        Self {
            expire: Expiry::Disabled,
            mode: CacheMode::Memory,
        }
    }

    pub fn permanent(mode: CacheMode) -> Self {
        Self {
            expire: Expiry::Never,
            mode,
        }
    }

    pub fn ttl(ttl: Duration) -> Self {
        Self {
            expire: Expiry::After(ttl),
            mode: CacheMode::Memory,
        }
    }

    /// Build a policy from a millisecond TTL; zero or negative values clamp to disabled.
    pub fn from_millis(ttl_ms: i64) -> Self {
        if ttl_ms <= 0 {
            Self::disabled()
        } else {
            Self::ttl(Duration::from_millis(ttl_ms as u64))
        }
    }

    pub fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether a response under this policy is stored at all
    pub fn is_enabled(&self) -> bool {
        match self.expire {
            Expiry::Disabled => false,
            Expiry::Never => true,
            Expiry::After(ttl) => !ttl.is_zero(),
        }
    }
}

/// Turns a raw transport response into the value written to state and cache.
#[async_trait]
pub trait ResponseTransform: Send + Sync {
    async fn transform(&self, response: RawResponse, method: &Method) -> Result<Value, RequestError>;
}

/// Synchronous closure transform
pub struct FnTransform<F>(F);

#[async_trait]
impl<F> ResponseTransform for FnTransform<F>
where
    F: Fn(RawResponse, &Method) -> Result<Value, RequestError> + Send + Sync,
{
    async fn transform(&self, response: RawResponse, method: &Method) -> Result<Value, RequestError> {
        (self.0)(response, method)
    }
}

/// Asynchronous closure transform
pub struct AsyncFnTransform<F, Fut> {
    func: F,
    _future: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> ResponseTransform for AsyncFnTransform<F, Fut>
where
    F: Fn(RawResponse) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, RequestError>> + Send,
{
    async fn transform(&self, response: RawResponse, _method: &Method) -> Result<Value, RequestError> {
        (self.func)(response).await
    }
}

/// Immutable request descriptor.
///
/// Header names are stored lower-cased so that descriptors differing only in header case
/// share a cache key.
#[derive(Clone)]
pub struct Method {
    kind: RequestKind,
    url: String,
    params: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Option<Value>,
    transform: Option<Arc<dyn ResponseTransform>>,
    cache: Option<CachePolicy>,
    name: Option<String>,
}

impl Method {
    pub fn new(kind: RequestKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
            transform: None,
            cache: None,
            name: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(RequestKind::Get, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(RequestKind::Post, url).body(body)
    }

    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self::new(RequestKind::Put, url).body(body)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(RequestKind::Delete, url)
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a transform implementation
    pub fn transform(mut self, transform: Arc<dyn ResponseTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn transform_with<F>(self, func: F) -> Self
    where
        F: Fn(RawResponse, &Method) -> Result<Value, RequestError> + Send + Sync + 'static,
    {
        self.transform(Arc::new(FnTransform(func)))
    }

    pub fn transform_async<F, Fut>(self, func: F) -> Self
    where
        F: Fn(RawResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RequestError>> + Send + 'static,
    {
        self.transform(Arc::new(AsyncFnTransform {
            func,
            _future: PhantomData,
        }))
    }

    /// The display name is the only field that may change after construction.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body_value(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn cache_policy(&self) -> Option<CachePolicy> {
        self.cache
    }

    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Run the attached transform, or hand back the response body untouched.
    pub async fn transform_response(&self, response: RawResponse) -> Result<Value, RequestError> {
        match &self.transform {
            Some(transform) => transform.transform(response, self).await,
            None => Ok(response.body),
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("has_transform", &self.transform.is_some())
            .field("cache", &self.cache)
            .field("name", &self.name)
            .finish()
    }
}

type MethodResolver = Arc<dyn Fn(&[Value]) -> Method + Send + Sync>;

/// Either a literal descriptor or a function producing one from the send arguments.
#[derive(Clone)]
pub enum MethodSource {
    Literal(Method),
    Resolver(MethodResolver),
}

impl MethodSource {
    pub fn resolver<F>(func: F) -> Self
    where
        F: Fn(&[Value]) -> Method + Send + Sync + 'static,
    {
        MethodSource::Resolver(Arc::new(func))
    }

    /// Resolved once per attempt
    pub fn resolve(&self, args: &[Value]) -> Method {
        match self {
            MethodSource::Literal(method) => method.clone(),
            MethodSource::Resolver(resolver) => resolver(args),
        }
    }
}

impl From<Method> for MethodSource {
    fn from(method: Method) -> Self {
        MethodSource::Literal(method)
    }
}

impl fmt::Debug for MethodSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodSource::Literal(method) => f.debug_tuple("Literal").field(method).finish(),
            MethodSource::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}
