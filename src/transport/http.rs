//! HTTP transport backed by `reqwest`

use crate::config::TransportConfig;
use crate::error::{CourierError, RequestError};
use crate::method::{Method, RequestKind};
use crate::state::Progress;
use crate::transport::{ProgressHandlers, RawResponse, Transport, TransportCall};
use futures::future::{AbortHandle, Abortable, Aborted};
use futures::FutureExt;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sends methods over HTTP. Relative urls are joined onto the configured base url.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Option<String>,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, CourierError> {
        let mut builder = Client::builder();
        if config.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.timeout_ms));
        }
        let client = builder
            .build()
            .map_err(|e| CourierError::TransportSetup(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn with_client(client: Client, base_url: Option<String>) -> Self {
        Self { client, base_url }
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        match &self.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            ),
            None => url.to_string(),
        }
    }
}

fn http_method(kind: RequestKind) -> reqwest::Method {
    match kind {
        RequestKind::Get => reqwest::Method::GET,
        RequestKind::Post => reqwest::Method::POST,
        RequestKind::Put => reqwest::Method::PUT,
        RequestKind::Delete => reqwest::Method::DELETE,
        RequestKind::Patch => reqwest::Method::PATCH,
        RequestKind::Head => reqwest::Method::HEAD,
        RequestKind::Options => reqwest::Method::OPTIONS,
    }
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

impl Transport for ReqwestTransport {
    fn send(&self, method: &Method, progress: ProgressHandlers) -> TransportCall {
        let url = self.resolve_url(method.url());
        let params: Vec<(&String, &String)> = method.params().iter().collect();
        let mut request = self
            .client
            .request(http_method(method.kind()), &url)
            .query(&params);
        for (name, value) in method.headers() {
            request = request.header(name.as_str(), value.as_str());
        }

        let mut upload_total = 0u64;
        if let Some(body) = method.body_value() {
            let encoded = body.to_string();
            upload_total = encoded.len() as u64;
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(encoded);
        }

        debug!(kind = %method.kind(), url = %url, "Sending HTTP request");

        let call = async move {
            let mut response = request.send().await.map_err(RequestError::transport)?;
            (progress.on_upload)(Progress {
                loaded: upload_total,
                total: upload_total,
            });

            let status = response.status();
            let headers: BTreeMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            let total = response.content_length().unwrap_or(0);
            let mut loaded = 0u64;
            let mut bytes = Vec::new();
            while let Some(chunk) = response.chunk().await.map_err(RequestError::transport)? {
                loaded += chunk.len() as u64;
                bytes.extend_from_slice(&chunk);
                (progress.on_download)(Progress {
                    loaded,
                    total: total.max(loaded),
                });
            }

            if !status.is_success() {
                return Err(RequestError::Status {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("unknown").to_string(),
                });
            }

            Ok(RawResponse {
                status: status.as_u16(),
                headers,
                body: decode_body(&bytes),
            })
        };

        let (handle, registration) = AbortHandle::new_pair();
        let response = Abortable::new(call, registration)
            .map(|outcome| match outcome {
                Ok(result) => result,
                Err(Aborted) => Err(RequestError::Aborted),
            })
            .boxed();

        TransportCall {
            response,
            abort: Arc::new(move || handle.abort()),
        }
    }
}
