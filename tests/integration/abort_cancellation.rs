//! Integration tests for aborting in-flight attempts

use courier::{HookConfig, MemoryStateAdapter, Method, RequestError};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::integration::test_utils::{courier, settle};
use crate::integration::MockTransport;

#[tokio::test(start_paused = true)]
async fn test_abort_rejects_in_flight_attempt() {
    let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(100)));
    let courier = courier(transport.clone());
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let exposure = orchestrator.use_request(Method::get("/slow"), HookConfig::new().immediate(false));

    let errors = Arc::new(AtomicUsize::new(0));
    let e = errors.clone();
    exposure.on_error(move |event| {
        assert!(event.error.is_abort());
        e.fetch_add(1, Ordering::SeqCst);
    });

    let sender = exposure.clone();
    let attempt = tokio::spawn(async move { sender.send(Vec::new()).await });
    settle().await;
    assert!(exposure.loading.flag());
    assert!(orchestrator.is_in_flight());

    exposure.abort();
    let result = attempt.await.unwrap();
    assert_eq!(result, Err(RequestError::Aborted));
    assert_eq!(
        result.unwrap_err().to_string(),
        "The user aborted a request"
    );
    assert!(!exposure.loading.flag());
    assert_eq!(exposure.error.error(), Some(RequestError::Aborted));
    assert_eq!(transport.aborts(), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert!(!orchestrator.is_in_flight());
}

#[tokio::test]
async fn test_abort_when_idle_is_noop() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport.clone());
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let exposure = orchestrator.use_request(Method::get("/users"), HookConfig::new().immediate(false));

    exposure.abort();
    assert!(!exposure.loading.flag());
    assert_eq!(exposure.error.error(), None);
    assert_eq!(transport.aborts(), 0);

    // A later attempt is unaffected
    let value = exposure.send(Vec::new()).await.unwrap();
    assert_eq!(value, json!({"url": "/users"}));
}

#[tokio::test(start_paused = true)]
async fn test_abort_discards_running_transform() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport.clone());
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let method = Method::get("/report").transform_async(|raw| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(raw.body)
    });
    let exposure = orchestrator.use_request(method, HookConfig::new().immediate(false));

    let sender = exposure.clone();
    let attempt = tokio::spawn(async move { sender.send(Vec::new()).await });
    settle().await;
    assert_eq!(transport.calls("/report"), 1);

    exposure.abort();
    let result = attempt.await.unwrap();
    assert_eq!(result, Err(RequestError::Aborted));
    assert_eq!(exposure.data.data(), serde_json::Value::Null);
    assert!(courier.get_cache(&Method::get("/report")).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_abort_survives_reentry() {
    let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(100)));
    let courier = courier(transport.clone());
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let config = HookConfig::new().immediate(false);
    let exposure = orchestrator.use_request(Method::get("/slow"), config.clone());

    let sender = exposure.clone();
    let attempt = tokio::spawn(async move { sender.send(Vec::new()).await });
    settle().await;

    // The host re-evaluates while the request is still running
    let reentered = orchestrator.use_request(Method::get("/slow"), config);
    reentered.abort();

    assert_eq!(attempt.await.unwrap(), Err(RequestError::Aborted));
    assert_eq!(transport.aborts(), 1);
}
