//! Integration tests for entering orchestrators, sending and lifecycle events

use courier::state::{StateValue, LOADING};
use courier::{
    CompleteStatus, HookConfig, MemoryStateAdapter, Method, MethodSource, RequestError,
    StatePatch,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::integration::test_utils::{courier, settle, wait_until};
use crate::integration::MockTransport;

#[tokio::test]
async fn test_immediate_without_cache_starts_loading() {
    let transport = Arc::new(MockTransport::new().reply("/users", json!(["ada", "grace"])));
    let courier = courier(transport.clone());
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));

    let exposure = orchestrator.use_request(Method::get("/users"), HookConfig::new());
    assert!(exposure.loading.flag());
    assert_eq!(exposure.data.data(), Value::Null);

    wait_until(|| !exposure.loading.flag()).await;
    assert_eq!(exposure.data.data(), json!(["ada", "grace"]));
    assert_eq!(exposure.error.error(), None);
    assert_eq!(transport.calls("/users"), 1);
}

#[tokio::test]
async fn test_cached_entry_starts_idle_and_skips_transport() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport.clone());
    let method = Method::get("/users");
    courier.set_cache(&method, json!(["cached"]));

    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let exposure = orchestrator.use_request(method, HookConfig::new());
    assert!(!exposure.loading.flag());
    assert_eq!(exposure.data.data(), json!(["cached"]));

    settle().await;
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn test_force_starts_loading_regardless_of_cache() {
    let transport = Arc::new(MockTransport::new().reply("/users", json!(["fresh"])));
    let courier = courier(transport.clone());
    let method = Method::get("/users");
    courier.set_cache(&method, json!(["cached"]));

    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let exposure = orchestrator.use_request(method, HookConfig::new().force(true));
    assert!(exposure.loading.flag());

    wait_until(|| !exposure.loading.flag()).await;
    assert_eq!(exposure.data.data(), json!(["fresh"]));
    assert_eq!(transport.calls("/users"), 1);
}

#[tokio::test]
async fn test_not_immediate_starts_idle_with_initial_data() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport.clone());
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));

    let exposure = orchestrator.use_request(
        Method::get("/users"),
        HookConfig::new().immediate(false).initial_data(json!([])),
    );
    assert!(!exposure.loading.flag());
    assert_eq!(exposure.data.data(), json!([]));

    settle().await;
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn test_success_dispatches_handlers_in_order() {
    let transport = Arc::new(MockTransport::new().reply("/todos", json!({"count": 3})));
    let courier = courier(transport.clone());
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let exposure = orchestrator.use_request(Method::get("/todos"), HookConfig::new().immediate(false));

    let log = Arc::new(Mutex::new(Vec::new()));
    let l = log.clone();
    exposure.on_success(move |event| {
        assert!(!event.from_cache);
        assert_eq!(event.send_args, vec![json!(7)]);
        l.lock().unwrap().push(format!("success:{}", event.data));
    });
    let l = log.clone();
    exposure.on_success(move |_| l.lock().unwrap().push("success:second".to_string()));
    let l = log.clone();
    exposure.on_complete(move |event| {
        assert_eq!(event.status, CompleteStatus::Success);
        l.lock().unwrap().push("complete".to_string());
    });

    let value = exposure.send(vec![json!(7)]).await.unwrap();
    assert_eq!(value, json!({"count": 3}));
    assert_eq!(exposure.data.data(), json!({"count": 3}));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["success:{\"count\":3}", "success:second", "complete"]
    );
}

#[tokio::test]
async fn test_transform_rejection_sets_error_and_notifies_once() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport.clone());
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let method = Method::get("/boom").transform_with(|_, _| Err(RequestError::transform("boom")));
    let exposure = orchestrator.use_request(method, HookConfig::new().immediate(false));

    let errors = Arc::new(AtomicUsize::new(0));
    let completes = Arc::new(AtomicUsize::new(0));
    let e = errors.clone();
    exposure.on_error(move |event| {
        assert_eq!(event.error, RequestError::transform("boom"));
        e.fetch_add(1, Ordering::SeqCst);
    });
    let c = completes.clone();
    exposure.on_complete(move |event| {
        assert_eq!(event.status, CompleteStatus::Error);
        c.fetch_add(1, Ordering::SeqCst);
    });

    let result = exposure.send(Vec::new()).await;
    assert_eq!(result, Err(RequestError::transform("boom")));
    assert_eq!(exposure.error.error(), Some(RequestError::transform("boom")));
    assert!(!exposure.loading.flag());
    assert_eq!(exposure.data.data(), Value::Null);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(completes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_effect_rejection_is_swallowed() {
    let transport = Arc::new(
        MockTransport::new().fail("/down", RequestError::transport("connection refused")),
    );
    let courier = courier(transport.clone());
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));

    let exposure = orchestrator.use_request(Method::get("/down"), HookConfig::new());
    wait_until(|| !exposure.loading.flag()).await;
    assert_eq!(
        exposure.error.error(),
        Some(RequestError::transport("connection refused"))
    );

    // The same failure surfaces when sent directly
    let result = exposure.send(Vec::new()).await;
    assert_eq!(result, Err(RequestError::transport("connection refused")));
}

#[tokio::test]
async fn test_reentry_replaces_handler_lists() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport.clone());
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let config = HookConfig::new().immediate(false);

    let stale = Arc::new(AtomicUsize::new(0));
    let first = orchestrator.use_request(Method::get("/users"), config.clone());
    let s = stale.clone();
    first.on_success(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    let fresh = Arc::new(AtomicUsize::new(0));
    let second = orchestrator.use_request(Method::get("/users"), config);
    let f = fresh.clone();
    second.on_success(move |_| {
        f.fetch_add(1, Ordering::SeqCst);
    });

    second.send(Vec::new()).await.unwrap();
    assert_eq!(stale.load(Ordering::SeqCst), 0);
    assert_eq!(fresh.load(Ordering::SeqCst), 1);

    // Both entries expose the same underlying states
    assert_eq!(first.data.id(), second.data.id());
}

#[tokio::test]
async fn test_update_fetching_is_loading() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport);
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let exposure = orchestrator.use_request(Method::get("/users"), HookConfig::new().immediate(false));

    exposure.update(StatePatch::new().fetching(true));
    assert!(exposure.loading.flag());
    assert!(exposure.fetching().flag());

    exposure.update(StatePatch::new().loading(false));
    assert!(!exposure.fetching().flag());

    exposure.update(StatePatch::new().set(LOADING, StateValue::Flag(true)).data(json!(1)));
    assert!(exposure.loading.flag());
    assert_eq!(exposure.data.data(), json!(1));
}

#[tokio::test]
async fn test_non_interactive_adapter_registers_no_effect() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport.clone());
    let adapter = Arc::new(MemoryStateAdapter::non_interactive());
    let orchestrator = courier.orchestrator(adapter.clone());

    let exposure = orchestrator.use_request(Method::get("/users"), HookConfig::new());
    settle().await;
    assert_eq!(adapter.mounted(), 0);
    assert_eq!(transport.total_calls(), 0);

    // Direct sends still work
    exposure.send(Vec::new()).await.unwrap();
    assert_eq!(transport.calls("/users"), 1);
}

#[tokio::test]
async fn test_non_interactive_sends_leave_no_bindings() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport.clone());
    let adapter = Arc::new(MemoryStateAdapter::non_interactive());
    let orchestrator = courier.orchestrator(adapter.clone());

    let exposure = orchestrator.use_request(Method::get("/users"), HookConfig::new());
    for page in 0..3 {
        exposure
            .send_method(Method::get("/users").param("page", page.to_string()), Vec::new())
            .await
            .unwrap();
    }

    assert!(!courier.is_bound(&Method::get("/users")));
    assert!(!courier.is_bound(&Method::get("/users").param("page", "2")));
    assert!(!courier.update_state(&Method::get("/users").param("page", "2"), |data| data.clone()));
}

#[tokio::test]
async fn test_resolver_receives_send_arguments() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport.clone());
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let source = MethodSource::resolver(|args| {
        let id = args.first().and_then(Value::as_u64).unwrap_or(0);
        Method::get(format!("/users/{id}"))
    });
    let exposure = orchestrator.use_request(source, HookConfig::new().immediate(false));

    let value = exposure.send(vec![json!(42)]).await.unwrap();
    assert_eq!(value, json!({"url": "/users/42"}));
    assert_eq!(transport.call_log(), vec!["/users/42"]);
}

#[tokio::test]
async fn test_extra_states_are_exposed_and_updatable() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport);
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let exposure = orchestrator.use_request(
        Method::get("/users"),
        HookConfig::new()
            .immediate(false)
            .extra_state("page", StateValue::Data(json!(1))),
    );

    assert_eq!(exposure.extra["page"].data(), json!(1));
    exposure.update(StatePatch::new().set("page", StateValue::Data(json!(2))));
    assert_eq!(exposure.extra["page"].data(), json!(2));
}

#[tokio::test]
async fn test_download_progress_reaches_state() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport);
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let exposure = orchestrator.use_request(Method::get("/file"), HookConfig::new().immediate(false));

    exposure.send(Vec::new()).await.unwrap();
    let progress = exposure.downloading.progress();
    assert_eq!((progress.loaded, progress.total), (1, 1));
}

#[tokio::test]
async fn test_send_before_enter_is_rejected() {
    let transport = Arc::new(MockTransport::new());
    let courier = courier(transport);
    let orchestrator = courier.orchestrator(Arc::new(MemoryStateAdapter::new()));
    let result = orchestrator.send(Vec::new(), None, false).await;
    assert_eq!(result, Err(RequestError::NotEntered));
}
