//! Integration tests for watched inputs and debounced re-sends

use courier::state::StateValue;
use courier::{DebounceDelay, HookConfig, MemoryStateAdapter, Method, MethodSource};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::advance;

use crate::integration::test_utils::settle;
use crate::integration::{test_utils, MockTransport};

#[tokio::test(start_paused = true)]
async fn test_debounced_watcher_sends_once_with_last_input() {
    let transport = Arc::new(MockTransport::new());
    let courier = test_utils::courier(transport.clone());
    let adapter = Arc::new(MemoryStateAdapter::new());
    let keyword = adapter.state(StateValue::Data(json!("")));

    let watched = keyword.clone();
    let source = MethodSource::resolver(move |_| {
        let q = watched.data().as_str().unwrap_or_default().to_string();
        Method::get("/search").param("q", q.clone()).name(q)
    });
    let orchestrator = courier.orchestrator(adapter.clone());
    let exposure = orchestrator.use_watcher(
        source,
        vec![keyword.clone()],
        HookConfig::new().debounce(DebounceDelay::millis(10)),
    );
    assert!(!exposure.loading.flag());

    adapter.set(&keyword, StateValue::Data(json!("a")));
    advance(Duration::from_millis(5)).await;
    adapter.set(&keyword, StateValue::Data(json!("ab")));
    advance(Duration::from_millis(3)).await;
    adapter.set(&keyword, StateValue::Data(json!("abc")));

    advance(Duration::from_millis(9)).await;
    settle().await;
    assert_eq!(transport.total_calls(), 0);

    advance(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(transport.total_calls(), 1);
    assert_eq!(exposure.data.data(), json!({"url": "/search"}));
    let sent = transport.last_method().unwrap();
    assert_eq!(sent.params()["q"], "abc");
    assert_eq!(sent.display_name(), Some("abc"));

    // Superseded triggers never reach the transport
    advance(Duration::from_millis(50)).await;
    settle().await;
    assert_eq!(transport.total_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_per_index_delays_follow_changed_input() {
    let transport = Arc::new(MockTransport::new());
    let courier = test_utils::courier(transport.clone());
    let adapter = Arc::new(MemoryStateAdapter::new());
    let slow = adapter.state(StateValue::Data(json!(0)));
    let fast = adapter.state(StateValue::Data(json!(0)));

    let orchestrator = courier.orchestrator(adapter.clone());
    let _exposure = orchestrator.use_watcher(
        Method::get("/items").cache(courier::CachePolicy::disabled()),
        vec![slow.clone(), fast.clone()],
        HookConfig::new().debounce(DebounceDelay::per_index_millis(&[100, 0])),
    );

    adapter.set(&fast, StateValue::Data(json!(1)));
    settle().await;
    assert_eq!(transport.total_calls(), 1);

    adapter.set(&slow, StateValue::Data(json!(1)));
    advance(Duration::from_millis(99)).await;
    settle().await;
    assert_eq!(transport.total_calls(), 1);

    advance(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(transport.total_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_watcher_is_not_debounced() {
    let transport = Arc::new(MockTransport::new());
    let courier = test_utils::courier(transport.clone());
    let adapter = Arc::new(MemoryStateAdapter::new());
    let page = adapter.state(StateValue::Data(json!(1)));

    let orchestrator = courier.orchestrator(adapter.clone());
    let exposure = orchestrator.use_watcher(
        Method::get("/page"),
        vec![page],
        HookConfig::new()
            .immediate(true)
            .debounce(DebounceDelay::millis(500)),
    );
    assert!(exposure.loading.flag());

    settle().await;
    assert_eq!(transport.calls("/page"), 1);
    assert!(!exposure.loading.flag());
}

#[tokio::test(start_paused = true)]
async fn test_empty_watch_list_is_still_a_watcher() {
    let transport = Arc::new(MockTransport::new());
    let courier = test_utils::courier(transport.clone());
    let adapter = Arc::new(MemoryStateAdapter::new());

    let orchestrator = courier.orchestrator(adapter.clone());
    let exposure = orchestrator.use_watcher(Method::get("/static"), Vec::new(), HookConfig::new());
    settle().await;

    // Watchers default to not immediate
    assert!(!exposure.loading.flag());
    assert_eq!(transport.total_calls(), 0);
    assert_eq!(adapter.mounted(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_cancels_pending_trigger() {
    let transport = Arc::new(MockTransport::new());
    let courier = test_utils::courier(transport.clone());
    let adapter = Arc::new(MemoryStateAdapter::new());
    let input = adapter.state(StateValue::Data(json!(0)));

    let orchestrator = courier.orchestrator(adapter.clone());
    let _exposure = orchestrator.use_watcher(
        Method::get("/items"),
        vec![input.clone()],
        HookConfig::new().debounce(DebounceDelay::millis(20)),
    );

    adapter.set(&input, StateValue::Data(json!(1)));
    assert!(adapter.unmount(orchestrator.hook_id()));

    advance(Duration::from_millis(50)).await;
    settle().await;
    assert_eq!(transport.total_calls(), 0);
}
