//! Property-based tests for request identity

use courier::{KeyGenerator, Method, RequestKind};
use proptest::prelude::*;
use serde_json::json;

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}"
}

/// Param insertion order never changes the key
#[test]
fn test_param_order_independence_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &prop::collection::btree_map(name_strategy(), any::<String>(), 0..8),
            |params| {
                let forward = params
                    .iter()
                    .fold(Method::get("/search"), |m, (k, v)| m.param(k, v));
                let backward = params
                    .iter()
                    .rev()
                    .fold(Method::get("/search"), |m, (k, v)| m.param(k, v));

                prop_assert_eq!(KeyGenerator::key(&forward), KeyGenerator::key(&backward));
                Ok(())
            },
        )
        .unwrap();
}

/// Header name case and the display name never change the key
#[test]
fn test_presentation_independence_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(name_strategy(), "[ -~]{0,16}", any::<String>()),
            |(header, value, display)| {
                let lower = Method::get("/users").header(header.to_lowercase(), value.clone());
                let upper = Method::get("/users")
                    .header(header.to_uppercase(), value)
                    .name(display);

                prop_assert_eq!(KeyGenerator::key(&lower), KeyGenerator::key(&upper));
                Ok(())
            },
        )
        .unwrap();
}

/// Distinct urls produce distinct keys
#[test]
fn test_url_sensitivity_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&("/[a-z0-9/]{1,24}", "/[a-z0-9/]{1,24}"), |(a, b)| {
            prop_assume!(a != b);
            let key_a = KeyGenerator::key(&Method::get(a));
            let key_b = KeyGenerator::key(&Method::get(b));
            prop_assert_ne!(key_a, key_b);
            Ok(())
        })
        .unwrap();
}

/// Request kind and body take part in the key
#[test]
fn test_kind_and_body_sensitivity_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(any::<i64>(), any::<i64>()), |(x, y)| {
            prop_assume!(x != y);
            let post_x = Method::post("/items", json!({ "n": x }));
            let post_y = Method::post("/items", json!({ "n": y }));
            let put_x = Method::new(RequestKind::Put, "/items").body(json!({ "n": x }));

            prop_assert_ne!(KeyGenerator::key(&post_x), KeyGenerator::key(&post_y));
            prop_assert_ne!(KeyGenerator::key(&post_x), KeyGenerator::key(&put_x));
            prop_assert_eq!(
                KeyGenerator::key(&post_x),
                KeyGenerator::key(&Method::post("/items", json!({ "n": x })))
            );
            Ok(())
        })
        .unwrap();
}
