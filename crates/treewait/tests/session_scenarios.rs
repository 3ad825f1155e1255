//! End-to-end scenarios: interactions against a mounted tree, waits
//! synchronized with mocked network calls.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{events_payload, init_tracing, SearchApp};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use treewait::prelude::*;

const LIST_ITEM: &str = r#"[data-spec="list-item"]"#;
const SUBMIT: &str = r#"[data-spec="submit-search"]"#;

fn events_network(count: usize, delay_ms: u64) -> MockNetwork {
    MockNetworkBuilder::new()
        .get("/api/events", events_payload(count).with_delay(delay_ms))
        .build()
}

// ============================================================================
// Network-call waits
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_search_renders_every_returned_event() {
    init_tracing();
    let app = SearchApp::mount(events_network(5, 20), false);
    let session = app.session();

    assert!(session.find(LIST_ITEM).unwrap().is_empty());
    session.click(SUBMIT).unwrap();
    session
        .wait_for_api_call("/api/events", Some("GET"))
        .unwrap()
        .await;

    assert_eq!(session.find(LIST_ITEM).unwrap().len(), 5);
    assert!(app.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_typed_query_reaches_call_log() {
    init_tracing();
    let app = SearchApp::mount(events_network(1, 0), false);
    let session = app.session();

    session
        .change_value(
            r#"[data-spec="search-input"]"#,
            "rust meetups",
            ChangeOptions::new().with_focus().with_blur(),
        )
        .unwrap();
    session.click(SUBMIT).unwrap();
    session.wait_for_api_call("/api/events", None).unwrap().await;

    let calls = session.get_api_calls("/api/events", Some("get")).unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].url, "/api/events");
    assert_eq!(calls[0].params, json!({ "q": "rust meetups" }));
    assert!(session.get_api_calls("/api/events", Some("POST")).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_api_call_with_regex_pattern() {
    init_tracing();
    let app = SearchApp::mount(events_network(2, 5), false);
    let session = app.session();
    let pattern = regex::Regex::new(r"^/api/ev\w+$").unwrap();

    let wait = session.wait_for_api_call(&pattern, Some("GET")).unwrap();
    session.click(SUBMIT).unwrap();
    wait.await;
    assert_eq!(session.find(LIST_ITEM).unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cascading_calls_settle_before_resolution() {
    init_tracing();
    let network = MockNetworkBuilder::new()
        .get("/api/events/details", MockResponse::new().with_delay(40))
        .get("/api/events", events_payload(3).with_delay(10))
        .build();
    let app = SearchApp::mount(network, true);
    let session = app.session();

    session.click(SUBMIT).unwrap();
    // The follow-up call is issued by the first response's handler
    let result = session
        .wait_for_api_call("/api/events/details", Some("GET"))
        .unwrap()
        .await;

    assert_eq!(result.elapsed, Duration::from_millis(50));
    assert_eq!(session.find(r#"[data-spec="details"]"#).unwrap().len(), 1);
    assert_eq!(
        session.get_api_calls("/api/events/details", None).unwrap()[0].params,
        json!({ "count": 3 })
    );
}

#[tokio::test(start_paused = true)]
async fn test_no_premature_resolution_while_unrelated_call_pending() {
    init_tracing();
    let network = MockNetworkBuilder::new()
        .get("/api/slow", MockResponse::new().with_delay(500))
        .get("/api/events", events_payload(1).with_delay(10))
        .build();
    let app = SearchApp::mount(network, false);
    let session = app.session();
    let start = Instant::now();

    let _slow = app.network.fetch("GET", "/api/slow", json!(null)).unwrap();
    session.click(SUBMIT).unwrap();
    session
        .wait_for_api_call("/api/events", Some("GET"))
        .unwrap()
        .await;

    assert!(start.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_long_poll_issued_after_search_does_not_hold_wait() {
    init_tracing();
    let network = MockNetworkBuilder::new()
        .get("/api/events", events_payload(2).with_delay(10))
        .get("/api/longpoll", MockResponse::new().with_delay(1_000_000))
        .build();
    let app = SearchApp::mount(network, false);
    let session = app.session();

    let wait = session.wait_for_api_call("/api/events", Some("GET")).unwrap();
    session.click(SUBMIT).unwrap();
    let network = app.network.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _ = network.fetch("GET", "/api/longpoll", json!(null)).unwrap();
    });

    let result = tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .expect("search wait must resolve while the long poll is open");
    assert_eq!(result.elapsed, Duration::from_millis(10));
    assert_eq!(session.find(LIST_ITEM).unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_search_renders_error_instead_of_items() {
    init_tracing();
    let network = MockNetworkBuilder::new()
        .get("/api/events", MockResponse::error(500, "backend down").with_delay(10))
        .build();
    let app = SearchApp::mount(network, false);
    let session = app.session();

    session.click(SUBMIT).unwrap();
    session
        .wait_for_api_call("/api/events", Some("GET"))
        .unwrap()
        .await;

    assert!(session.find(LIST_ITEM).unwrap().is_empty());
    assert_eq!(session.find_spec("search-error", None, Some("p")).unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_api_waits_both_resolve() {
    init_tracing();
    let network = MockNetworkBuilder::new()
        .get("/api/events", events_payload(2).with_delay(10))
        .get("/api/users", MockResponse::new().with_delay(30))
        .build();
    let app = SearchApp::mount(network, false);
    let session = app.session();

    let events = session.wait_for_api_call("/api/events", Some("GET")).unwrap();
    let users = session.wait_for_api_call("/api/users", Some("GET")).unwrap();
    assert_eq!(app.network.holding_promises().listener_count(), 2);

    session.click(SUBMIT).unwrap();
    let network = app.network.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = network.fetch("GET", "/api/users", json!(null)).unwrap();
    });

    let (first, second) = tokio::join!(events, users);
    assert!(first.elapsed < second.elapsed);
    assert_eq!(app.network.holding_promises().listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_api_wait_never_times_out_on_its_own() {
    init_tracing();
    let app = SearchApp::mount(events_network(1, 0), false);
    let session = app.session();

    let wait = session.wait_for_api_call("/api/never", None).unwrap();
    session.click(SUBMIT).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(30), wait).await;
    assert!(outcome.is_err());
}

// ============================================================================
// Element waits
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_list_items_after_click() {
    init_tracing();
    let app = SearchApp::mount(events_network(4, 120), false);
    let session = app.session();

    session.click(SUBMIT).unwrap();
    let result = session.wait_for(LIST_ITEM, None).unwrap().await.unwrap();
    assert_eq!(result.elapsed, Duration::from_millis(150));
    assert_eq!(session.find_spec("list-item", None, Some("li")).unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_spec_scoped_lookup() {
    init_tracing();
    let app = SearchApp::mount(events_network(3, 10), false);
    let session = app.session();

    session.click(SUBMIT).unwrap();
    session.wait_for_spec("list-item", None).unwrap().await.unwrap();
    let list = session.find_spec("event-list", None, None).unwrap();
    assert_eq!(list, vec![app.list]);
    assert_eq!(
        session
            .find_spec_path(&["event-list", "list-item"], None, None)
            .unwrap()
            .len(),
        3
    );
    assert!(session
        .find_spec_path(&["search-form", "list-item"], None, None)
        .unwrap()
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_missing_element_names_selector() {
    init_tracing();
    let app = SearchApp::mount(MockNetwork::new(), false);
    let session = app.session();

    let err = session
        .wait_for(".never-appears", Some(Duration::from_millis(100)))
        .unwrap()
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains(".never-appears"), "{message}");
    assert!(err.elapsed_ms().unwrap() >= 100);
}

#[tokio::test(start_paused = true)]
async fn test_configured_timeout_from_yaml() {
    init_tracing();
    let app = SearchApp::mount(MockNetwork::new(), false);
    let config = SessionConfig::from_yaml("wait_timeout_ms: 200\n").unwrap();
    let session = Session::with_config(app.network.clone(), app.tree.clone(), config).unwrap();

    let err = session
        .wait_for_spec("never", None)
        .unwrap()
        .await
        .unwrap_err();
    assert_eq!(err.elapsed_ms(), Some(250));
}

// ============================================================================
// Catch-all and construction
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unmocked_call_fails_loudly() {
    init_tracing();
    let app = SearchApp::mount(events_network(1, 0), false);
    let session = app.session();

    session
        .click(r#"[data-spec="load-unexpected"]"#)
        .unwrap();
    let errors = app.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("/api/unexpected"));
    assert!(errors[0].contains("POST"));
    // The attempt is still on record
    assert_eq!(session.get_api_calls("/api/unexpected", Some("POST")).unwrap().len(), 1);
}

#[test]
fn test_construction_rejects_unusable_collaborators() {
    let stopped = Arc::new(MockNetwork::new());
    stopped.stop();
    assert!(matches!(
        Session::new(stopped, Arc::new(VirtualTree::new())).unwrap_err(),
        HarnessError::InvalidNetworkMock { .. }
    ));
    assert!(matches!(
        Session::new(Arc::new(MockNetwork::new()), Arc::new(VirtualTree::unmounted())).unwrap_err(),
        HarnessError::InvalidComponent { .. }
    ));
}

#[test]
fn test_interactions_target_host_nodes_only() {
    let app = SearchApp::mount(MockNetwork::new(), false);
    let session = app.session();
    // SearchPage is a composite; it is never a target
    assert!(matches!(
        session.click("SearchPage").unwrap_err(),
        HarnessError::NodeCount { found: 0, .. }
    ));
    assert_eq!(session.find("SearchPage input").unwrap(), vec![app.input]);
    assert_eq!(session.find("form > button").unwrap(), vec![app.submit]);
}
