//! Shared fixtures for integration tests: a tiny search app rendered into
//! a `VirtualTree` and wired to a `MockNetwork`.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;
use treewait::prelude::*;

/// Install a test subscriber once; honors `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Response body listing `count` events
pub fn events_payload(count: usize) -> MockResponse {
    let events: Vec<Value> = (0..count)
        .map(|i| json!({ "id": i, "title": format!("Event {i}") }))
        .collect();
    MockResponse::json(&events).unwrap()
}

/// Mounted search app
///
/// ```text
/// Root
/// └── SearchPage (composite)
///     ├── form[data-spec=search-form]
///     │   ├── input[data-spec=search-input]
///     │   └── button[data-spec=submit-search]
///     ├── button[data-spec=load-unexpected]
///     └── ul[data-spec=event-list]
/// ```
///
/// Clicking `submit-search` issues `GET /api/events` with the typed query
/// and renders one `li[data-spec=list-item]` per returned event, or a
/// `p[data-spec=search-error]` when the response is not a success. With
/// `with_details`, each rendered list triggers `GET /api/events/details`
/// which renders a `p[data-spec=details]`.
pub struct SearchApp {
    pub network: Arc<MockNetwork>,
    pub tree: Arc<VirtualTree>,
    pub input: NodeId,
    pub submit: NodeId,
    pub list: NodeId,
    pub errors: Arc<Mutex<Vec<HarnessError>>>,
}

impl SearchApp {
    pub fn mount(network: MockNetwork, with_details: bool) -> Self {
        let network = Arc::new(network);
        let tree = Arc::new(VirtualTree::new());
        let page = tree.append(tree.root_id(), ElementInfo::composite("SearchPage"));
        let form = tree.append(
            page,
            ElementInfo::host("form").with_attr("data-spec", "search-form"),
        );
        let input = tree.append(
            form,
            ElementInfo::host("input")
                .with_attr("data-spec", "search-input")
                .with_attr("type", "text"),
        );
        let submit = tree.append(
            form,
            ElementInfo::host("button").with_attr("data-spec", "submit-search"),
        );
        let unexpected = tree.append(
            page,
            ElementInfo::host("button").with_attr("data-spec", "load-unexpected"),
        );
        let list = tree.append(
            page,
            ElementInfo::host("ul").with_attr("data-spec", "event-list"),
        );
        tree.update();

        let errors = Arc::new(Mutex::new(Vec::new()));
        let query = Arc::new(Mutex::new(String::new()));

        let typed = query.clone();
        tree.on(input, "change", move |_, event| {
            if let UiEvent::Change { value } = event {
                *typed.lock().unwrap() = value.clone();
            }
        });

        let (net, view, sink) = (network.clone(), tree.clone(), errors.clone());
        tree.on(submit, "click", move |_, _| {
            let params = json!({ "q": query.lock().unwrap().clone() });
            let (inner_net, inner_view, inner_sink) = (net.clone(), view.clone(), sink.clone());
            let issued = net.fetch_then("GET", "/api/events", params, move |response| async move {
                if !response.is_success() {
                    inner_view.append(
                        list,
                        ElementInfo::host("p").with_attr("data-spec", "search-error"),
                    );
                    return;
                }
                let events: Vec<Value> = response.body_json().unwrap_or_default();
                for event in &events {
                    inner_view.append(
                        list,
                        ElementInfo::host("li")
                            .with_attr("data-spec", "list-item")
                            .with_attr("data-id", event["id"].to_string()),
                    );
                }
                if with_details {
                    let view = inner_view.clone();
                    let details = inner_net.fetch_then(
                        "GET",
                        "/api/events/details",
                        json!({ "count": events.len() }),
                        move |_| async move {
                            view.append(list, ElementInfo::host("p").with_attr("data-spec", "details"));
                        },
                    );
                    if let Err(e) = details {
                        inner_sink.lock().unwrap().push(e);
                    }
                }
            });
            if let Err(e) = issued {
                sink.lock().unwrap().push(e);
            }
        });

        let (net, sink) = (network.clone(), errors.clone());
        tree.on(unexpected, "click", move |_, _| {
            if let Err(e) = net.fetch("POST", "/api/unexpected", Value::Null) {
                sink.lock().unwrap().push(e);
            }
        });

        Self {
            network,
            tree,
            input,
            submit,
            list,
            errors,
        }
    }

    pub fn session(&self) -> Session {
        Session::new(self.network.clone(), self.tree.clone()).unwrap()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().iter().map(ToString::to_string).collect()
    }
}
