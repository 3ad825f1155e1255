//! Network mocking.
//!
//! The harness never performs real I/O. The mocked app sends its calls
//! through a [`NetworkMock`], which records them, answers them from a
//! route table and tracks each in-flight call in a [`HoldingRegistry`]
//! so waits can synchronize with outstanding responses.
//!
//! Calls no route answers hit a catch-all rule that is always evaluated
//! last and fails loudly with the offending method and URL.

use crate::holding::{HoldingPromise, HoldingRegistry};
use crate::result::{HarnessError, HarnessResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// HTTP methods for route matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
    /// PATCH request
    Patch,
    /// HEAD request
    Head,
    /// OPTIONS request
    Options,
    /// Any method
    Any,
}

impl HttpMethod {
    /// Parse from string, case-insensitively; unknown names become `Any`
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            _ => Self::Any,
        }
    }

    /// Convert to string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "*",
        }
    }

    /// Check if this method accepts a call made with `name`
    #[must_use]
    pub fn accepts(&self, name: &str) -> bool {
        *self == Self::Any || self.as_str().eq_ignore_ascii_case(name)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A mocked HTTP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
    /// Artificial delay in milliseconds, counted from when the call is issued
    pub delay_ms: u64,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            status: 200,
            body: Vec::new(),
            delay_ms: 0,
        }
    }
}

impl MockResponse {
    /// Create a new mock response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON response
    pub fn json<T: Serialize>(data: &T) -> HarnessResult<Self> {
        Ok(Self {
            body: serde_json::to_vec(data)?,
            ..Self::default()
        })
    }

    /// Create an error response
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self {
            status,
            body: body.into_bytes(),
            ..Self::default()
        }
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Delay delivery by `delay_ms` milliseconds
    #[must_use]
    pub const fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Parse body as JSON
    pub fn body_json<T: for<'de> Deserialize<'de>>(&self) -> HarnessResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Check for a 2xx status
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Pattern for matching call URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlPattern {
    /// Exact URL match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// Contains substring
    Contains(String),
    /// Regex match
    Regex(String),
    /// Glob pattern (e.g., "*/api/users/*"); `*` spans any run of characters
    Glob(String),
    /// Match any URL
    Any,
}

impl UrlPattern {
    /// Reject patterns that can never match as intended
    pub fn validate(&self) -> HarnessResult<()> {
        let invalid = |pattern: &str, reason: String| HarnessError::InvalidEndpointPattern {
            pattern: pattern.to_string(),
            reason,
        };
        match self {
            Self::Regex(pattern) => regex::Regex::new(pattern)
                .map(|_| ())
                .map_err(|e| invalid(pattern, e.to_string())),
            Self::Exact(pattern) | Self::Prefix(pattern) | Self::Contains(pattern)
            | Self::Glob(pattern)
                if pattern.is_empty() =>
            {
                Err(invalid(pattern, "pattern is empty".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Validate and compile for repeated matching
    pub fn compile(self) -> HarnessResult<UrlMatcher> {
        self.validate()?;
        Ok(UrlMatcher::new(self))
    }
}

impl std::fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(s) | Self::Prefix(s) | Self::Contains(s) | Self::Glob(s) => {
                write!(f, "{s}")
            }
            Self::Regex(s) => write!(f, "/{s}/"),
            Self::Any => write!(f, "*"),
        }
    }
}

impl From<&str> for UrlPattern {
    fn from(url: &str) -> Self {
        Self::Exact(url.to_string())
    }
}

impl From<String> for UrlPattern {
    fn from(url: String) -> Self {
        Self::Exact(url)
    }
}

impl From<&regex::Regex> for UrlPattern {
    fn from(re: &regex::Regex) -> Self {
        Self::Regex(re.as_str().to_string())
    }
}

impl From<regex::Regex> for UrlPattern {
    fn from(re: regex::Regex) -> Self {
        Self::from(&re)
    }
}

/// A [`UrlPattern`] with its regex or glob compiled once
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    pattern: UrlPattern,
    compiled: Option<regex::Regex>,
}

impl UrlMatcher {
    /// Compile `pattern`; an uncompilable regex matches nothing
    ///
    /// Use [`UrlPattern::compile`] to surface the error instead.
    #[must_use]
    pub fn new(pattern: UrlPattern) -> Self {
        let compiled = match &pattern {
            UrlPattern::Regex(source) => regex::Regex::new(source).ok(),
            UrlPattern::Glob(glob) => glob_regex(glob),
            _ => None,
        };
        Self { pattern, compiled }
    }

    /// The pattern this matcher was built from
    #[must_use]
    pub const fn pattern(&self) -> &UrlPattern {
        &self.pattern
    }

    /// Check if a URL matches
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match &self.pattern {
            UrlPattern::Exact(pattern) => url == pattern,
            UrlPattern::Prefix(pattern) => url.starts_with(pattern.as_str()),
            UrlPattern::Contains(pattern) => url.contains(pattern.as_str()),
            UrlPattern::Regex(_) | UrlPattern::Glob(_) => {
                self.compiled.as_ref().is_some_and(|re| re.is_match(url))
            }
            UrlPattern::Any => true,
        }
    }
}

impl From<UrlPattern> for UrlMatcher {
    fn from(pattern: UrlPattern) -> Self {
        Self::new(pattern)
    }
}

impl std::fmt::Display for UrlMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.pattern, f)
    }
}

/// Anchored regex for a glob; literal runs are escaped, `*` spans anything
fn glob_regex(glob: &str) -> Option<regex::Regex> {
    let body: Vec<String> = glob.split('*').map(regex::escape).collect();
    regex::Regex::new(&format!("^(?s:{})$", body.join(".*"))).ok()
}

/// One call the mocked app issued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Requested URL
    pub url: String,
    /// HTTP method as sent by the app
    pub method: String,
    /// Request parameters (body, query, headers...) as the app passed them
    pub params: serde_json::Value,
    /// How many holding promises, oldest first, must settle before this
    /// call's response counts as delivered
    ///
    /// A held call's own promise is the last of them.
    #[serde(default)]
    pub settles_after: usize,
}

impl CallRecord {
    /// Create a call record
    #[must_use]
    pub fn new(method: &str, url: &str, params: serde_json::Value) -> Self {
        Self {
            url: url.to_string(),
            method: method.to_string(),
            params,
            settles_after: 0,
        }
    }

    /// Check against an endpoint pattern and optional method, case-insensitively
    #[must_use]
    pub fn matches(&self, pattern: &UrlMatcher, method: Option<&str>) -> bool {
        pattern.matches(&self.url) && method.map_or(true, |m| self.method.eq_ignore_ascii_case(m))
    }

    /// Check whether this call was delivered once `settled` promises settled
    #[must_use]
    pub const fn is_settled_by(&self, settled: usize) -> bool {
        self.settles_after <= settled
    }
}

/// URL and parameters of a matching call, as returned by `get_api_calls`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    /// Requested URL
    pub url: String,
    /// Request parameters
    pub params: serde_json::Value,
}

/// Calls matching `pattern` and `method`, in record order
#[must_use]
pub fn filter_calls(calls: &[CallRecord], pattern: &UrlMatcher, method: Option<&str>) -> Vec<ApiCall> {
    calls
        .iter()
        .filter(|call| call.matches(pattern, method))
        .map(|call| ApiCall {
            url: call.url.clone(),
            params: call.params.clone(),
        })
        .collect()
}

/// A route definition
#[derive(Debug, Clone)]
pub struct Route {
    /// URL pattern to match
    pub pattern: UrlMatcher,
    /// HTTP method to match
    pub method: HttpMethod,
    /// Response to return
    pub response: MockResponse,
    /// Number of times this route should be used (None = unlimited)
    pub times: Option<usize>,
    /// Number of times this route has been matched
    pub match_count: usize,
}

impl Route {
    /// Create a new route
    #[must_use]
    pub fn new(pattern: impl Into<UrlPattern>, method: HttpMethod, response: MockResponse) -> Self {
        Self {
            pattern: UrlMatcher::new(pattern.into()),
            method,
            response,
            times: None,
            match_count: 0,
        }
    }

    /// Set how many times this route should match
    #[must_use]
    pub const fn times(mut self, n: usize) -> Self {
        self.times = Some(n);
        self
    }

    /// Check if this route answers a call
    #[must_use]
    pub fn matches(&self, url: &str, method: &str) -> bool {
        !self.is_exhausted() && self.pattern.matches(url) && self.method.accepts(method)
    }

    /// Check if route is exhausted
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.times.is_some_and(|max| self.match_count >= max)
    }
}

/// Response of one mocked call; cloneable, resolves after the route's delay
pub type ResponseFuture = Shared<BoxFuture<'static, MockResponse>>;

/// Capability a network mock must offer the harness
pub trait NetworkMock: Send + Sync {
    /// Whether calls are being intercepted
    fn is_active(&self) -> bool;

    /// Every call recorded so far, oldest first
    fn recorded_calls(&self) -> Vec<CallRecord>;

    /// In-flight call registry
    fn holding_promises(&self) -> &HoldingRegistry;

    /// Make unmatched calls fail loudly; evaluated after every route
    fn install_catch_all(&self);
}

/// In-memory network mock
#[derive(Debug, Default)]
pub struct MockNetwork {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<CallRecord>>,
    holding: HoldingRegistry,
    stopped: AtomicBool,
    catch_all: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl MockNetwork {
    /// Create an intercepting mock with no routes
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop intercepting
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Resume intercepting
    pub fn start(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Add a route; earlier routes win
    pub fn route(&self, route: Route) {
        lock(&self.routes).push(route);
    }

    /// Add a GET route
    pub fn get(&self, pattern: impl Into<UrlPattern>, response: MockResponse) {
        self.route(Route::new(pattern, HttpMethod::Get, response));
    }

    /// Add a POST route
    pub fn post(&self, pattern: impl Into<UrlPattern>, response: MockResponse) {
        self.route(Route::new(pattern, HttpMethod::Post, response));
    }

    /// Add a PUT route
    pub fn put(&self, pattern: impl Into<UrlPattern>, response: MockResponse) {
        self.route(Route::new(pattern, HttpMethod::Put, response));
    }

    /// Add a DELETE route
    pub fn delete(&self, pattern: impl Into<UrlPattern>, response: MockResponse) {
        self.route(Route::new(pattern, HttpMethod::Delete, response));
    }

    /// Get route count
    #[must_use]
    pub fn route_count(&self) -> usize {
        lock(&self.routes).len()
    }

    /// Check whether the catch-all rule is installed
    #[must_use]
    pub fn has_catch_all(&self) -> bool {
        self.catch_all.load(Ordering::SeqCst)
    }

    /// Calls matching `pattern` and `method`
    #[must_use]
    pub fn calls_matching(&self, pattern: &UrlPattern, method: Option<&str>) -> Vec<ApiCall> {
        filter_calls(&lock(&self.calls), &UrlMatcher::new(pattern.clone()), method)
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Issue a call as the mocked app
    ///
    /// The call is recorded and held until its response is delivered,
    /// `delay_ms` after this call whether or not anything awaits it.
    /// With the catch-all installed an unmatched call fails immediately;
    /// without it the call is answered with a 404.
    pub fn fetch(
        &self,
        method: &str,
        url: &str,
        params: serde_json::Value,
    ) -> HarnessResult<ResponseFuture> {
        let (call, response) = self.issue(method, url, params)?;
        self.hold(call, response.clone().map(|_| ()));
        Ok(response)
    }

    /// Issue a call and run `handler` on its response in the background
    ///
    /// The call stays held until `handler` finishes, so calls the handler
    /// issues in turn are appended before this one settles.
    pub fn fetch_then<F, Fut>(
        &self,
        method: &str,
        url: &str,
        params: serde_json::Value,
        handler: F,
    ) -> HarnessResult<HoldingPromise>
    where
        F: FnOnce(MockResponse) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| HarnessError::Runtime {
            message: format!("fetch_then needs a tokio runtime: {e}"),
        })?;
        let (call, response) = self.issue(method, url, params)?;
        // The handler starts only after this call is on record
        let (recorded, on_record) = tokio::sync::oneshot::channel::<()>();
        let task = runtime.spawn(async move {
            let _ = on_record.await;
            handler(response.await).await;
        });
        let promise = self.hold(call, async move {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "response handler did not complete");
            }
        });
        let _ = recorded.send(());
        Ok(promise)
    }

    /// Record `call` together with the holding promise tracking it
    fn hold<F>(&self, call: CallRecord, future: F) -> HoldingPromise
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.holding.append_indexed(future, |index| {
            lock(&self.calls).push(CallRecord {
                settles_after: index + 1,
                ..call
            });
        })
    }

    fn issue(
        &self,
        method: &str,
        url: &str,
        params: serde_json::Value,
    ) -> HarnessResult<(CallRecord, ResponseFuture)> {
        let unmocked = || HarnessError::UnmockedCall {
            method: method.to_uppercase(),
            url: url.to_string(),
        };
        if !self.is_active() {
            return Err(unmocked());
        }
        let call = CallRecord::new(method, url, params);

        let routed = {
            let mut routes = lock(&self.routes);
            routes
                .iter_mut()
                .find(|route| route.matches(url, method))
                .map(|route| {
                    route.match_count += 1;
                    route.response.clone()
                })
        };
        let response = match routed {
            Some(response) => response,
            None if self.has_catch_all() => {
                tracing::error!(method, url, "unmocked network call");
                // Nothing is held for it; it counts once everything before it settled
                let settles_after = self.holding.len();
                lock(&self.calls).push(CallRecord {
                    settles_after,
                    ..call
                });
                return Err(unmocked());
            }
            None => MockResponse::error(404, "No route matched"),
        };
        tracing::debug!(method, url, status = response.status, "mocked call issued");

        let delay = Duration::from_millis(response.delay_ms);
        let deadline = (!delay.is_zero()).then(|| tokio::time::Instant::now() + delay);
        let delivery = async move {
            if let Some(deadline) = deadline {
                tokio::time::sleep_until(deadline).await;
            }
            response
        };
        Ok((call, delivery.boxed().shared()))
    }
}

impl NetworkMock for MockNetwork {
    fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    fn recorded_calls(&self) -> Vec<CallRecord> {
        lock(&self.calls).clone()
    }

    fn holding_promises(&self) -> &HoldingRegistry {
        &self.holding
    }

    fn install_catch_all(&self) {
        self.catch_all.store(true, Ordering::SeqCst);
    }
}

/// Builder for a [`MockNetwork`]
#[derive(Debug, Default)]
pub struct MockNetworkBuilder {
    network: MockNetwork,
}

impl MockNetworkBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a GET route
    #[must_use]
    pub fn get(self, pattern: impl Into<UrlPattern>, response: MockResponse) -> Self {
        self.network.get(pattern, response);
        self
    }

    /// Add a POST route
    #[must_use]
    pub fn post(self, pattern: impl Into<UrlPattern>, response: MockResponse) -> Self {
        self.network.post(pattern, response);
        self
    }

    /// Add a custom route
    #[must_use]
    pub fn route(self, route: Route) -> Self {
        self.network.route(route);
        self
    }

    /// Install the catch-all rule up front
    #[must_use]
    pub fn catch_all(self) -> Self {
        self.network.install_catch_all();
        self
    }

    /// Build the mock
    #[must_use]
    pub fn build(self) -> MockNetwork {
        self.network
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::default_trait_access
)]
mod tests {
    use super::*;
    use serde_json::json;

    mod http_method_tests {
        use super::*;

        #[test]
        fn test_from_str() {
            assert_eq!(HttpMethod::from_str("GET"), HttpMethod::Get);
            assert_eq!(HttpMethod::from_str("post"), HttpMethod::Post);
            assert_eq!(HttpMethod::from_str("Delete"), HttpMethod::Delete);
            assert_eq!(HttpMethod::from_str("unknown"), HttpMethod::Any);
        }

        #[test]
        fn test_accepts() {
            assert!(HttpMethod::Get.accepts("get"));
            assert!(HttpMethod::Any.accepts("PURGE"));
            assert!(!HttpMethod::Get.accepts("POST"));
        }
    }

    mod mock_response_tests {
        use super::*;

        #[test]
        fn test_default() {
            let response = MockResponse::default();
            assert_eq!(response.status, 200);
            assert!(response.body.is_empty());
            assert!(response.is_success());
        }

        #[test]
        fn test_json_round_trip() {
            let response = MockResponse::json(&json!({"items": [1, 2, 3]})).unwrap();
            let data: serde_json::Value = response.body_json().unwrap();
            assert_eq!(data["items"].as_array().unwrap().len(), 3);
        }

        #[test]
        fn test_error() {
            let response = MockResponse::error(404, "Not Found");
            assert_eq!(response.status, 404);
            assert!(!response.is_success());
            let body: serde_json::Value = response.body_json().unwrap();
            assert_eq!(body["error"], "Not Found");
        }
    }

    mod url_pattern_tests {
        use super::*;

        fn matcher(pattern: UrlPattern) -> UrlMatcher {
            pattern.compile().unwrap()
        }

        #[test]
        fn test_exact_from_str() {
            let pattern = matcher("/api/events".into());
            assert!(pattern.matches("/api/events"));
            assert!(!pattern.matches("/api/events/1"));
        }

        #[test]
        fn test_regex_from_regex() {
            let pattern = matcher(regex::Regex::new(r"^/api/events/\d+$").unwrap().into());
            assert!(pattern.matches("/api/events/12"));
            assert!(!pattern.matches("/api/events/x"));
            assert_eq!(pattern.to_string(), r"/^/api/events/\d+$/");
        }

        #[test]
        fn test_prefix_contains_glob() {
            assert!(matcher(UrlPattern::Prefix("/api".into())).matches("/api/x"));
            assert!(matcher(UrlPattern::Contains("events".into())).matches("/api/events?q=1"));
            let users = matcher(UrlPattern::Glob("*/api/users/*".into()));
            assert!(users.matches("https://x.io/api/users/7"));
            assert!(!users.matches("https://x.io/api/posts/7"));
            assert!(matcher(UrlPattern::Any).matches(""));
        }

        #[test]
        fn test_glob_anchors_repeated_trailing_segment() {
            let pattern = matcher(UrlPattern::Glob("a*b".into()));
            assert!(pattern.matches("abb"));
            assert!(pattern.matches("ab"));
            assert!(!pattern.matches("abc"));
            assert!(!pattern.matches("cab"));

            let items = matcher(UrlPattern::Glob("/api/*/items".into()));
            assert!(items.matches("/api/items/items"));
            assert!(!items.matches("/api/items/items/1"));
        }

        #[test]
        fn test_glob_literals_are_not_regex() {
            let pattern = matcher(UrlPattern::Glob("/api/events?q=*".into()));
            assert!(pattern.matches("/api/events?q=rust"));
            assert!(!pattern.matches("/api/eventsq=rust"));
        }

        #[test]
        fn test_matcher_reuses_compiled_regex() {
            let pattern = matcher(UrlPattern::Regex("^/api/events".into()));
            let copy = pattern.clone();
            assert!(pattern.matches("/api/events"));
            assert!(copy.matches("/api/events?q=1"));
            assert_eq!(copy.pattern(), &UrlPattern::Regex("^/api/events".into()));
        }

        #[test]
        fn test_uncompilable_regex_matches_nothing() {
            let pattern = UrlMatcher::new(UrlPattern::Regex("(".into()));
            assert!(!pattern.matches("("));
            assert!(UrlPattern::Regex("(".into()).compile().is_err());
        }

        #[test]
        fn test_validate() {
            assert!(UrlPattern::Regex("(".into()).validate().is_err());
            assert!(UrlPattern::Exact(String::new()).validate().is_err());
            assert!(UrlPattern::Regex("^/api".into()).validate().is_ok());
            assert!(UrlPattern::Any.validate().is_ok());
        }
    }

    mod call_record_tests {
        use super::*;

        #[test]
        fn test_method_case_insensitive() {
            let call = CallRecord::new("get", "/api/events", json!(null));
            let pattern = UrlMatcher::new("/api/events".into());
            assert!(call.matches(&pattern, Some("GET")));
            assert!(call.matches(&pattern, None));
            assert!(!call.matches(&pattern, Some("POST")));
        }

        #[test]
        fn test_filter_calls_keeps_order() {
            let calls = vec![
                CallRecord::new("POST", "/api/events", json!({"n": 1})),
                CallRecord::new("GET", "/api/other", json!(null)),
                CallRecord::new("post", "/api/events", json!({"n": 2})),
            ];
            let found = filter_calls(&calls, &UrlMatcher::new("/api/events".into()), Some("Post"));
            assert_eq!(found.len(), 2);
            assert_eq!(found[0].params["n"], 1);
            assert_eq!(found[1].params["n"], 2);
        }

        #[test]
        fn test_settles_after_defaults_when_absent() {
            let call: CallRecord =
                serde_json::from_str(r#"{"url": "/a", "method": "GET", "params": null}"#).unwrap();
            assert_eq!(call.settles_after, 0);
            assert!(call.is_settled_by(0));
        }
    }

    mod route_tests {
        use super::*;

        #[test]
        fn test_times_exhausts() {
            let mut route = Route::new("/a", HttpMethod::Get, MockResponse::new()).times(1);
            assert!(route.matches("/a", "GET"));
            route.match_count += 1;
            assert!(route.is_exhausted());
            assert!(!route.matches("/a", "GET"));
        }
    }

    mod mock_network_tests {
        use super::*;

        #[tokio::test]
        async fn test_fetch_records_and_responds() {
            let network = MockNetworkBuilder::new()
                .get("/api/events", MockResponse::json(&json!({"ok": true})).unwrap())
                .build();
            let response = network.fetch("GET", "/api/events", json!({})).unwrap().await;
            let body: serde_json::Value = response.body_json().unwrap();
            assert_eq!(body["ok"], true);
            assert_eq!(network.recorded_calls().len(), 1);
            assert_eq!(network.holding_promises().len(), 1);
        }

        #[tokio::test]
        async fn test_unmatched_without_catch_all_is_404() {
            let network = MockNetwork::new();
            let response = network.fetch("GET", "/nowhere", json!(null)).unwrap().await;
            assert_eq!(response.status, 404);
        }

        #[tokio::test]
        async fn test_catch_all_runs_after_routes() {
            let network = MockNetworkBuilder::new()
                .catch_all()
                .get("/api/ok", MockResponse::new())
                .build();
            assert!(network.fetch("GET", "/api/ok", json!(null)).is_ok());
            let err = network
                .fetch("delete", "/api/unexpected", json!(null))
                .unwrap_err();
            match err {
                HarnessError::UnmockedCall { method, url } => {
                    assert_eq!(method, "DELETE");
                    assert_eq!(url, "/api/unexpected");
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_stopped_mock_rejects() {
            let network = MockNetwork::new();
            network.stop();
            assert!(!network.is_active());
            assert!(network.fetch("GET", "/a", json!(null)).is_err());
            network.start();
            assert!(network.is_active());
        }

        #[tokio::test(start_paused = true)]
        async fn test_delay_holds_response() {
            let network = MockNetworkBuilder::new()
                .get("/slow", MockResponse::new().with_delay(200))
                .build();
            let start = tokio::time::Instant::now();
            network.fetch("GET", "/slow", json!(null)).unwrap().await;
            assert!(start.elapsed() >= Duration::from_millis(200));
        }

        #[tokio::test(start_paused = true)]
        async fn test_delay_counts_from_issue_not_first_await() {
            let network = MockNetworkBuilder::new()
                .get("/slow", MockResponse::new().with_delay(100))
                .build();
            let start = tokio::time::Instant::now();
            let response = network.fetch("GET", "/slow", json!(null)).unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            response.await;
            network.holding_promises().settled().await;
            assert_eq!(start.elapsed(), Duration::from_millis(200));
        }

        #[tokio::test(start_paused = true)]
        async fn test_calls_stamped_with_holding_position() {
            let network = MockNetworkBuilder::new()
                .catch_all()
                .get("/a", MockResponse::new())
                .get("/b", MockResponse::new())
                .build();
            let _ = network.fetch("GET", "/a", json!(null)).unwrap();
            assert!(network.fetch("GET", "/missing", json!(null)).is_err());
            network.fetch_then("GET", "/b", json!(null), |_| async {}).unwrap().await;
            let stamps: Vec<(String, usize)> = network
                .recorded_calls()
                .into_iter()
                .map(|call| (call.url, call.settles_after))
                .collect();
            assert_eq!(
                stamps,
                vec![
                    ("/a".to_string(), 1),
                    ("/missing".to_string(), 1),
                    ("/b".to_string(), 2)
                ]
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_fetch_then_holds_until_handler_done() {
            let network = std::sync::Arc::new(
                MockNetworkBuilder::new()
                    .get("/first", MockResponse::new().with_delay(10))
                    .get("/second", MockResponse::new().with_delay(10))
                    .build(),
            );
            let inner = network.clone();
            let held = network
                .fetch_then("GET", "/first", json!(null), move |_| async move {
                    inner.fetch("GET", "/second", json!(null)).unwrap().await;
                })
                .unwrap();
            held.await;
            assert_eq!(network.recorded_calls().len(), 2);
            assert_eq!(network.holding_promises().len(), 2);
        }

        #[test]
        fn test_fetch_then_without_runtime() {
            let network = MockNetworkBuilder::new()
                .get("/a", MockResponse::new())
                .build();
            let err = network
                .fetch_then("GET", "/a", json!(null), |_| async {})
                .unwrap_err();
            assert!(matches!(err, HarnessError::Runtime { .. }));
            assert!(network.recorded_calls().is_empty());
        }

        #[tokio::test]
        async fn test_route_first_match_wins_until_exhausted() {
            let network = MockNetwork::new();
            network.route(
                Route::new("/a", HttpMethod::Any, MockResponse::new().with_status(201)).times(1),
            );
            network.get("/a", MockResponse::new().with_status(200));
            assert_eq!(network.route_count(), 2);
            let first = network.fetch("GET", "/a", json!(null)).unwrap().await;
            let second = network.fetch("GET", "/a", json!(null)).unwrap().await;
            assert_eq!(first.status, 201);
            assert_eq!(second.status, 200);
        }

        #[test]
        fn test_calls_matching_and_clear() {
            let network = MockNetwork::new();
            let _ = network.fetch("GET", "/x", json!(null));
            assert_eq!(network.calls_matching(&UrlPattern::Any, Some("get")).len(), 1);
            network.clear_calls();
            assert!(network.recorded_calls().is_empty());
        }
    }
}
