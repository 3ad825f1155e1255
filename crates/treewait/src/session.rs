//! Test session binding one component tree to one network mock.
//!
//! A [`Session`] is the surface tests drive: synchronous interactions and
//! lookups against the tree, a query over the recorded call log, and the
//! asynchronous waits from [`crate::wait`] wired to both collaborators.
//!
//! ```ignore
//! let session = Session::new(network.clone(), tree.clone())?;
//! session.click(r#"[data-spec="submit-search"]"#)?;
//! session.wait_for_api_call("/api/events", Some("GET"))?.await;
//! assert_eq!(session.find(r#"[data-spec="list-item"]"#)?.len(), 5);
//! ```

use crate::config::SessionConfig;
use crate::network::{filter_calls, ApiCall, NetworkMock, UrlPattern};
use crate::resolver::SelectorResolver;
use crate::result::{HarnessError, HarnessResult};
use crate::selector::Selector;
use crate::tree::{ComponentTree, NodeId, UiEvent};
use crate::wait::{self, FnCondition, WaitCondition, WaitResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// CHANGE OPTIONS
// =============================================================================

/// Extra events sent around a value change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeOptions {
    /// Dispatch `Focus` before the change
    pub focus: bool,
    /// Dispatch `Blur` after the change
    pub blur: bool,
}

impl ChangeOptions {
    /// No focus or blur
    #[must_use]
    pub const fn new() -> Self {
        Self {
            focus: false,
            blur: false,
        }
    }

    /// Focus the node before changing it
    #[must_use]
    pub const fn with_focus(mut self) -> Self {
        self.focus = true;
        self
    }

    /// Blur the node after changing it
    #[must_use]
    pub const fn with_blur(mut self) -> Self {
        self.blur = true;
        self
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// One component tree, one network mock and a wait timeout
#[derive(Clone)]
pub struct Session {
    network: Arc<dyn NetworkMock>,
    tree: Arc<dyn ComponentTree>,
    config: SessionConfig,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("mounted", &self.tree.is_mounted())
            .field("network_active", &self.network.is_active())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session with the default configuration
    ///
    /// # Errors
    ///
    /// [`HarnessError::InvalidNetworkMock`] if the mock is not intercepting,
    /// [`HarnessError::InvalidComponent`] if nothing is mounted.
    pub fn new(
        network: Arc<dyn NetworkMock>,
        tree: Arc<dyn ComponentTree>,
    ) -> HarnessResult<Self> {
        Self::with_config(network, tree, SessionConfig::default())
    }

    /// Create a session with an explicit configuration
    ///
    /// Installs the mock's catch-all rule so unmatched calls fail loudly.
    pub fn with_config(
        network: Arc<dyn NetworkMock>,
        tree: Arc<dyn ComponentTree>,
        config: SessionConfig,
    ) -> HarnessResult<Self> {
        config.validate()?;
        if !network.is_active() {
            return Err(HarnessError::InvalidNetworkMock {
                reason: "network mock is not intercepting calls".to_string(),
            });
        }
        if !tree.is_mounted() || tree.root().is_none() {
            return Err(HarnessError::InvalidComponent {
                reason: "component tree has nothing mounted".to_string(),
            });
        }
        network.install_catch_all();
        tracing::debug!(
            wait_timeout_ms = config.wait_timeout_ms,
            spec_attribute = %config.spec_attribute,
            "session created"
        );
        Ok(Self {
            network,
            tree,
            config,
        })
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Bound component tree
    #[must_use]
    pub fn tree(&self) -> &dyn ComponentTree {
        self.tree.as_ref()
    }

    /// Bound network mock
    #[must_use]
    pub fn network(&self) -> &dyn NetworkMock {
        self.network.as_ref()
    }

    fn resolver(&self) -> SelectorResolver<'_> {
        SelectorResolver::new(self.tree.as_ref(), &self.config.spec_attribute)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Host nodes matching `selector`, after resynchronizing the tree
    pub fn find(&self, selector: &str) -> HarnessResult<Vec<NodeId>> {
        let selector = Selector::parse(selector)?;
        self.tree.update();
        Ok(self.resolver().select(&selector, None))
    }

    /// Host nodes carrying `spec_id`, optionally below `root` and of tag `type_filter`
    pub fn find_spec(
        &self,
        spec_id: &str,
        root: Option<&[NodeId]>,
        type_filter: Option<&str>,
    ) -> HarnessResult<Vec<NodeId>> {
        self.tree.update();
        self.resolver().resolve_by_spec_id(spec_id, root, type_filter)
    }

    /// Host nodes at the end of a nested spec id path
    pub fn find_spec_path<S: AsRef<str>>(
        &self,
        spec_path: &[S],
        root: Option<&[NodeId]>,
        type_filter: Option<&str>,
    ) -> HarnessResult<Vec<NodeId>> {
        self.tree.update();
        self.resolver()
            .resolve_by_spec_path(spec_path, root, type_filter)
    }

    // =========================================================================
    // Interactions
    // =========================================================================

    fn single(&self, selector: &str) -> HarnessResult<NodeId> {
        match self.find(selector)?.as_slice() {
            [node] => Ok(*node),
            nodes => Err(HarnessError::NodeCount {
                selector: selector.to_string(),
                found: nodes.len(),
            }),
        }
    }

    /// Set the value of the single node matching `selector`
    pub fn change_value(
        &self,
        selector: &str,
        value: &str,
        options: ChangeOptions,
    ) -> HarnessResult<()> {
        let node = self.single(selector)?;
        tracing::debug!(%selector, %node, value, "change value");
        if options.focus {
            self.tree.dispatch(node, UiEvent::Focus)?;
        }
        self.tree.dispatch(
            node,
            UiEvent::Change {
                value: value.to_string(),
            },
        )?;
        if options.blur {
            self.tree.dispatch(node, UiEvent::Blur)?;
        }
        Ok(())
    }

    /// Click the single node matching `selector`
    pub fn click(&self, selector: &str) -> HarnessResult<()> {
        let node = self.single(selector)?;
        tracing::debug!(%selector, %node, "click");
        self.tree.dispatch(node, UiEvent::Click)
    }

    /// Submit the single node matching `selector`
    pub fn submit(&self, selector: &str) -> HarnessResult<()> {
        let node = self.single(selector)?;
        tracing::debug!(%selector, %node, "submit");
        self.tree.dispatch(node, UiEvent::Submit)
    }

    // =========================================================================
    // Call log
    // =========================================================================

    /// Recorded calls whose URL matches `pattern` and method matches `method`
    ///
    /// `method` is compared case-insensitively; `None` accepts any method.
    pub fn get_api_calls(
        &self,
        pattern: impl Into<UrlPattern>,
        method: Option<&str>,
    ) -> HarnessResult<Vec<ApiCall>> {
        let pattern = pattern.into().compile()?;
        Ok(filter_calls(&self.network.recorded_calls(), &pattern, method))
    }

    // =========================================================================
    // Waits
    // =========================================================================

    fn timeout_or_default(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or_else(|| self.config.wait_timeout())
    }

    /// Poll `condition` until it holds, failing once the wait exceeds
    /// `timeout` (the session default when `None`)
    pub async fn poll_for<C: WaitCondition>(
        &self,
        condition: C,
        timeout: Option<Duration>,
    ) -> HarnessResult<WaitResult> {
        wait::poll_for(condition, self.timeout_or_default(timeout)).await
    }

    /// Wait until `selector` matches at least one host node
    ///
    /// The selector is parsed before the future is created. The tree is
    /// resynchronized before every evaluation.
    pub fn wait_for(
        &self,
        selector: &str,
        timeout: Option<Duration>,
    ) -> HarnessResult<impl Future<Output = HarnessResult<WaitResult>> + Send + 'static> {
        let parsed = Selector::parse(selector)?;
        let tree = self.tree.clone();
        let spec_attribute = self.config.spec_attribute.clone();
        let condition = FnCondition::new(
            move || {
                tree.update();
                !SelectorResolver::new(tree.as_ref(), &spec_attribute)
                    .select(&parsed, None)
                    .is_empty()
            },
            format!("selector {selector}"),
        );
        Ok(self.wait_for_element(condition, selector.to_string(), timeout))
    }

    /// Wait until a host node carries `spec_id`
    pub fn wait_for_spec(
        &self,
        spec_id: &str,
        timeout: Option<Duration>,
    ) -> HarnessResult<impl Future<Output = HarnessResult<WaitResult>> + Send + 'static> {
        if spec_id.trim().is_empty() {
            return Err(HarnessError::InvalidSpecId {
                spec_id: spec_id.to_string(),
                reason: "spec id is empty".to_string(),
            });
        }
        let selector = Selector::attribute_equals(&self.config.spec_attribute, spec_id, None);
        let tree = self.tree.clone();
        let spec_attribute = self.config.spec_attribute.clone();
        let condition = FnCondition::new(
            move || {
                tree.update();
                !SelectorResolver::new(tree.as_ref(), &spec_attribute)
                    .select(&selector, None)
                    .is_empty()
            },
            format!("spec id {spec_id}"),
        );
        Ok(self.wait_for_element(condition, spec_id.to_string(), timeout))
    }

    fn wait_for_element<C>(
        &self,
        condition: C,
        target: String,
        timeout: Option<Duration>,
    ) -> impl Future<Output = HarnessResult<WaitResult>> + Send + 'static
    where
        C: WaitCondition + Send + 'static,
    {
        let timeout = self.timeout_or_default(timeout);
        tracing::debug!(%target, timeout_ms = timeout.as_millis() as u64, "waiting for element");
        async move {
            wait::poll_for(condition, timeout)
                .await
                .map_err(|err| match err {
                    HarnessError::PollTimeout { elapsed_ms, .. } => {
                        HarnessError::ElementNotFound { target, elapsed_ms }
                    }
                    other => other,
                })
        }
    }

    /// Wait until a call matching `pattern` and `method` is recorded and
    /// every call in flight when it was recorded has settled
    ///
    /// The condition is re-checked after each settle cycle, one cycle per
    /// call the mocked app issues, counting only calls that cycle saw
    /// delivered. Calls issued later never hold it back. This wait never
    /// times out; race it with `tokio::time::timeout` to bound it.
    pub fn wait_for_api_call(
        &self,
        pattern: impl Into<UrlPattern>,
        method: Option<&str>,
    ) -> HarnessResult<impl Future<Output = WaitResult> + Send + 'static> {
        let pattern = pattern.into().compile()?;
        let method = method.map(str::to_string);
        let description = match &method {
            Some(m) => format!("{} {pattern}", m.to_uppercase()),
            None => format!("any {pattern}"),
        };
        tracing::debug!(call = %description, "waiting for api call");

        let network = self.network.clone();
        let condition = FnCondition::new(
            move |settled: usize| {
                network.recorded_calls().iter().any(|call| {
                    call.is_settled_by(settled) && call.matches(&pattern, method.as_deref())
                })
            },
            format!("api call {description}"),
        );
        Ok(wait::until_settled(self.network.holding_promises(), condition))
    }

    /// Wait for a fixed duration (diagnostic only)
    pub async fn sleep(&self, duration: Duration) {
        wait::sleep(duration).await;
    }
}

// =============================================================================
// TESTS
// =============================================================================
