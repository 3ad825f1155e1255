//! Component tree capability and an in-memory implementation.
//!
//! The harness never renders anything itself. It talks to a mounted tree
//! through [`ComponentTree`]: node navigation, synthetic event dispatch
//! and resynchronization with the framework's latest state.
//!
//! [`VirtualTree`] implements the capability in memory. Mutations land in
//! a live copy and only become visible to queries after
//! [`ComponentTree::update`], the same lag a rendered snapshot has
//! behind component state.

use crate::result::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Stable handle to a node of a component tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a node renders a primitive element or wraps other components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Primitive tag such as `div` or `button`
    Host,
    /// Opaque component that only renders children
    Composite,
}

/// What the tree reports about one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Host or composite
    pub kind: NodeKind,
    /// Tag name for host nodes, component name for composites
    pub tag: String,
    /// Attributes (props) on the node
    pub attributes: BTreeMap<String, String>,
}

impl ElementInfo {
    /// Create a host element
    #[must_use]
    pub fn host(tag: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Host,
            tag: tag.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Create a composite component
    #[must_use]
    pub fn composite(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Composite,
            tag: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a class to the `class` attribute
    #[must_use]
    pub fn with_class(mut self, class: &str) -> Self {
        let entry = self.attributes.entry("class".to_string()).or_default();
        if !entry.is_empty() {
            entry.push(' ');
        }
        entry.push_str(class);
        self
    }

    /// Check if this is a primitive element
    #[must_use]
    pub const fn is_host(&self) -> bool {
        matches!(self.kind, NodeKind::Host)
    }

    /// Look up an attribute
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Element id attribute
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// Check for a class in the `class` attribute
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|list| list.split_whitespace().any(|c| c == class))
    }
}

/// Synthetic UI events the harness can dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UiEvent {
    /// Element gained focus
    Focus,
    /// Element value changed
    Change {
        /// New value
        value: String,
    },
    /// Element lost focus
    Blur,
    /// Element clicked
    Click,
    /// Form submitted
    Submit,
}

impl UiEvent {
    /// DOM-style event name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Change { .. } => "change",
            Self::Blur => "blur",
            Self::Click => "click",
            Self::Submit => "submit",
        }
    }
}

impl std::fmt::Display for UiEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Capability a mounted component tree must offer the harness
///
/// Queries read the last synchronized snapshot; `update` pulls in
/// whatever the framework rendered since.
pub trait ComponentTree: Send + Sync {
    /// Whether a component is currently mounted
    fn is_mounted(&self) -> bool;

    /// Top of the tree
    fn root(&self) -> Option<NodeId>;

    /// Children of a node in render order
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Parent of a node
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Element details of a node
    fn element(&self, node: NodeId) -> Option<ElementInfo>;

    /// Dispatch a synthetic event to a node
    fn dispatch(&self, node: NodeId, event: UiEvent) -> HarnessResult<()>;

    /// Resynchronize the snapshot with the framework's latest state
    fn update(&self);

    /// All nodes below `scope` in document order, `scope` excluded
    fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).into_iter().rev());
        }
        out
    }

    /// Nodes below `scope` (or the root) whose element satisfies `predicate`
    fn find_where(
        &self,
        scope: Option<NodeId>,
        predicate: &dyn Fn(NodeId, &ElementInfo) -> bool,
    ) -> Vec<NodeId> {
        let Some(scope) = scope.or_else(|| self.root()) else {
            return Vec::new();
        };
        self.descendants(scope)
            .into_iter()
            .filter(|&node| {
                self.element(node)
                    .is_some_and(|element| predicate(node, &element))
            })
            .collect()
    }
}

/// Event handler attached to a [`VirtualTree`] node
pub type EventHandler = Arc<dyn Fn(NodeId, &UiEvent) + Send + Sync>;

#[derive(Debug, Clone)]
struct NodeData {
    element: ElementInfo,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attached: bool,
}

#[derive(Debug, Clone, Default)]
struct Nodes {
    nodes: Vec<NodeData>,
}

impl Nodes {
    fn get(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.0).filter(|n| n.attached)
    }
}

#[derive(Default)]
struct TreeState {
    live: Nodes,
    rendered: Nodes,
    handlers: HashMap<(NodeId, &'static str), Vec<EventHandler>>,
    events: Vec<(NodeId, UiEvent)>,
    updates: usize,
}

/// In-memory component tree
pub struct VirtualTree {
    state: Mutex<TreeState>,
    mounted: bool,
}

impl std::fmt::Debug for VirtualTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("VirtualTree")
            .field("mounted", &self.mounted)
            .field("nodes", &state.live.nodes.len())
            .field("events", &state.events.len())
            .finish_non_exhaustive()
    }
}

impl Default for VirtualTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTree {
    /// Create a mounted tree holding a single composite root
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(ElementInfo::composite("Root"), true)
    }

    /// Create a tree whose component was never mounted
    #[must_use]
    pub fn unmounted() -> Self {
        Self::with_root(ElementInfo::composite("Root"), false)
    }

    fn with_root(root: ElementInfo, mounted: bool) -> Self {
        let nodes = Nodes {
            nodes: vec![NodeData {
                element: root,
                parent: None,
                children: Vec::new(),
                attached: true,
            }],
        };
        let state = TreeState {
            live: nodes.clone(),
            rendered: nodes,
            ..TreeState::default()
        };
        Self {
            state: Mutex::new(state),
            mounted,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TreeState> {
        // A panicking event handler must not wedge every later query
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Root node id
    #[must_use]
    pub const fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a child under `parent`; visible after the next `update`
    pub fn append(&self, parent: NodeId, element: ElementInfo) -> NodeId {
        let mut state = self.lock();
        let id = NodeId(state.live.nodes.len());
        state.live.nodes.push(NodeData {
            element,
            parent: Some(parent),
            children: Vec::new(),
            attached: true,
        });
        if let Some(p) = state.live.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        id
    }

    /// Append and synchronize in one step, for building fixtures
    pub fn append_rendered(&self, parent: NodeId, element: ElementInfo) -> NodeId {
        let id = self.append(parent, element);
        self.sync();
        id
    }

    /// Detach a node and its subtree
    pub fn remove(&self, node: NodeId) {
        let mut state = self.lock();
        let parent = state.live.nodes.get(node.0).and_then(|n| n.parent);
        if let Some(p) = parent.and_then(|p| state.live.nodes.get_mut(p.0)) {
            p.children.retain(|&c| c != node);
        }
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(data) = state.live.nodes.get_mut(current.0) {
                data.attached = false;
                stack.extend(data.children.iter().copied());
            }
        }
    }

    /// Set an attribute on a node
    pub fn set_attribute(&self, node: NodeId, key: &str, value: &str) {
        let mut state = self.lock();
        if let Some(data) = state.live.nodes.get_mut(node.0) {
            data.element
                .attributes
                .insert(key.to_string(), value.to_string());
        }
    }

    /// Register a handler for events named `event` on `node`
    pub fn on<F>(&self, node: NodeId, event: &'static str, handler: F)
    where
        F: Fn(NodeId, &UiEvent) + Send + Sync + 'static,
    {
        self.lock()
            .handlers
            .entry((node, event))
            .or_default()
            .push(Arc::new(handler));
    }

    /// Every event dispatched so far
    #[must_use]
    pub fn events(&self) -> Vec<(NodeId, UiEvent)> {
        self.lock().events.clone()
    }

    /// Number of `update` calls received
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.lock().updates
    }

    fn sync(&self) {
        let mut state = self.lock();
        state.rendered = state.live.clone();
    }
}

impl ComponentTree for VirtualTree {
    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn root(&self) -> Option<NodeId> {
        self.mounted.then_some(self.root_id())
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.lock()
            .rendered
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.lock().rendered.get(node).and_then(|n| n.parent)
    }

    fn element(&self, node: NodeId) -> Option<ElementInfo> {
        self.lock().rendered.get(node).map(|n| n.element.clone())
    }

    fn dispatch(&self, node: NodeId, event: UiEvent) -> HarnessResult<()> {
        let handlers = {
            let mut state = self.lock();
            if state.rendered.get(node).is_none() {
                return Err(HarnessError::Dispatch {
                    message: format!("{event} sent to detached node {node}"),
                });
            }
            if let UiEvent::Change { value } = &event {
                if let Some(data) = state.live.nodes.get_mut(node.0) {
                    data.element
                        .attributes
                        .insert("value".to_string(), value.clone());
                }
            }
            state.events.push((node, event.clone()));
            state
                .handlers
                .get(&(node, event.name()))
                .cloned()
                .unwrap_or_default()
        };
        // Handlers may mutate the tree, so the lock is released first
        for handler in handlers {
            handler(node, &event);
        }
        Ok(())
    }

    fn update(&self) {
        let mut state = self.lock();
        state.rendered = state.live.clone();
        state.updates += 1;
    }
}
