//! Selector resolution.
//!
//! Turns a selector, a spec id or a path of spec ids into the host nodes
//! of a [`ComponentTree`] that tests may interact with. Composite nodes
//! never appear in a result: they render nothing of their own, so
//! clicking or asserting on them is always a mistake.
//!
//! The resolver holds no state and never resynchronizes the tree; the
//! [`Session`](crate::Session) decides when to do that.

use crate::result::{HarnessError, HarnessResult};
use crate::selector::Selector;
use crate::tree::{ComponentTree, NodeId};
use std::collections::HashSet;

/// Stateless lookup over a borrowed tree
#[derive(Clone, Copy)]
pub struct SelectorResolver<'a> {
    tree: &'a dyn ComponentTree,
    spec_attribute: &'a str,
}

impl std::fmt::Debug for SelectorResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorResolver")
            .field("spec_attribute", &self.spec_attribute)
            .finish_non_exhaustive()
    }
}

impl<'a> SelectorResolver<'a> {
    /// Create a resolver reading spec ids from `spec_attribute`
    #[must_use]
    pub fn new(tree: &'a dyn ComponentTree, spec_attribute: &'a str) -> Self {
        Self {
            tree,
            spec_attribute,
        }
    }

    /// Host nodes matching a CSS-like selector anywhere in the tree
    pub fn resolve_by_selector(&self, selector: &str) -> HarnessResult<Vec<NodeId>> {
        let selector = Selector::parse(selector)?;
        Ok(self.select(&selector, None))
    }

    /// Host nodes whose spec attribute equals `spec_id`
    ///
    /// `scope` limits the search to descendants of those nodes; `None`
    /// searches the whole tree. `type_filter` additionally requires the
    /// node's tag.
    pub fn resolve_by_spec_id(
        &self,
        spec_id: &str,
        scope: Option<&[NodeId]>,
        type_filter: Option<&str>,
    ) -> HarnessResult<Vec<NodeId>> {
        validate_spec_id(spec_id)?;
        Ok(self.select(&self.spec_selector(spec_id, type_filter), scope))
    }

    /// Resolve spec ids left to right, each step scoped to the previous
    /// step's nodes
    ///
    /// Only the last step applies `type_filter`. A step that matches
    /// nothing makes the whole result empty.
    pub fn resolve_by_spec_path<S: AsRef<str>>(
        &self,
        spec_path: &[S],
        scope: Option<&[NodeId]>,
        type_filter: Option<&str>,
    ) -> HarnessResult<Vec<NodeId>> {
        if spec_path.is_empty() {
            return Err(HarnessError::InvalidSpecPath {
                reason: "spec path is empty".to_string(),
            });
        }
        for (index, spec_id) in spec_path.iter().enumerate() {
            validate_spec_id(spec_id.as_ref()).map_err(|err| HarnessError::InvalidSpecPath {
                reason: format!("step {index}: {err}"),
            })?;
        }

        let last = spec_path.len() - 1;
        let mut current: Option<Vec<NodeId>> = scope.map(<[NodeId]>::to_vec);
        for (index, spec_id) in spec_path.iter().enumerate() {
            let filter = if index == last { type_filter } else { None };
            let selector = self.spec_selector(spec_id.as_ref(), filter);
            let found = self.select(&selector, current.as_deref());
            if found.is_empty() {
                return Ok(Vec::new());
            }
            current = Some(found);
        }
        Ok(current.unwrap_or_default())
    }

    /// Host nodes matching a parsed selector below `scope`
    #[must_use]
    pub fn select(&self, selector: &Selector, scope: Option<&[NodeId]>) -> Vec<NodeId> {
        let predicate = |node: NodeId, element: &crate::tree::ElementInfo| {
            element.is_host() && selector.matches(self.tree, node, element)
        };
        match scope {
            None => self.tree.find_where(None, &predicate),
            Some(roots) => {
                let mut seen = HashSet::new();
                roots
                    .iter()
                    .flat_map(|&root| self.tree.find_where(Some(root), &predicate))
                    .filter(|node| seen.insert(*node))
                    .collect()
            }
        }
    }

    fn spec_selector(&self, spec_id: &str, type_filter: Option<&str>) -> Selector {
        let tag = type_filter.map(str::trim).filter(|t| !t.is_empty());
        Selector::attribute_equals(self.spec_attribute, spec_id, tag)
    }
}

fn validate_spec_id(spec_id: &str) -> HarnessResult<()> {
    if spec_id.trim().is_empty() {
        return Err(HarnessError::InvalidSpecId {
            spec_id: spec_id.to_string(),
            reason: "spec id is empty".to_string(),
        });
    }
    Ok(())
}
