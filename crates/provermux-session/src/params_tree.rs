// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A per-session history tree: every node is the exact RPC that produced a
//! state, linked root-to-leaf.
//!
//! Grounded on the Python `ParamsTree` dataclass in
//! `original_source/inference/session_model.py`. That implementation keeps
//! a live `parent` back-pointer per node and strips it on `to_json`; here
//! the tree owns its children outright (no back-pointers) and `find_path`
//! recovers the root-to-node path by recursive descent instead, which
//! avoids the aliasing a `parent: Option<&ParamsTree>` would require.

use provermux_core::{CoreError, NodeId};
use serde::{Deserialize, Serialize};

use crate::query::QueryKwargs;

/// One node of a ParamsTree: the state it produced and the call that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamsTree {
    pub id: NodeId,
    pub state_key: String,
    pub query_kwargs: QueryKwargs,
    #[serde(default)]
    pub children: Vec<ParamsTree>,
}

impl ParamsTree {
    /// Create a fresh root node — used both for a brand-new tree and for
    /// every non-root node, since this type has no parent pointer of its
    /// own (the forest's shape carries that information).
    pub fn new(state_key: impl Into<String>, query_kwargs: QueryKwargs) -> Self {
        Self {
            id: NodeId::generate(),
            state_key: state_key.into(),
            query_kwargs,
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: ParamsTree) {
        self.children.push(child);
    }

    /// Total live nodes in this tree, used as a defensive bound on forest
    /// walks (a well-formed tree can never need more steps than it has
    /// nodes; exceeding the bound means a node was linked into more than
    /// one place and the walk would otherwise loop forever).
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(ParamsTree::node_count)
            .sum::<usize>()
    }

    /// Find the node whose `state_key` matches, anywhere in this tree.
    pub fn find_node(&self, state_key: &str) -> Result<&ParamsTree, CoreError> {
        let budget = self.node_count();
        let mut stack = vec![self];
        let mut visited = 0usize;
        while let Some(node) = stack.pop() {
            visited += 1;
            if visited > budget {
                return Err(CoreError::Internal(
                    "cycle detected while walking ParamsTree".to_string(),
                ));
            }
            if node.state_key == state_key {
                return Ok(node);
            }
            stack.extend(node.children.iter());
        }
        Err(CoreError::NotFound(format!(
            "state {state_key} not found in tree"
        )))
    }

    /// Returns `true` if a node with this state_key exists anywhere in the
    /// tree.
    pub fn contains(&self, state_key: &str) -> bool {
        self.find_node(state_key).is_ok()
    }

    /// Root-to-node path for the node matching `state_key`.
    pub fn find_path(&self, state_key: &str) -> Result<Vec<&ParamsTree>, CoreError> {
        fn walk<'a>(node: &'a ParamsTree, state_key: &str, path: &mut Vec<&'a ParamsTree>) -> bool {
            path.push(node);
            if node.state_key == state_key {
                return true;
            }
            for child in &node.children {
                if walk(child, state_key, path) {
                    return true;
                }
            }
            path.pop();
            false
        }

        let mut path = Vec::new();
        if walk(self, state_key, &mut path) {
            Ok(path)
        } else {
            Err(CoreError::NotFound(format!(
                "state {state_key} not found in tree"
            )))
        }
    }

    /// Find the node by `state_key` and append `child` to it, returning a
    /// mutable borrow error as `NotFound` rather than panicking.
    pub fn add_child_at(
        &mut self,
        parent_state_key: &str,
        child: ParamsTree,
    ) -> Result<(), CoreError> {
        fn walk(node: &mut ParamsTree, parent_state_key: &str, child: &mut Option<ParamsTree>) -> bool {
            if node.state_key == parent_state_key {
                if let Some(c) = child.take() {
                    node.children.push(c);
                }
                return true;
            }
            for c in &mut node.children {
                if walk(c, parent_state_key, child) {
                    return true;
                }
            }
            false
        }
        let mut slot = Some(child);
        if walk(self, parent_state_key, &mut slot) {
            Ok(())
        } else {
            Err(CoreError::NotFound(format!(
                "parent state {parent_state_key} not found in tree"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn q(route: &str) -> QueryKwargs {
        QueryKwargs::new(route, json!({}), None)
    }

    #[test]
    fn find_node_locates_nested_child() {
        let mut root = ParamsTree::new("0:root", q("get_root_state"));
        let mut child = ParamsTree::new("0:child", q("run"));
        let grandchild = ParamsTree::new("0:grandchild", q("run"));
        child.add_child(grandchild);
        root.add_child(child);

        let found = root.find_node("0:grandchild").unwrap();
        assert_eq!(found.state_key, "0:grandchild");
    }

    #[test]
    fn find_node_missing_is_not_found() {
        let root = ParamsTree::new("0:root", q("get_root_state"));
        let err = root.find_node("0:missing").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn find_path_returns_root_to_node() {
        let mut root = ParamsTree::new("0:root", q("get_root_state"));
        let child = ParamsTree::new("0:child", q("run"));
        root.add_child(child);

        let path = root.find_path("0:child").unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].state_key, "0:root");
        assert_eq!(path[1].state_key, "0:child");
    }

    #[test]
    fn add_child_at_appends_to_named_parent() {
        let mut root = ParamsTree::new("0:root", q("get_root_state"));
        let child = ParamsTree::new("0:child", q("run"));
        root.add_child_at("0:root", child).unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].state_key, "0:child");
    }

    #[test]
    fn round_trips_through_json_without_parent_pointers() {
        let mut root = ParamsTree::new("0:root", q("get_root_state"));
        root.add_child(ParamsTree::new("0:child", q("run")));
        let raw = serde_json::to_string(&root).unwrap();
        let back: ParamsTree = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.children.len(), 1);
        assert_eq!(back.find_node("0:child").unwrap().state_key, "0:child");
    }
}
