//! Flattened tree snapshots for inspection

use crate::element::UIElement;
use crate::search;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub index: usize,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub depth: usize,
    pub children_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub root: String,
    pub element_count: usize,
    pub nodes: Vec<TreeNode>,
}

/// Pre-order dump of `root` and its descendants down to `max_depth`.
pub fn snapshot(root: &UIElement, max_depth: usize) -> TreeSnapshot {
    let mut nodes = vec![node(root, 0, 0)];
    search::visit_descendants(root, max_depth, |el, path| {
        nodes.push(node(el, nodes.len(), path.len()));
        ControlFlow::Continue(())
    });
    TreeSnapshot {
        root: root.to_string(),
        element_count: nodes.len(),
        nodes,
    }
}

fn node(el: &UIElement, index: usize, depth: usize) -> TreeNode {
    let info = el.info();
    TreeNode {
        index,
        role: info.role,
        identifier: info.identifier,
        title: info.title,
        value: info.value,
        description: info.description,
        depth,
        children_count: el.children().len(),
    }
}
