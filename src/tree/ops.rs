//! Structure-preserving tree transforms.
//!
//! Every transform consumes the tree and returns the updated one. Only the
//! spine from the root down to the target is rebuilt; sibling subtrees are
//! moved across untouched. Unresolved paths are no-ops: the mirror can lag
//! behind the server, and a late callback may name a node that is gone.

use crate::tree::node::{EditState, TreeNode};
use crate::tree::path;

/// Depth-first lookup by normalized path.
pub fn find_node<'a>(tree: &'a TreeNode, target: &str) -> Option<&'a TreeNode> {
    if tree.path == target {
        return Some(tree);
    }
    tree.children
        .iter()
        .find_map(|child| find_node(child, target))
}

/// Replace a directory's children and mark it loaded.
pub fn replace_children(tree: TreeNode, dir_path: &str, children: Vec<TreeNode>) -> TreeNode {
    update(tree, dir_path, |mut node| {
        if node.is_dir() {
            node.children = children;
            node.loaded = true;
            node.loading = false;
        }
        node
    })
}

/// Set or clear a directory's in-flight marker.
pub fn set_loading(tree: TreeNode, dir_path: &str, loading: bool) -> TreeNode {
    update(tree, dir_path, |mut node| {
        if node.is_dir() {
            node.loading = loading;
        }
        node
    })
}

/// Append a child to a directory.
///
/// No-op when the parent is missing, is a file, or already has a child at
/// the same path.
pub fn insert_child(tree: TreeNode, parent_path: &str, child: TreeNode) -> TreeNode {
    update(tree, parent_path, |mut node| {
        if node.is_dir() && !node.children.iter().any(|c| c.path == child.path) {
            node.children.push(child);
        }
        node
    })
}

/// Remove a node from its parent. The root is never removed.
pub fn remove_node(tree: TreeNode, target: &str) -> TreeNode {
    let Some(parent) = path::parent(target) else {
        return tree;
    };
    update(tree, &parent, |mut node| {
        node.children.retain(|c| c.path != target);
        node
    })
}

/// Swap the node at `target` for `replacement`, keeping its position.
pub fn replace_node(tree: TreeNode, target: &str, replacement: TreeNode) -> TreeNode {
    update(tree, target, |_| replacement)
}

/// Set the inline edit state of a single node.
pub fn set_edit_state(tree: TreeNode, target: &str, state: EditState) -> TreeNode {
    update(tree, target, |mut node| {
        node.edit_state = state;
        node
    })
}

/// Paths of every node currently in an editing state.
pub fn editing_paths(tree: &TreeNode) -> Vec<String> {
    let mut found = Vec::new();
    collect_editing(tree, &mut found);
    found
}

fn collect_editing(node: &TreeNode, found: &mut Vec<String>) {
    if node.edit_state.is_editing() {
        found.push(node.path.clone());
    }
    for child in &node.children {
        collect_editing(child, found);
    }
}

/// Rebuild the spine down to `target`, handing the target node to `apply`.
fn update<F>(tree: TreeNode, target: &str, apply: F) -> TreeNode
where
    F: FnOnce(TreeNode) -> TreeNode,
{
    let mut apply = Some(apply);
    update_inner(tree, target, &mut apply)
}

fn update_inner<F>(mut node: TreeNode, target: &str, apply: &mut Option<F>) -> TreeNode
where
    F: FnOnce(TreeNode) -> TreeNode,
{
    if node.path == target {
        return match apply.take() {
            Some(f) => f(node),
            None => node,
        };
    }
    if !path::is_descendant(target, &node.path) {
        return node;
    }
    let next = node
        .children
        .iter()
        .position(|c| path::is_within(target, &c.path));
    if let Some(idx) = next {
        let child = std::mem::take(&mut node.children[idx]);
        node.children[idx] = update_inner(child, target, apply);
    }
    node
}
