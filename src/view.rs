//! Visible-row projection of a [`Snapshot`] and its plain-text rendering.

use std::fmt::Write as _;

use crate::explorer::Snapshot;
use crate::mutation::EditSlot;
use crate::sync::ConnectionState;
use crate::tree::path;
use crate::tree::{EditState, NodeKind, TreeNode};

/// One visible row of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatItem {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    /// Root is depth 0.
    pub depth: usize,
    pub is_expanded: bool,
    pub is_last_sibling: bool,
    pub is_selected: bool,
    pub is_loading: bool,
    pub edit_state: EditState,
}

/// Rows for the root and every node under an expanded directory, in
/// display order.
pub fn flatten(snapshot: &Snapshot) -> Vec<FlatItem> {
    let mut items = Vec::new();
    flatten_node(&snapshot.tree, snapshot, 0, true, &mut items);
    items
}

fn flatten_node(
    node: &TreeNode,
    snapshot: &Snapshot,
    depth: usize,
    is_last: bool,
    items: &mut Vec<FlatItem>,
) {
    let is_expanded = node.is_dir() && snapshot.is_expanded(&node.path);
    items.push(FlatItem {
        name: display_name(node, snapshot.edit.as_ref()),
        path: node.path.clone(),
        kind: node.kind,
        depth,
        is_expanded,
        is_last_sibling: is_last,
        is_selected: node.path == snapshot.selection,
        is_loading: node.loading,
        edit_state: node.edit_state,
    });

    if is_expanded {
        let count = node.children.len();
        for (i, child) in node.children.iter().enumerate() {
            flatten_node(child, snapshot, depth + 1, i + 1 == count, items);
        }
    }
}

/// The typed draft wins while an edit is open; an unnamed provisional
/// node shows its synthetic leaf.
fn display_name(node: &TreeNode, edit: Option<&EditSlot>) -> String {
    match edit {
        Some(slot) if slot.path == node.path && !slot.draft.is_empty() => slot.draft.clone(),
        _ if node.name.is_empty() => path::leaf(&node.path).to_string(),
        _ => node.name.clone(),
    }
}

/// Box-drawing indentation for row `index`.
fn build_prefix(items: &[FlatItem], index: usize) -> String {
    let item = &items[index];
    if item.depth == 0 {
        return String::new();
    }
    let mut prefix = String::new();
    for d in 1..item.depth {
        // Nearest earlier row at depth `d` is this row's ancestor.
        let ancestor_is_last = items[..index]
            .iter()
            .rev()
            .take_while(|row| row.depth >= d)
            .find(|row| row.depth == d)
            .map(|row| row.is_last_sibling)
            .unwrap_or(false);
        prefix.push_str(if ancestor_is_last { "   " } else { "│  " });
    }
    prefix.push_str(if item.is_last_sibling { "└──" } else { "├──" });
    prefix
}

fn indicator(item: &FlatItem) -> &'static str {
    match item.kind {
        NodeKind::Directory if item.is_expanded => "▾ ",
        NodeKind::Directory => "▸ ",
        NodeKind::File => "  ",
    }
}

/// Render the tree as text lines.
pub fn render_tree(snapshot: &Snapshot) -> String {
    let items = flatten(snapshot);
    let mut out = String::new();
    for (idx, item) in items.iter().enumerate() {
        let marker = if item.is_selected { "> " } else { "  " };
        let mut suffix = String::new();
        if item.is_loading {
            suffix.push_str(" (loading)");
        }
        match item.edit_state {
            EditState::EditingNew => suffix.push_str(" [new]"),
            EditState::EditingExisting => suffix.push_str(" [renaming]"),
            EditState::None => {}
        }
        let _ = writeln!(
            out,
            "{}{}{}{}{}",
            marker,
            build_prefix(&items, idx),
            indicator(item),
            item.name,
            suffix
        );
    }
    out
}

/// One-line connection and error summary.
pub fn status_line(snapshot: &Snapshot) -> String {
    let connection = match snapshot.connection {
        ConnectionState::Connected => "live",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Disconnected => "polling",
    };
    let mut line = format!("[{}]", connection);
    if snapshot.loading {
        line.push_str(" refreshing");
    }
    if let Some(error) = &snapshot.error {
        let _ = write!(line, " error: {}", error);
    }
    line
}
