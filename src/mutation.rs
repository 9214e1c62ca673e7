//! Optimistic mutation bookkeeping: the single edit slot, provisional
//! node allocation and the commit decision table.
//!
//! The explorer applies the decisions; this module only decides.

use crate::remote::CreateRequest;
use crate::tree::path;
use crate::tree::{NodeKind, TreeNode};

/// What the active edit is operating on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    /// A provisional node awaiting its first name.
    New { parent: String, kind: NodeKind },
    /// A node the server already knows, carrying its current name.
    Existing { original_name: String },
}

/// The one in-progress inline edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSlot {
    /// Identifies this edit across its in-flight request; the path alone
    /// can be reused by a server node.
    pub id: u64,
    /// Path of the node being edited (synthetic for provisional nodes).
    pub path: String,
    pub target: EditTarget,
    /// Last text the user committed, kept across failures for retry.
    pub draft: String,
    /// A create/rename request for this edit is in flight.
    pub in_flight: bool,
    /// Message of the last rejected attempt.
    pub error: Option<String>,
}

impl EditSlot {
    pub fn new_entry(id: u64, path: &str, parent: &str, kind: NodeKind) -> Self {
        Self {
            id,
            path: path.to_string(),
            target: EditTarget::New {
                parent: parent.to_string(),
                kind,
            },
            draft: String::new(),
            in_flight: false,
            error: None,
        }
    }

    pub fn rename(id: u64, node: &TreeNode) -> Self {
        Self {
            id,
            path: node.path.clone(),
            target: EditTarget::Existing {
                original_name: node.name.clone(),
            },
            draft: node.name.clone(),
            in_flight: false,
            error: None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self.target, EditTarget::New { .. })
    }

    /// Source and destination of a rename whose request is in flight.
    pub fn rename_in_flight(&self) -> Option<(String, String)> {
        if !self.in_flight || self.is_provisional() {
            return None;
        }
        let parent = path::parent(&self.path).unwrap_or_else(|| path::ROOT_PATH.to_string());
        Some((self.path.clone(), path::join(&parent, &self.draft)))
    }
}

/// Outcome of committing an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitPlan {
    /// Blank name on a provisional node: drop it.
    Discard,
    /// Blank name on an existing node: keep editing, send nothing.
    KeepEditing,
    /// Name unchanged on an existing node: leave edit mode.
    Finish,
    /// Name rejected locally before reaching the server.
    Invalid(String),
    Create(CreateRequest),
    Rename { path: String, new_name: String },
}

/// Decide what committing `name` against `slot` means.
pub fn plan_commit(slot: &EditSlot, name: &str) -> CommitPlan {
    let name = name.trim();
    match &slot.target {
        EditTarget::New { parent, kind } => {
            if name.is_empty() {
                return CommitPlan::Discard;
            }
            if let Some(reason) = invalid_name(name) {
                return CommitPlan::Invalid(reason);
            }
            CommitPlan::Create(CreateRequest {
                name: name.to_string(),
                kind: *kind,
                parent: parent.clone(),
                content: None,
            })
        }
        EditTarget::Existing { original_name } => {
            if name.is_empty() {
                return CommitPlan::KeepEditing;
            }
            if name == original_name {
                return CommitPlan::Finish;
            }
            if let Some(reason) = invalid_name(name) {
                return CommitPlan::Invalid(reason);
            }
            CommitPlan::Rename {
                path: slot.path.clone(),
                new_name: name.to_string(),
            }
        }
    }
}

/// Names must be a single path segment.
fn invalid_name(name: &str) -> Option<String> {
    if name == "." || name == ".." {
        return Some(format!("'{}' is not a valid name", name));
    }
    if name.contains('/') || name.contains('\\') {
        return Some(format!("'{}' must not contain a path separator", name));
    }
    None
}

/// Synthetic path for a new provisional node under `parent`.
///
/// Uses `new_file` / `new_folder`, suffixed `_1`, `_2`, ... when a sibling
/// already occupies the path.
pub fn provisional_path(parent: &TreeNode, kind: NodeKind) -> String {
    let stem = match kind {
        NodeKind::File => "new_file",
        NodeKind::Directory => "new_folder",
    };
    let taken = |candidate: &str| parent.children.iter().any(|c| c.path == candidate);
    let first = path::join(&parent.path, stem);
    if !taken(&first) {
        return first;
    }
    let mut counter = 1;
    loop {
        let candidate = path::join(&parent.path, &format!("{}_{}", stem, counter));
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Identifies an in-flight mutation when its completion arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationTicket {
    Create {
        edit: u64,
        created: String,
    },
    Rename {
        edit: u64,
        from: String,
        to: String,
    },
    Delete {
        path: String,
    },
}
