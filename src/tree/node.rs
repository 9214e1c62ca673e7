use serde::{Deserialize, Serialize};

use crate::remote::Entry;
use crate::tree::path::{self, ROOT_PATH};

/// Display label of the workspace root.
pub const ROOT_NAME: &str = "codespace";

/// Type of a remote filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "dir", alias = "directory")]
    Directory,
}

impl NodeKind {
    pub fn is_dir(self) -> bool {
        self == NodeKind::Directory
    }
}

/// Inline edit state of a node.
///
/// At most one node in the whole tree is in an editing variant; the
/// explorer's edit slot enforces this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EditState {
    #[default]
    None,
    /// Renaming a node the server already knows about.
    EditingExisting,
    /// Naming a provisional node. Committing a blank name discards it.
    EditingNew,
}

impl EditState {
    pub fn is_editing(self) -> bool {
        self != EditState::None
    }
}

/// A node in the mirrored tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub name: String,
    pub kind: NodeKind,
    pub path: String,
    pub children: Vec<TreeNode>,
    /// `children` reflects a completed listing. An empty, loaded directory
    /// and an unloaded one are different things.
    pub loaded: bool,
    /// A listing fetch for this directory is in flight.
    pub loading: bool,
    pub edit_state: EditState,
    pub size: Option<u64>,
    pub modified: Option<f64>,
}

impl Default for TreeNode {
    fn default() -> Self {
        Self::root()
    }
}

impl TreeNode {
    /// The synthetic workspace root, not yet loaded.
    pub fn root() -> Self {
        Self::new(ROOT_NAME, NodeKind::Directory, ROOT_PATH)
    }

    /// A bare node with no children and no metadata.
    pub fn new(name: &str, kind: NodeKind, path: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            path: path.to_string(),
            children: Vec::new(),
            loaded: false,
            loading: false,
            edit_state: EditState::None,
            size: None,
            modified: None,
        }
    }

    /// Build a node from a directory listing entry.
    ///
    /// The path is normalized; when the server omits it, it is derived from
    /// the listed parent and the entry name.
    pub fn from_entry(entry: &Entry, parent: &str) -> Self {
        let path = if entry.path.is_empty() {
            path::join(parent, &entry.name)
        } else {
            path::normalize(&entry.path)
        };
        let mut node = Self::new(&entry.name, entry.kind, &path);
        node.size = entry.size;
        node.modified = entry.modified;
        node
    }

    /// A provisional node awaiting a name, in `EditingNew` state.
    pub fn provisional(path: &str, kind: NodeKind) -> Self {
        let mut node = Self::new("", kind, path);
        node.edit_state = EditState::EditingNew;
        // Nothing to fetch for a directory the server has never seen.
        node.loaded = kind.is_dir();
        node
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_root(&self) -> bool {
        path::is_root(&self.path)
    }

    pub fn is_provisional(&self) -> bool {
        self.edit_state == EditState::EditingNew
    }

    /// Children, but only when they come from a completed listing.
    pub fn loaded_children(&self) -> Option<&[TreeNode]> {
        if self.is_dir() && self.loaded {
            Some(&self.children)
        } else {
            None
        }
    }
}
