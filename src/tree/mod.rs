pub mod node;
pub mod ops;
pub mod path;

pub use node::{EditState, NodeKind, TreeNode, ROOT_NAME};
pub use path::ROOT_PATH;
