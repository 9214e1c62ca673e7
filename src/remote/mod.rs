//! The server collaborator: directory listings, mutations and the wire
//! types they exchange.

pub mod http;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::NodeKind;

pub use http::HttpRemote;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// Seconds since the epoch, as reported by the server.
    #[serde(default)]
    pub modified: Option<f64>,
}

/// A request to create a file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub kind: NodeKind,
    pub parent: String,
    pub content: Option<String>,
}

/// Kind of server-side change carried by a push notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// A change notification from the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub path: String,
    #[serde(default, alias = "destPath")]
    pub dest_path: Option<String>,
    #[serde(default)]
    pub timestamp: f64,
}

/// Access to the server-owned file tree.
///
/// Implementations report listing failures as
/// [`ExplorerError::FetchFailed`](crate::error::ExplorerError::FetchFailed)
/// and rejected mutations as
/// [`ExplorerError::MutationFailed`](crate::error::ExplorerError::MutationFailed).
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// List the immediate children of a directory, in server order.
    async fn list(&self, path: &str) -> Result<Vec<Entry>>;

    async fn create(&self, request: &CreateRequest) -> Result<()>;

    /// Rename the node at `path` within its parent directory.
    async fn rename(&self, path: &str, new_name: &str) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;
}
