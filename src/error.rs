use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, ExplorerError>;

/// Mutation kinds reported in [`ExplorerError::MutationFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Create,
    Rename,
    Delete,
}

impl std::fmt::Display for MutationOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MutationOp::Create => "create",
            MutationOp::Rename => "rename",
            MutationOp::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// Explorer error types.
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// A directory listing could not be fetched.
    #[error("Failed to load {path}: {message}")]
    FetchFailed { path: String, message: String },

    /// A create/rename/delete request was rejected or never reached the server.
    #[error("Failed to {op} {path}: {message}")]
    MutationFailed {
        op: MutationOp,
        path: String,
        message: String,
    },

    /// The push channel is not connected. Degrades to polling.
    #[error("Push channel unavailable: {0}")]
    TransportDown(String),

    /// Transport-level HTTP errors.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON from the server.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket errors from the push channel.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A configured server URL could not be used.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// I/O errors (config files, stdout).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure the explorer already recorded in its status field.
    #[error("{0}")]
    Reported(String),

    /// The explorer task has gone away.
    #[error("Explorer channel closed")]
    ChannelClosed,
}

impl ExplorerError {
    /// Human-readable text for the `error` status field.
    ///
    /// Fetch and mutation failures carry the server's own message; everything
    /// else falls back to the full display form.
    pub fn status_message(&self) -> String {
        match self {
            ExplorerError::FetchFailed { message, .. } => message.clone(),
            ExplorerError::MutationFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
