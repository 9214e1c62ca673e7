//! Client-side mirror of a remote workspace file tree.
//!
//! [`explorer::Explorer`] keeps a lazily loaded tree in step with the
//! server through push notifications, debounced refreshes and fallback
//! polling, and applies creates, renames and deletes optimistically.

pub mod config;
pub mod error;
pub mod event;
pub mod expansion;
pub mod explorer;
pub mod handle;
pub mod logging;
pub mod mutation;
pub mod remote;
pub mod sync;
pub mod tree;
pub mod view;

pub use error::{ExplorerError, Result};
pub use explorer::{Explorer, Snapshot};
pub use handle::{Command, ExplorerHandle};
