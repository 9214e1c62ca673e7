//! Full-tree refresh: fetch root plus every expanded directory, then merge
//! the listings into the existing tree without losing expanded subtrees.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::expansion::ExpansionSet;
use crate::remote::{Entry, RemoteFs};
use crate::tree::path::{self, ROOT_PATH};
use crate::tree::TreeNode;

/// Default minimum spacing between two refreshes.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Suppresses refreshes that arrive too soon after the previous one.
///
/// Skipped requests are dropped, not queued.
#[derive(Debug, Clone)]
pub struct RefreshGate {
    interval: Duration,
    last: Option<Instant>,
}

impl RefreshGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Accept the refresh if the interval has passed since the last one.
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }

    /// Record a refresh that bypasses the gate.
    pub fn force(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Listings gathered by one refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshOutcome {
    /// Directory path to its fresh listing. Always contains the root.
    pub contents: HashMap<String, Vec<Entry>>,
    /// Directories whose listing failed, with the reason.
    pub failures: Vec<(String, String)>,
}

/// Fetch the root and then each directory in `expanded`, one at a time.
///
/// A failing root fails the whole refresh; any other failure is logged and
/// the directory keeps its previous children.
pub async fn fetch_all(remote: &dyn RemoteFs, expanded: Vec<String>) -> Result<RefreshOutcome> {
    let mut outcome = RefreshOutcome::default();
    let root = remote.list(ROOT_PATH).await?;
    outcome.contents.insert(ROOT_PATH.to_string(), root);

    for dir in expanded.into_iter().filter(|p| !path::is_root(p)) {
        match remote.list(&dir).await {
            Ok(entries) => {
                outcome.contents.insert(dir, entries);
            }
            Err(e) => {
                warn!(path = %dir, error = %e, "skipping directory during refresh");
                outcome.failures.push((dir, e.status_message()));
            }
        }
    }
    debug!(
        fetched = outcome.contents.len(),
        failed = outcome.failures.len(),
        "refresh fetch complete"
    );
    Ok(outcome)
}

/// Merge refreshed listings into `tree`.
///
/// Directories present in `contents` get their children replaced by the
/// fresh listing; a fresh child that was already a known directory keeps
/// its previous subtree so nested expansions survive. Directories outside
/// `contents` keep their children, but when they are collapsed those
/// children are marked stale so the next expansion fetches again.
pub fn reconcile(
    tree: TreeNode,
    contents: &HashMap<String, Vec<Entry>>,
    expanded: &ExpansionSet,
) -> TreeNode {
    reconcile_node(tree, contents, expanded)
}

fn reconcile_node(
    mut node: TreeNode,
    contents: &HashMap<String, Vec<Entry>>,
    expanded: &ExpansionSet,
) -> TreeNode {
    if !node.is_dir() {
        return node;
    }

    if let Some(entries) = contents.get(&node.path) {
        let mut previous: HashMap<String, TreeNode> = std::mem::take(&mut node.children)
            .into_iter()
            .map(|c| (c.path.clone(), c))
            .collect();
        node.children = entries
            .iter()
            .map(|entry| {
                let fresh = TreeNode::from_entry(entry, &node.path);
                let merged = match previous.remove(&fresh.path) {
                    Some(prev) if prev.is_dir() && fresh.is_dir() => carry_subtree(fresh, prev),
                    _ => fresh,
                };
                reconcile_node(merged, contents, expanded)
            })
            .collect();
        node.loaded = true;
        node.loading = false;
    } else {
        node.children = std::mem::take(&mut node.children)
            .into_iter()
            .map(|c| reconcile_node(c, contents, expanded))
            .collect();
        if node.loaded && !expanded.contains(&node.path) {
            node.loaded = false;
        }
    }
    node
}

/// Keep the fresh metadata but the previous children and load state.
fn carry_subtree(mut fresh: TreeNode, prev: TreeNode) -> TreeNode {
    fresh.children = prev.children;
    fresh.loaded = prev.loaded;
    fresh.loading = prev.loading;
    fresh
}
