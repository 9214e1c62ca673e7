use std::collections::BTreeSet;

use crate::tree::path::{self, ROOT_PATH};

/// Directories the user has opened in the tree view.
///
/// Independent of a node's `loaded` flag: a directory can be loaded but
/// collapsed, or expanded while its first listing is still in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionSet {
    paths: BTreeSet<String>,
}

impl Default for ExpansionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpansionSet {
    /// A set containing only the workspace root.
    pub fn new() -> Self {
        let mut paths = BTreeSet::new();
        paths.insert(ROOT_PATH.to_string());
        Self { paths }
    }

    pub fn contains(&self, dir: &str) -> bool {
        self.paths.contains(dir)
    }

    /// Returns `true` if the path was not already expanded.
    pub fn insert(&mut self, dir: &str) -> bool {
        self.paths.insert(dir.to_string())
    }

    /// Remove a single path, leaving descendants alone.
    pub fn remove(&mut self, dir: &str) -> bool {
        self.paths.remove(dir)
    }

    /// Collapse `dir` and every expanded directory below it.
    ///
    /// Returns the number of paths removed.
    pub fn collapse(&mut self, dir: &str) -> usize {
        let before = self.paths.len();
        self.paths.retain(|p| !path::is_within(p, dir));
        before - self.paths.len()
    }

    /// Keep only the paths for which `keep` returns true.
    pub fn retain<F: FnMut(&str) -> bool>(&mut self, mut keep: F) {
        self.paths.retain(|p| keep(p));
    }

    /// Move `from` and everything expanded below it to live under `to`.
    pub fn rebase(&mut self, from: &str, to: &str) {
        let moved: Vec<String> = self
            .paths
            .iter()
            .filter(|p| path::is_within(p, from))
            .cloned()
            .collect();
        for old in moved {
            self.paths.remove(&old);
            if let Some(new) = path::rebase(&old, from, to) {
                self.paths.insert(new);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Expanded paths ordered so ancestors come before descendants.
    pub fn in_refresh_order(&self) -> Vec<String> {
        let mut ordered: Vec<String> = self.paths.iter().cloned().collect();
        ordered.sort_by(|a, b| {
            path::depth(a)
                .cmp(&path::depth(b))
                .then_with(|| a.cmp(b))
        });
        ordered
    }
}
