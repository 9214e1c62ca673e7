//! Normalized workspace paths.
//!
//! Every node is addressed by a normalized string: no leading or trailing
//! separator and no empty segments. The workspace root is the single
//! exception and is always [`ROOT_PATH`].

/// Path of the synthetic workspace root.
pub const ROOT_PATH: &str = "/";

const SEPARATOR: char = '/';

/// Normalize a caller-supplied path.
///
/// `""`, `"/"` and `"//"` all map to the root. Backslashes are treated as
/// separators so Windows-style input resolves to the same node.
pub fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path
        .split(|c| c == SEPARATOR || c == '\\')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.is_empty() {
        ROOT_PATH.to_string()
    } else {
        segments.join("/")
    }
}

/// Whether `path` (already normalized) is the workspace root.
pub fn is_root(path: &str) -> bool {
    path == ROOT_PATH
}

/// Join a normalized parent path and a single name.
pub fn join(parent: &str, name: &str) -> String {
    if is_root(parent) {
        normalize(name)
    } else {
        normalize(&format!("{}/{}", parent, name))
    }
}

/// Parent of a normalized path. The root has no parent.
pub fn parent(path: &str) -> Option<String> {
    if is_root(path) {
        return None;
    }
    match path.rfind(SEPARATOR) {
        Some(idx) => Some(path[..idx].to_string()),
        None => Some(ROOT_PATH.to_string()),
    }
}

/// Last segment of a normalized path (empty for the root).
pub fn leaf(path: &str) -> &str {
    if is_root(path) {
        return "";
    }
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Strict descendant check: `path` lies somewhere below `ancestor`.
///
/// Matching is by whole segments, so `src2/a` is not below `src`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    if path == ancestor {
        return false;
    }
    if is_root(ancestor) {
        return true;
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// `path` equals `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor || is_descendant(path, ancestor)
}

/// Move `path` from under `from` to under `to`.
///
/// Returns `None` when `path` is not within `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if path == from {
        return Some(to.to_string());
    }
    if !is_descendant(path, from) || is_root(from) {
        return None;
    }
    let rest = &path[from.len() + 1..];
    Some(join(to, rest))
}

/// Number of segments below the root (root is depth 0).
pub fn depth(path: &str) -> usize {
    if is_root(path) {
        0
    } else {
        path.split(SEPARATOR).count()
    }
}
