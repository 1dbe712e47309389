//! Path addressing into snapshot trees.
//!
//! Paths are dot-separated keys with optional bracketed indices:
//! `address.street`, `items.0.name` and `items[0].name` are all accepted.
//! Resolution is total: a path that leaves the tree yields `None`.

use crate::snapshot::Snapshot;

/// Split a path into its keys and indices, dropping empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(|c: char| c == '.' || c == '[' || c == ']')
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Resolve `path` inside `snapshot`.
///
/// A path with no segments returns `snapshot` unchanged. Each hop fails
/// with `None` when the current node is absent, is a leaf with path left
/// over, or lacks the requested key or index.
pub fn resolve<'a>(snapshot: Option<&'a Snapshot>, path: &str) -> Option<&'a Snapshot> {
    split_path(path)
        .into_iter()
        .try_fold(snapshot?, |node, segment| node.child(segment))
}

/// Like [`resolve`], but an absent path means "the node itself".
pub fn resolve_opt<'a>(
    snapshot: Option<&'a Snapshot>,
    path: Option<&str>,
) -> Option<&'a Snapshot> {
    match path {
        Some(path) => resolve(snapshot, path),
        None => snapshot,
    }
}
