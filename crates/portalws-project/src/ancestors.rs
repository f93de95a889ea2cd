//! Walking parent directories for marker files.

use std::path::{Path, PathBuf};

/// Walk `start` and its ancestors, nearest first, collecting every directory for which `visit`
/// returns a value.
///
/// When `stop` is given the walk ends after visiting `stop` (inclusive); if `start` is not
/// below `stop` the walk runs to the filesystem root.
pub fn search_ancestors<T>(
    start: &Path,
    stop: Option<&Path>,
    mut visit: impl FnMut(&Path) -> Option<T>,
) -> Vec<T> {
    let mut out = Vec::new();
    for dir in start.ancestors() {
        if let Some(found) = visit(dir) {
            out.push(found);
        }
        if stop.is_some_and(|stop| dir == stop) {
            break;
        }
    }
    out
}

/// Every ancestor of `start` (nearest first) containing `marker` as a directory, returned as
/// `dir/marker`.
pub fn ancestor_dirs_with(start: &Path, stop: Option<&Path>, marker: &str) -> Vec<PathBuf> {
    search_ancestors(start, stop, |dir| {
        let candidate = dir.join(marker);
        candidate.is_dir().then_some(candidate)
    })
}

/// Every ancestor of `start` (nearest first) containing `marker` as a file, returned as
/// `dir/marker`.
pub fn ancestor_files_named(start: &Path, stop: Option<&Path>, marker: &str) -> Vec<PathBuf> {
    search_ancestors(start, stop, |dir| {
        let candidate = dir.join(marker);
        candidate.is_file().then_some(candidate)
    })
}
