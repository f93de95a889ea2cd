use std::collections::HashMap;
use std::path::{Path, PathBuf};

use portalws_config::DiscoveryConfig;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::ancestors::ancestor_files_named;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse XML in {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },

    #[error("workspace root {root} is not a directory")]
    NotADirectory { root: PathBuf },
}

/// Build descriptors; any one of them marks a candidate module directory.
pub const MODULE_DESCRIPTORS: &[&str] = &["bnd.bnd", "build.gradle", "build.xml", "pom.xml", "ivy.xml"];

/// Source roots; a candidate needs at least one.
pub const SOURCE_ROOTS: &[&str] = &[
    "src/main/java",
    "src/main/resources",
    "src",
    "docroot",
    "src/test/java",
    "src/testIntegration/java",
];

const PRUNED_DIRS: &[&str] = &[
    "node_modules",
    "build",
    "classes",
    "bin",
    "tmp",
    "target",
    "archetype-resources",
    "project-templates",
    "test-classes",
    "testdata",
    // Source trees never contain modules; skipping them keeps the walk cheap.
    "src",
    "docroot",
];

/// Repository-linkage marker written by `git subrepo`.
pub const GITREPO_MARKER: &str = ".gitrepo";

#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    pub max_depth: usize,
    pub include_pull_repos: bool,
    /// Sub-repository roots (relative to the workspace root) included even in pull mode.
    pub include_sub_repos: Vec<PathBuf>,
    pub skip_dirs: Vec<String>,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self::from(&DiscoveryConfig::default())
    }
}

impl From<&DiscoveryConfig> for DiscoverOptions {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            include_pull_repos: config.include_pull_repos,
            include_sub_repos: config.include_sub_repos.clone(),
            skip_dirs: config.skip_dirs.clone(),
        }
    }
}

/// A module directory found by [`discover_modules_with_options`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiscoveredModule {
    pub dir: PathBuf,
    /// The directory belongs to an explicitly included pull-mode sub-repository.
    pub unload: bool,
}

pub fn discover_modules(root: impl AsRef<Path>, max_depth: usize) -> Result<Vec<PathBuf>, ProjectError> {
    let options = DiscoverOptions {
        max_depth,
        ..DiscoverOptions::default()
    };
    Ok(discover_modules_with_options(root, &options)?
        .into_iter()
        .map(|module| module.dir)
        .collect())
}

/// Walk `root` up to `options.max_depth` levels and return every module directory, sorted.
///
/// Unreadable directories are skipped. Only an unusable `root` is an error.
pub fn discover_modules_with_options(
    root: impl AsRef<Path>,
    options: &DiscoverOptions,
) -> Result<Vec<DiscoveredModule>, ProjectError> {
    let root = root.as_ref();
    let root = std::fs::canonicalize(root).map_err(|source| ProjectError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    if !root.is_dir() {
        return Err(ProjectError::NotADirectory { root });
    }

    let mut sub_repos = SubRepoModes::default();
    let mut out = Vec::new();

    let walker = WalkDir::new(&root)
        .max_depth(options.max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_pruned(entry, options));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(
                    target = "portalws.discover",
                    path = ?err.path(),
                    error = %err,
                    "skipping unreadable directory (best effort)"
                );
                continue;
            }
        };
        if !entry.file_type().is_dir() || !is_module_dir(entry.path()) {
            continue;
        }

        let dir = entry.into_path();
        let unload = match sub_repos.pull_repo_for(&root, &dir) {
            None => false,
            Some(sub_repo) if is_included(&root, &sub_repo, options) => true,
            Some(sub_repo) => {
                tracing::debug!(
                    target = "portalws.discover",
                    path = %dir.display(),
                    sub_repo = %sub_repo.display(),
                    "skipping module in pull-mode sub-repository"
                );
                continue;
            }
        };
        out.push(DiscoveredModule { dir, unload });
    }

    out.sort();
    out.dedup();
    Ok(out)
}

/// A descriptor plus at least one conventional source root.
pub fn is_module_dir(dir: &Path) -> bool {
    MODULE_DESCRIPTORS
        .iter()
        .any(|name| dir.join(name).is_file())
        && SOURCE_ROOTS.iter().any(|rel| dir.join(rel).is_dir())
}

fn is_pruned(entry: &DirEntry, options: &DiscoverOptions) -> bool {
    if entry.path_is_symlink() || !entry.file_type().is_dir() {
        return true;
    }
    let Some(name) = entry.file_name().to_str() else {
        return true;
    };
    if name.starts_with('.') || name.ends_with("-archetype") || PRUNED_DIRS.contains(&name) {
        return true;
    }
    if options.skip_dirs.iter().any(|skip| skip == name) {
        return true;
    }
    // Fixture trees such as `test/dependencies/...` hold fake modules.
    name == "dependencies"
        && entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .is_some_and(|parent| parent == "test")
}

fn is_included(root: &Path, sub_repo: &Path, options: &DiscoverOptions) -> bool {
    if options.include_pull_repos {
        return true;
    }
    let rel = sub_repo.strip_prefix(root).unwrap_or(sub_repo);
    options
        .include_sub_repos
        .iter()
        .any(|included| included == rel || root.join(included) == sub_repo)
}

/// Memoized `.gitrepo` lookups, keyed by marker path.
#[derive(Debug, Default)]
struct SubRepoModes {
    pull: HashMap<PathBuf, bool>,
}

impl SubRepoModes {
    /// The root of the pull-mode sub-repository containing `dir`, if the nearest marker says
    /// `mode = pull`.
    fn pull_repo_for(&mut self, root: &Path, dir: &Path) -> Option<PathBuf> {
        let marker = ancestor_files_named(dir, Some(root), GITREPO_MARKER)
            .into_iter()
            .next()?;
        let is_pull = *self
            .pull
            .entry(marker.clone())
            .or_insert_with(|| read_is_pull(&marker));
        if is_pull {
            marker.parent().map(Path::to_path_buf)
        } else {
            None
        }
    }
}

fn read_is_pull(marker: &Path) -> bool {
    match std::fs::read_to_string(marker) {
        Ok(text) => portalws_properties::parse(&text)
            .get("mode")
            .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("pull")),
        Err(err) => {
            tracing::debug!(
                target = "portalws.discover",
                path = %marker.display(),
                error = %err,
                "failed to read sub-repository marker (best effort)"
            );
            false
        }
    }
}
