//! Portal workspace resolution.
//!
//! Turns a large multi-repository portal source tree into a reconciled module graph:
//! - module discovery by filesystem conventions
//! - dependency extraction from build scripts
//! - library -> project rewriting against the workspace's own bundles
//! - artifact lookup in local Maven/Gradle caches, with on-demand completion

mod ancestors;
mod artifacts;
mod completion;
mod discover;
mod extract;
mod layout;
mod loader;
mod manifest;
mod model;
mod pipeline;
mod pom;
mod reconcile;
mod registry;
mod version;

pub use ancestors::{ancestor_dirs_with, ancestor_files_named, search_ancestors};
pub use artifacts::{
    ArtifactLocator, CacheRoots, LibraryEntry, GRADLE_CACHE_MARKER, MAVEN_REPO_MARKER,
};
pub use completion::{
    complete_cache, ArtifactFetcher, CompletionOptions, CompletionReport, FetchError, MavenFetcher,
};
pub use discover::{
    discover_modules, discover_modules_with_options, is_module_dir, DiscoverOptions,
    DiscoveredModule, ProjectError, GITREPO_MARKER, MODULE_DESCRIPTORS, SOURCE_ROOTS,
};
pub use extract::{
    extract_dependencies, Declaration, DependencyMatcher, ExtractOptions, ExtractedDependencies,
    LiteralCoordinate, NamedArguments, PlatformImport, ProjectReference, Variables,
    VariableVersion, BUILD_FILE, DEFAULT_MATCHERS,
};
pub use layout::{scan_layout, DISABLE_MARKER};
pub use loader::{classify, load_module, relative_module_path};
pub use manifest::{parse_manifest, read_manifest, BundleManifest};
pub use model::*;
pub use pipeline::{load_modules, resolve_workspace, ResolvedWorkspace};
pub use reconcile::{reconcile, Conversion, ReconcileOptions, ReconcileReport, VersionMismatch};
pub use registry::{RegistryEntry, VersionRegistry};
pub use version::{is_compatible, is_range, is_wildcard};
