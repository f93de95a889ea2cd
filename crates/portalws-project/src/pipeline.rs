use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use portalws_config::PortalWsConfig;
use serde::{Serialize, Serializer};

use crate::artifacts::{ArtifactLocator, CacheRoots};
use crate::completion::{complete_cache, ArtifactFetcher, CompletionOptions, CompletionReport};
use crate::discover::{discover_modules_with_options, DiscoverOptions, ProjectError};
use crate::extract::ExtractOptions;
use crate::loader::load_module;
use crate::model::{Coordinate, Module};
use crate::reconcile::{reconcile, ReconcileOptions, ReconcileReport};
use crate::registry::VersionRegistry;

/// Everything the IDE/descriptor emitters consume.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedWorkspace {
    pub workspace_root: PathBuf,
    /// Sorted by module path.
    pub modules: Vec<Module>,
    #[serde(serialize_with = "serialize_libraries")]
    pub libraries: BTreeMap<Coordinate, Vec<PathBuf>>,
    /// Coordinates no cache root holds, transitive dependencies of located libraries
    /// included. Sorted.
    pub missing: Vec<Coordinate>,
    pub report: ReconcileReport,
    /// `None` when completion is disabled or nothing was missing.
    pub completion: Option<CompletionReport>,
}

fn serialize_libraries<S: Serializer>(
    libraries: &BTreeMap<Coordinate, Vec<PathBuf>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(libraries.iter().map(|(coordinate, paths)| (coordinate.to_string(), paths)))
}

/// Discover and load every module below `root` without touching the caches.
pub fn load_modules(
    root: impl AsRef<Path>,
    config: &PortalWsConfig,
) -> Result<(PathBuf, Vec<Module>), ProjectError> {
    let root = root.as_ref();
    let workspace_root = std::fs::canonicalize(root).map_err(|source| ProjectError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let discovered =
        discover_modules_with_options(&workspace_root, &DiscoverOptions::from(&config.discovery))?;
    let extract_options = ExtractOptions::from(&config.reconcile);
    let modules: Vec<Module> = discovered
        .iter()
        .map(|module| load_module(&workspace_root, module, &extract_options))
        .collect();

    tracing::info!(
        target = "portalws.discover",
        root = %workspace_root.display(),
        modules = modules.len(),
        "loaded workspace modules"
    );
    Ok((workspace_root, modules))
}

/// Run the whole pipeline: discover, extract, register, reconcile, locate, complete, re-locate.
pub fn resolve_workspace(
    root: impl AsRef<Path>,
    config: &PortalWsConfig,
    fetcher: &dyn ArtifactFetcher,
) -> Result<ResolvedWorkspace, ProjectError> {
    let (workspace_root, mut modules) = load_modules(root, config)?;

    // Every module must be registered before any dependency is rewritten.
    let registry = VersionRegistry::build(&modules);

    let roots = CacheRoots::from_config(
        &workspace_root,
        modules.iter().map(|module| module.root.as_path()),
        &config.caches,
    );
    let mut locator = ArtifactLocator::new(roots);

    backfill_bom_versions(&mut modules, &mut locator);
    let report = reconcile(
        &mut modules,
        &registry,
        &ReconcileOptions::from(&config.reconcile),
        &mut locator,
    );

    let coordinates: Vec<Coordinate> = library_coordinates(&modules).into_iter().collect();
    let unresolved = locator.unresolved(&coordinates);

    let completion = if config.completion.enabled && !unresolved.is_empty() {
        Some(complete_cache(
            &mut locator,
            &coordinates,
            fetcher,
            &CompletionOptions::from(&config.completion),
        ))
    } else {
        None
    };

    let missing = locator.unresolved(&coordinates);
    let mut libraries = BTreeMap::new();
    for coordinate in coordinates {
        let paths = locator.locate(&coordinate);
        libraries.insert(coordinate, paths);
    }

    tracing::info!(
        target = "portalws.artifacts",
        libraries = libraries.len(),
        missing = missing.len(),
        searches = locator.searches(),
        "located library artifacts"
    );

    Ok(ResolvedWorkspace {
        workspace_root,
        modules,
        libraries,
        missing,
        report,
        completion,
    })
}

/// Fill versions of version-less grouped libraries from the module's BOM imports.
fn backfill_bom_versions(modules: &mut [Module], locator: &mut ArtifactLocator) {
    for module in modules.iter_mut() {
        if module.bom_dependencies.is_empty()
            || !module
                .library_dependencies
                .iter()
                .any(|lib| lib.group.is_some() && lib.version.is_none())
        {
            continue;
        }

        let mut managed = BTreeMap::new();
        for bom in &module.bom_dependencies {
            let coordinate = Coordinate::new(&bom.group, &bom.name, &bom.version);
            for (key, version) in locator.managed_versions(&coordinate) {
                managed.entry(key).or_insert(version);
            }
        }

        for lib in &mut module.library_dependencies {
            let (Some(group), None) = (&lib.group, &lib.version) else {
                continue;
            };
            lib.version = managed.get(&format!("{group}:{}", lib.name)).cloned();
            if lib.version.is_none() {
                tracing::debug!(
                    target = "portalws.extract",
                    module = %module.module_name,
                    dependency = %format!("{group}:{}", lib.name),
                    "no BOM pins this dependency"
                );
            }
        }
    }
}

fn library_coordinates(modules: &[Module]) -> BTreeSet<Coordinate> {
    modules
        .iter()
        .flat_map(|module| module.library_dependencies.iter())
        .filter_map(|lib| lib.coordinate())
        .collect()
}
