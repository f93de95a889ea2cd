//! Library <-> project dependency rewriting across the workspace.

use portalws_config::ReconcileConfig;
use serde::Serialize;

use crate::artifacts::ArtifactLocator;
use crate::model::{
    sort_dedup_libraries, sort_dedup_projects, Coordinate, LibraryDependency, Module,
    ProjectDependency,
};
use crate::registry::{RegistryEntry, VersionRegistry};
use crate::version::is_compatible;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Groups owned by the workspace; `com.liferay` also covers `com.liferay.portal`.
    pub workspace_groups: Vec<String>,
    pub third_party_prefixes: Vec<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from(&ReconcileConfig::default())
    }
}

impl From<&ReconcileConfig> for ReconcileOptions {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            workspace_groups: config.workspace_groups.clone(),
            third_party_prefixes: config.third_party_prefixes.clone(),
        }
    }
}

impl ReconcileOptions {
    pub fn is_workspace_group(&self, group: &str) -> bool {
        self.workspace_groups.iter().any(|owned| {
            group == owned
                || group
                    .strip_prefix(owned.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    fn is_third_party(&self, module_path: &str) -> bool {
        module_path
            .split('/')
            .any(|segment| self.third_party_prefixes.iter().any(|p| p == segment))
    }
}

/// One rewritten (or deliberately kept) dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversion {
    pub module: String,
    pub dependency: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionMismatch {
    pub module: String,
    pub dependency: String,
    pub requested: String,
    pub actual: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Library -> project.
    pub converted: Vec<Conversion>,
    /// Compatible, but kept as a library for classpath visibility between webroot modules.
    pub retained_for_classpath: Vec<Conversion>,
    /// Project -> library.
    pub reverted: Vec<Conversion>,
    pub mismatches: Vec<VersionMismatch>,
}

enum Decision<'a> {
    Keep,
    DropSelfReference,
    Convert(&'a RegistryEntry),
    RetainForClasspath(&'a RegistryEntry),
    Mismatch { actual: String },
}

/// Rewrite every module's dependencies against the finished `registry`.
///
/// The converse pass only turns a project dependency back into a library when `locator` finds
/// the artifact; a module reference is better than a broken library reference.
pub fn reconcile(
    modules: &mut [Module],
    registry: &VersionRegistry,
    options: &ReconcileOptions,
    locator: &mut ArtifactLocator,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for module in modules.iter_mut() {
        convert_libraries(module, registry, options, &mut report);
        revert_projects(module, registry, options, locator, &mut report);
        assign_exports(module, options);
        sort_dedup_libraries(&mut module.library_dependencies);
        sort_dedup_projects(&mut module.project_dependencies);
    }

    tracing::info!(
        target = "portalws.reconcile",
        converted = report.converted.len(),
        retained = report.retained_for_classpath.len(),
        reverted = report.reverted.len(),
        mismatches = report.mismatches.len(),
        "reconciled workspace dependencies"
    );
    report
}

fn convert_libraries(
    module: &mut Module,
    registry: &VersionRegistry,
    options: &ReconcileOptions,
    report: &mut ReconcileReport,
) {
    let mut libraries = Vec::with_capacity(module.library_dependencies.len());
    let mut projects = std::mem::take(&mut module.project_dependencies);

    for mut lib in std::mem::take(&mut module.library_dependencies) {
        match decide(module, &lib, registry, options) {
            Decision::Keep => libraries.push(lib),
            Decision::DropSelfReference => {
                tracing::debug!(
                    target = "portalws.reconcile",
                    module = %module.module_name,
                    dependency = %describe(&lib),
                    "dropping self reference"
                );
            }
            Decision::Convert(entry) => {
                report.converted.push(Conversion {
                    module: module.module_name.clone(),
                    dependency: describe(&lib),
                    target: entry.module_name.clone(),
                });
                projects.push(ProjectDependency {
                    name: entry.module_name.clone(),
                    test_scope: lib.test_scope,
                    exported: lib.exported,
                });
            }
            Decision::RetainForClasspath(entry) => {
                report.retained_for_classpath.push(Conversion {
                    module: module.module_name.clone(),
                    dependency: describe(&lib),
                    target: entry.module_name.clone(),
                });
                lib.classpath_only = true;
                libraries.push(lib);
            }
            Decision::Mismatch { actual } => {
                let requested = lib.version.clone().unwrap_or_default();
                tracing::warn!(
                    target = "portalws.reconcile",
                    module = %module.module_name,
                    dependency = %describe(&lib),
                    requested = %requested,
                    actual = %actual,
                    "incompatible version; keeping library dependency"
                );
                report.mismatches.push(VersionMismatch {
                    module: module.module_name.clone(),
                    dependency: describe(&lib),
                    requested,
                    actual,
                });
                libraries.push(lib);
            }
        }
    }

    module.library_dependencies = libraries;
    module.project_dependencies = projects;
}

fn decide<'a>(
    module: &Module,
    lib: &LibraryDependency,
    registry: &'a VersionRegistry,
    options: &ReconcileOptions,
) -> Decision<'a> {
    let entry = match lib.group.as_deref() {
        // Core library references name the module directly and carry no usable version.
        None => match registry.by_module_name(&lib.name) {
            Some(entry) if entry.module_path == module.module_path => {
                return Decision::DropSelfReference
            }
            Some(entry) => return Decision::Convert(entry),
            None => return Decision::Keep,
        },
        Some(group) if options.is_workspace_group(group) => match registry.lookup(&lib.name) {
            Some(entry) => entry,
            None => return Decision::Keep,
        },
        Some(_) => return Decision::Keep,
    };

    if entry.module_path == module.module_path {
        return Decision::DropSelfReference;
    }

    let requested = lib.version.as_deref().unwrap_or("default");
    let actual = entry.bundle_version.as_deref().unwrap_or("default");
    if !is_compatible(requested, actual) {
        return Decision::Mismatch {
            actual: actual.to_string(),
        };
    }

    if module.has_init_jsp && entry.has_init_jsp {
        Decision::RetainForClasspath(entry)
    } else {
        Decision::Convert(entry)
    }
}

fn revert_projects(
    module: &mut Module,
    registry: &VersionRegistry,
    options: &ReconcileOptions,
    locator: &mut ArtifactLocator,
    report: &mut ReconcileReport,
) {
    if !module.has_init_jsp {
        return;
    }

    let mut projects = Vec::with_capacity(module.project_dependencies.len());
    for project in std::mem::take(&mut module.project_dependencies) {
        let target = registry
            .by_module_name(&project.name)
            .filter(|entry| entry.has_init_jsp && entry.module_path != module.module_path);
        let Some(entry) = target else {
            projects.push(project);
            continue;
        };

        let coordinate = library_coordinate(entry, options);
        if locator.locate(&coordinate).is_empty() {
            tracing::debug!(
                target = "portalws.reconcile",
                module = %module.module_name,
                dependency = %project.name,
                coordinate = %coordinate,
                "artifact not found; keeping project dependency"
            );
            projects.push(project);
            continue;
        }

        report.reverted.push(Conversion {
            module: module.module_name.clone(),
            dependency: project.name.clone(),
            target: coordinate.to_string(),
        });
        module.library_dependencies.push(LibraryDependency {
            group: coordinate.group,
            name: coordinate.name,
            version: Some(coordinate.version),
            test_scope: project.test_scope,
            exported: project.exported,
            classpath_only: true,
        });
    }
    module.project_dependencies = projects;
}

/// The packaged artifact of a workspace module, as a library would reference it.
fn library_coordinate(entry: &RegistryEntry, options: &ReconcileOptions) -> Coordinate {
    let version = entry
        .bundle_version
        .clone()
        .unwrap_or_else(|| "default".to_string());
    match (
        &entry.bundle_symbolic_name,
        options.workspace_groups.first(),
    ) {
        (Some(symbolic_name), Some(group)) => Coordinate::new(group, symbolic_name, version),
        _ => Coordinate::ungrouped(&entry.module_name, version),
    }
}

fn assign_exports(module: &mut Module, options: &ReconcileOptions) {
    let module_wide = is_test_module(&module.module_name)
        || options.is_third_party(&module.module_path);

    for lib in &mut module.library_dependencies {
        lib.exported = module_wide
            || lib
                .group
                .as_deref()
                .is_some_and(|group| options.is_workspace_group(group));
    }
    // In-workspace targets are same-organisation by definition.
    for project in &mut module.project_dependencies {
        project.exported = true;
    }
}

fn is_test_module(name: &str) -> bool {
    name.ends_with("-test") || name.ends_with("-test-util")
}

fn describe(lib: &LibraryDependency) -> String {
    format!(
        "{}:{}:{}",
        lib.group.as_deref().unwrap_or_default(),
        lib.name,
        lib.version.as_deref().unwrap_or_default()
    )
}
