use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a module participates in the portal build; decides dependency-name defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    /// Top-level portal sources (`portal-kernel`, `portal-impl`, ...).
    Core,
    /// OSGi module with a `bnd.bnd`.
    Module,
    /// Legacy plugin with a `docroot/`.
    Plugin,
}

/// A fully or partially qualified artifact coordinate.
///
/// `group == None` marks an ungrouped core library (e.g. `portal-kernel`), which is resolved
/// against the workspace's library folders instead of a package cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub group: Option<String>,
    pub name: String,
    pub version: String,
}

impl Coordinate {
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: Some(group.into()),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn ungrouped(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: None,
            name: name.into(),
            version: version.into(),
        }
    }

    /// Parses `group:name:version`; returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split(':');
        let group = parts.next()?.trim();
        let name = parts.next()?.trim();
        let version = parts.next()?.trim();
        if parts.next().is_some() || group.is_empty() || name.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self::new(group, name, version))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.group.as_deref().unwrap_or_default(),
            self.name,
            self.version
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LibraryDependency {
    pub group: Option<String>,
    pub name: String,
    pub version: Option<String>,
    pub test_scope: bool,
    pub exported: bool,
    /// Kept as a library (instead of a project reference) so the webroot/init-jsp
    /// integration sees it on the classpath.
    pub classpath_only: bool,
}

impl LibraryDependency {
    pub fn new(group: Option<&str>, name: &str, version: Option<&str>, test_scope: bool) -> Self {
        Self {
            group: group.map(str::to_owned),
            name: name.to_owned(),
            version: version.map(str::to_owned),
            test_scope,
            exported: false,
            classpath_only: false,
        }
    }

    /// The coordinate to look up. Grouped dependencies need a version; ungrouped core
    /// libraries are looked up by name alone.
    pub fn coordinate(&self) -> Option<Coordinate> {
        let version = match (&self.group, &self.version) {
            (_, Some(version)) => version.clone(),
            (None, None) => "default".to_string(),
            (Some(_), None) => return None,
        };
        Some(Coordinate {
            group: self.group.clone(),
            name: self.name.clone(),
            version,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectDependency {
    /// Target module's `module_name`.
    pub name: String,
    pub test_scope: bool,
    pub exported: bool,
}

impl ProjectDependency {
    pub fn new(name: &str, test_scope: bool) -> Self {
        Self {
            name: name.to_owned(),
            test_scope,
            exported: false,
        }
    }
}

/// Version pin from a BOM/platform import. Never a dependency by itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BomDependency {
    pub group: String,
    pub name: String,
    pub version: String,
}

/// Conventional source layout of a module; every path is relative to the module directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLayout {
    pub source_folders: BTreeSet<String>,
    pub resource_folders: BTreeSet<String>,
    pub test_source_folders: BTreeSet<String>,
    pub test_resource_folders: BTreeSet<String>,
    pub webroot_folders: BTreeSet<String>,
    pub exclude_folders: BTreeSet<String>,
}

impl SourceLayout {
    pub fn has_sources(&self) -> bool {
        !self.source_folders.is_empty()
            || !self.resource_folders.is_empty()
            || !self.test_source_folders.is_empty()
            || !self.test_resource_folders.is_empty()
            || !self.webroot_folders.is_empty()
    }
}

/// A discovered source unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub module_name: String,
    /// Path relative to the workspace root, `/`-separated. `.` for the root itself.
    pub module_path: String,
    /// Absolute module directory.
    pub root: PathBuf,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub bundle_symbolic_name: Option<String>,
    pub bundle_version: Option<String>,
    pub layout: SourceLayout,
    pub library_dependencies: Vec<LibraryDependency>,
    pub project_dependencies: Vec<ProjectDependency>,
    pub bom_dependencies: Vec<BomDependency>,
    pub has_init_jsp: bool,
    pub has_webroot: bool,
    /// Included from a pull-mode sub-repository; IDE emitters keep it unloaded.
    pub unload: bool,
    /// No sources and no dependencies.
    pub barebone: bool,
}

/// Sort and merge libraries declared more than once. A non-test declaration makes the merged
/// entry non-test.
pub(crate) fn sort_dedup_libraries(deps: &mut Vec<LibraryDependency>) {
    deps.sort_by(|a, b| {
        a.group
            .cmp(&b.group)
            .then(a.name.cmp(&b.name))
            .then(a.version.cmp(&b.version))
    });
    deps.dedup_by(|next, kept| {
        let same = kept.group == next.group && kept.name == next.name && kept.version == next.version;
        if same {
            kept.test_scope &= next.test_scope;
            kept.exported |= next.exported;
            kept.classpath_only |= next.classpath_only;
        }
        same
    });
}

pub(crate) fn sort_dedup_projects(deps: &mut Vec<ProjectDependency>) {
    deps.sort_by(|a, b| a.name.cmp(&b.name));
    deps.dedup_by(|next, kept| {
        let same = kept.name == next.name;
        if same {
            kept.test_scope &= next.test_scope;
            kept.exported |= next.exported;
        }
        same
    });
}

pub(crate) fn sort_dedup_boms(boms: &mut Vec<BomDependency>) {
    boms.sort();
    boms.dedup();
}
