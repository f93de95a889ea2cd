//! Locating dependency artifacts in local package caches.
//!
//! Two cache layouts are understood:
//! - Maven local repositories (`group/as/path/name/version/name-version.jar`)
//! - Gradle's module cache (`group/name/version/<hash>/<file>`), where the file is found by
//!   listing the version directory.
//!
//! When a coordinate has a `.pom`, its parent chain, relocation and declared dependencies are
//! followed so the entry carries the full transitive jar list.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use portalws_config::CachesConfig;
use serde::Serialize;
use walkdir::WalkDir;

use crate::ancestors::ancestor_dirs_with;
use crate::model::Coordinate;
use crate::pom::{self, resolve_placeholders, RawPom};

pub const MAVEN_REPO_MARKER: &str = ".m2/repository";
pub const GRADLE_CACHE_MARKER: &str = ".gradle/caches/modules-2/files-2.1";

/// Ordered cache roots searched by [`ArtifactLocator`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRoots {
    pub maven: Vec<PathBuf>,
    pub gradle: Vec<PathBuf>,
    /// Folders holding ungrouped core libraries as `<name>.jar`.
    pub core_lib_dirs: Vec<PathBuf>,
}

impl CacheRoots {
    /// Collect cache roots from every ancestor of every module directory, then `home`'s caches,
    /// then the extra roots. Duplicates keep their first position.
    pub fn discover<'a>(
        module_dirs: impl IntoIterator<Item = &'a Path>,
        home: Option<&Path>,
        extra_maven: &[PathBuf],
        extra_gradle: &[PathBuf],
    ) -> Self {
        let mut roots = CacheRoots::default();
        let mut visited = HashSet::new();

        for dir in module_dirs {
            // Siblings share ancestors; stat each directory once.
            if !visited.insert(dir.to_path_buf()) {
                continue;
            }
            for found in ancestor_dirs_with(dir, None, MAVEN_REPO_MARKER) {
                push_unique(&mut roots.maven, found);
            }
            for found in ancestor_dirs_with(dir, None, GRADLE_CACHE_MARKER) {
                push_unique(&mut roots.gradle, found);
            }
        }

        if let Some(home) = home {
            push_unique(&mut roots.maven, home.join(MAVEN_REPO_MARKER));
            push_unique(&mut roots.gradle, home.join(GRADLE_CACHE_MARKER));
        }
        for extra in extra_maven {
            push_unique(&mut roots.maven, extra.clone());
        }
        for extra in extra_gradle {
            push_unique(&mut roots.gradle, extra.clone());
        }
        roots
    }

    pub fn from_config<'a>(
        workspace_root: &Path,
        module_dirs: impl IntoIterator<Item = &'a Path>,
        config: &CachesConfig,
    ) -> Self {
        let home = if config.use_home { default_home() } else { None };
        let mut extra_gradle = config.gradle_caches.clone();
        if config.use_home {
            if let Some(gradle_home) = gradle_user_home_override() {
                extra_gradle.insert(0, gradle_home.join("caches/modules-2/files-2.1"));
            }
        }

        let mut roots =
            Self::discover(module_dirs, home.as_deref(), &config.maven_repos, &extra_gradle);
        roots.core_lib_dirs = config
            .core_lib_dirs
            .iter()
            .map(|dir| workspace_root.join(dir))
            .collect();
        roots
    }
}

fn push_unique(out: &mut Vec<PathBuf>, path: PathBuf) {
    if !out.contains(&path) {
        out.push(path);
    }
}

fn default_home() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn gradle_user_home_override() -> Option<PathBuf> {
    std::env::var_os("GRADLE_USER_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Memoized result for one coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryEntry {
    pub coordinate: Coordinate,
    /// Cache directory the artifact was found in.
    pub folder: Option<PathBuf>,
    /// The artifact's own jar (unless it is `pom` packaged) followed by its transitive jars.
    pub jar_paths: Vec<PathBuf>,
    /// Manifest properties, own values over inherited ones.
    pub variables: BTreeMap<String, String>,
    /// Parent manifest, if any; look it up with [`ArtifactLocator::entry`].
    pub parent: Option<Coordinate>,
    /// `group:name` -> version from dependency management, imported BOMs included.
    pub managed_versions: BTreeMap<String, String>,
    /// Coordinates the manifest chain references that no cache root holds yet.
    pub missing: Vec<Coordinate>,
}

impl LibraryEntry {
    fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            folder: None,
            jar_paths: Vec::new(),
            variables: BTreeMap::new(),
            parent: None,
            managed_versions: BTreeMap::new(),
            missing: Vec::new(),
        }
    }

    pub fn is_located(&self) -> bool {
        self.folder.is_some() || !self.jar_paths.is_empty()
    }
}

#[derive(Debug)]
struct CacheHit {
    folder: PathBuf,
    jar: Option<PathBuf>,
    pom: Option<PathBuf>,
}

/// Per-run artifact lookup with a memo keyed by coordinate.
///
/// Only complete results are memoized. An entry computed while one of its transitive
/// dependencies was still being resolved further up the stack lacks that dependency's
/// jars, so it is returned to its caller but searched again on the next lookup.
#[derive(Debug, Default)]
pub struct ArtifactLocator {
    roots: CacheRoots,
    entries: HashMap<Coordinate, LibraryEntry>,
    /// Coordinates being resolved, outermost first, each flagged once a cycle cuts it short.
    stack: Vec<(Coordinate, bool)>,
    searches: usize,
}

impl ArtifactLocator {
    pub fn new(roots: CacheRoots) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    pub fn roots(&self) -> &CacheRoots {
        &self.roots
    }

    /// Number of cache searches performed; memo hits do not count.
    pub fn searches(&self) -> usize {
        self.searches
    }

    pub fn entry(&self, coordinate: &Coordinate) -> Option<&LibraryEntry> {
        self.entries.get(coordinate)
    }

    /// Absolute artifact paths for `coordinate`, possibly empty.
    pub fn locate(&mut self, coordinate: &Coordinate) -> Vec<PathBuf> {
        self.resolve(coordinate)
            .map(|entry| entry.jar_paths)
            .unwrap_or_default()
    }

    /// Whether the artifact exists in any cache root.
    pub fn is_located(&mut self, coordinate: &Coordinate) -> bool {
        self.resolve(coordinate)
            .is_some_and(|entry| entry.is_located())
    }

    /// Versions pinned by `bom`'s dependency management.
    pub fn managed_versions(&mut self, bom: &Coordinate) -> BTreeMap<String, String> {
        self.resolve(bom)
            .map(|entry| entry.managed_versions)
            .unwrap_or_default()
    }

    /// Everything a cache fill would have to download for `coordinates`: the ones no cache
    /// root holds, plus what the located ones reference transitively but lack. Sorted and
    /// deduplicated.
    pub fn unresolved<'a>(
        &mut self,
        coordinates: impl IntoIterator<Item = &'a Coordinate>,
    ) -> Vec<Coordinate> {
        let mut out = Vec::new();
        for coordinate in coordinates {
            match self.resolve(coordinate) {
                Some(entry) if entry.is_located() => out.extend(entry.missing),
                _ => out.push(coordinate.clone()),
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// Forget every memoized result; the next lookups search the caches again.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn resolve(&mut self, coordinate: &Coordinate) -> Option<LibraryEntry> {
        if let Some(entry) = self.entries.get(coordinate) {
            return Some(entry.clone());
        }
        if let Some(depth) = self.stack.iter().position(|(c, _)| c == coordinate) {
            // Everything opened since `coordinate` will be missing its jars.
            for frame in &mut self.stack[depth + 1..] {
                frame.1 = true;
            }
            tracing::debug!(
                target = "portalws.artifacts",
                coordinate = %coordinate,
                "dependency cycle; skipping"
            );
            return None;
        }

        self.searches += 1;
        self.stack.push((coordinate.clone(), false));
        let entry = self.search(coordinate);
        let partial = self.stack.pop().is_some_and(|(_, partial)| partial);

        if !entry.is_located() {
            tracing::debug!(
                target = "portalws.artifacts",
                coordinate = %coordinate,
                "artifact not found in any cache root"
            );
        }
        if partial {
            tracing::debug!(
                target = "portalws.artifacts",
                coordinate = %coordinate,
                "incomplete because of a dependency cycle; not memoized"
            );
        } else {
            self.entries.insert(coordinate.clone(), entry.clone());
        }
        Some(entry)
    }

    /// Resolve a coordinate a manifest points at, noting it in `missing` when absent.
    fn follow(
        &mut self,
        target: &Coordinate,
        missing: &mut Vec<Coordinate>,
    ) -> Option<LibraryEntry> {
        let entry = self.resolve(target)?;
        if entry.is_located() {
            missing.extend(entry.missing.iter().cloned());
        } else {
            missing.push(target.clone());
        }
        Some(entry)
    }

    fn search(&mut self, coordinate: &Coordinate) -> LibraryEntry {
        let mut entry = LibraryEntry::new(coordinate.clone());

        let Some(group) = coordinate.group.clone() else {
            let file_name = format!("{}.jar", coordinate.name);
            if let Some(dir) = self
                .roots
                .core_lib_dirs
                .iter()
                .find(|dir| dir.join(&file_name).is_file())
            {
                entry.folder = Some(dir.clone());
                entry.jar_paths.push(dir.join(&file_name));
            }
            return entry;
        };

        let Some(hit) = self.find_in_caches(&group, &coordinate.name, &coordinate.version) else {
            return entry;
        };
        entry.folder = Some(hit.folder);

        let Some(pom_path) = hit.pom else {
            entry.jar_paths.extend(hit.jar);
            return entry;
        };
        match pom::read_pom(&pom_path) {
            Ok(raw) => self.apply_pom(&mut entry, &group, &raw, hit.jar),
            Err(err) => {
                tracing::debug!(
                    target = "portalws.artifacts",
                    path = %pom_path.display(),
                    error = %err,
                    "failed to read manifest (best effort)"
                );
                entry.jar_paths.extend(hit.jar);
            }
        }
        entry
    }

    fn apply_pom(
        &mut self,
        entry: &mut LibraryEntry,
        group: &str,
        raw: &RawPom,
        own_jar: Option<PathBuf>,
    ) {
        let coordinate = entry.coordinate.clone();
        let mut missing = Vec::new();

        let parent = raw
            .parent
            .as_ref()
            .map(|p| Coordinate::new(&p.group_id, &p.artifact_id, &p.version));
        let parent_entry = match &parent {
            Some(parent) => self.follow(parent, &mut missing),
            None => None,
        };
        entry.parent = parent;

        // own properties -> parent properties -> built-ins
        let builtins = raw.builtin_properties(group, &coordinate.name, &coordinate.version);
        let mut declared = parent_entry
            .as_ref()
            .map(|p| p.variables.clone())
            .unwrap_or_default();
        declared.extend(raw.properties.clone());
        let variables: BTreeMap<String, String> = declared
            .iter()
            .map(|(key, value)| {
                (
                    key.clone(),
                    resolve_placeholders(value, &[&declared, &builtins]),
                )
            })
            .collect();
        let interpolate = |text: &str| resolve_placeholders(text, &[&variables, &builtins]);

        let mut managed = parent_entry
            .map(|p| p.managed_versions)
            .unwrap_or_default();
        let mut imported = BTreeMap::new();
        for dep in &raw.dependency_management {
            let dep_group = interpolate(&dep.group_id);
            let dep_name = interpolate(&dep.artifact_id);
            let Some(version) = dep.version.as_deref().map(|v| interpolate(v)) else {
                continue;
            };
            if dep.is_bom_import() {
                let bom = Coordinate::new(dep_group, dep_name, version);
                let bom_managed = self
                    .follow(&bom, &mut missing)
                    .map(|e| e.managed_versions)
                    .unwrap_or_default();
                for (key, value) in bom_managed {
                    imported.entry(key).or_insert(value);
                }
            } else {
                managed.insert(format!("{dep_group}:{dep_name}"), version);
            }
        }
        for (key, value) in imported {
            managed.entry(key).or_insert(value);
        }

        let mut jars = Vec::new();
        if !raw.is_pom_packaging() {
            jars.extend(own_jar);
        }

        if let Some(relocation) = &raw.relocation {
            let target = Coordinate::new(
                relocation
                    .group_id
                    .as_deref()
                    .map(|g| interpolate(g))
                    .unwrap_or_else(|| group.to_string()),
                relocation
                    .artifact_id
                    .as_deref()
                    .map(|a| interpolate(a))
                    .unwrap_or_else(|| coordinate.name.clone()),
                relocation
                    .version
                    .as_deref()
                    .map(|v| interpolate(v))
                    .unwrap_or_else(|| coordinate.version.clone()),
            );
            if target != coordinate {
                tracing::debug!(
                    target = "portalws.artifacts",
                    from = %coordinate,
                    to = %target,
                    "following relocation"
                );
                if let Some(relocated) = self.follow(&target, &mut missing) {
                    jars.extend(relocated.jar_paths);
                }
            }
        }

        // Same group:name declared twice: the later declaration replaces the earlier one only
        // when its version sorts higher as a plain string, so "9.0" beats "10.0".
        let mut chosen: BTreeMap<(String, String), (String, Vec<PathBuf>)> = BTreeMap::new();
        for dep in raw.dependencies.iter().filter(|dep| dep.is_followed()) {
            let dep_group = interpolate(&dep.group_id);
            let dep_name = interpolate(&dep.artifact_id);
            let version = dep
                .version
                .as_deref()
                .map(|v| interpolate(v))
                .or_else(|| managed.get(&format!("{dep_group}:{dep_name}")).cloned());
            let Some(version) = version.filter(|v| !v.contains("${")) else {
                tracing::debug!(
                    target = "portalws.artifacts",
                    coordinate = %coordinate,
                    dependency = %format!("{dep_group}:{dep_name}"),
                    "unversioned transitive dependency; skipping"
                );
                continue;
            };

            let key = (dep_group.clone(), dep_name.clone());
            if chosen
                .get(&key)
                .is_some_and(|(existing, _)| version.as_str() <= existing.as_str())
            {
                continue;
            }
            let paths = self
                .follow(&Coordinate::new(dep_group, dep_name, version.clone()), &mut missing)
                .map(|e| e.jar_paths)
                .unwrap_or_default();
            chosen.insert(key, (version, paths));
        }
        for (_, (_, paths)) in chosen {
            jars.extend(paths);
        }

        let mut seen = HashSet::new();
        jars.retain(|path| seen.insert(path.clone()));

        missing.sort();
        missing.dedup();

        entry.jar_paths = jars;
        entry.variables = variables;
        entry.managed_versions = managed;
        entry.missing = missing;
    }

    fn find_in_caches(&self, group: &str, name: &str, version: &str) -> Option<CacheHit> {
        for root in &self.roots.maven {
            let dir = root.join(group.replace('.', "/")).join(name).join(version);
            if !dir.is_dir() {
                continue;
            }
            let jar = Some(dir.join(format!("{name}-{version}.jar"))).filter(|p| p.is_file());
            let pom = Some(dir.join(format!("{name}-{version}.pom"))).filter(|p| p.is_file());
            if jar.is_some() || pom.is_some() {
                return Some(CacheHit {
                    folder: dir,
                    jar,
                    pom,
                });
            }
        }

        for root in &self.roots.gradle {
            let base = root.join(group).join(name).join(version);
            if !base.is_dir() {
                continue;
            }
            let (jar, pom) = scan_gradle_version_dir(&base, name, version);
            if jar.is_some() || pom.is_some() {
                return Some(CacheHit {
                    folder: base,
                    jar,
                    pom,
                });
            }
        }

        None
    }
}

/// Gradle stores each file under a content-hash directory, so the names are found by listing.
fn scan_gradle_version_dir(base: &Path, name: &str, version: &str) -> (Option<PathBuf>, Option<PathBuf>) {
    let prefix = format!("{name}-{version}");

    let mut preferred = Vec::new();
    let mut others = Vec::new();
    let mut poms = Vec::new();

    for entry in WalkDir::new(base)
        .max_depth(2)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if has_extension(&path, "pom") {
            poms.push(path);
            continue;
        }
        if !has_extension(&path, "jar") || is_auxiliary_jar(&path) {
            continue;
        }

        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if file_name.starts_with(&prefix) {
            preferred.push(path);
        } else {
            others.push(path);
        }
    }

    preferred.sort();
    others.sort();
    poms.sort();
    let jar = preferred.into_iter().next().or_else(|| others.into_iter().next());
    (jar, poms.into_iter().next())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn is_auxiliary_jar(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    name.ends_with("-sources.jar") || name.ends_with("-javadoc.jar")
}
