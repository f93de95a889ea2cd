//! Dependency extraction from Gradle build scripts.
//!
//! Extraction is regex based and never fails: text that no grammar understands simply yields
//! no dependency. Each grammar is a [`DependencyMatcher`]; [`DEFAULT_MATCHERS`] applies them in
//! order to every line of every `dependencies { ... }` block, and the union of their results is
//! deduplicated.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use portalws_config::ReconcileConfig;
use regex::Regex;

use crate::ancestors::{ancestor_files_named, search_ancestors};
use crate::model::{
    sort_dedup_boms, sort_dedup_libraries, sort_dedup_projects, BomDependency, LibraryDependency,
    ProjectDependency,
};

pub const BUILD_FILE: &str = "build.gradle";
const GRADLE_PROPERTIES: &str = "gradle.properties";
const MAX_VARIABLE_PASSES: usize = 8;

/// Names of the shared test-support modules appended to modules with test sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    pub unit_test_support_module: Option<String>,
    pub integration_test_support_module: Option<String>,
}

impl From<&ReconcileConfig> for ExtractOptions {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            unit_test_support_module: config.unit_test_support_module.clone(),
            integration_test_support_module: config.integration_test_support_module.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDependencies {
    pub library_dependencies: Vec<LibraryDependency>,
    pub project_dependencies: Vec<ProjectDependency>,
    pub bom_dependencies: Vec<BomDependency>,
}

impl ExtractedDependencies {
    pub fn is_empty(&self) -> bool {
        self.library_dependencies.is_empty()
            && self.project_dependencies.is_empty()
            && self.bom_dependencies.is_empty()
    }

    fn push(&mut self, declaration: Declaration) {
        match declaration {
            Declaration::Library(lib) => self.library_dependencies.push(lib),
            Declaration::Project(project) => self.project_dependencies.push(project),
            Declaration::Bom(bom) => self.bom_dependencies.push(bom),
        }
    }

    /// Add entries from `inherited` whose identity is not already present.
    fn merge_missing(&mut self, inherited: ExtractedDependencies) {
        for lib in inherited.library_dependencies {
            if !self
                .library_dependencies
                .iter()
                .any(|own| own.group == lib.group && own.name == lib.name)
            {
                self.library_dependencies.push(lib);
            }
        }
        for project in inherited.project_dependencies {
            if !self
                .project_dependencies
                .iter()
                .any(|own| own.name == project.name)
            {
                self.project_dependencies.push(project);
            }
        }
        for bom in inherited.bom_dependencies {
            if !self
                .bom_dependencies
                .iter()
                .any(|own| own.group == bom.group && own.name == bom.name)
            {
                self.bom_dependencies.push(bom);
            }
        }
    }

    fn normalize(&mut self) {
        sort_dedup_libraries(&mut self.library_dependencies);
        sort_dedup_projects(&mut self.project_dependencies);
        sort_dedup_boms(&mut self.bom_dependencies);
    }
}

/// One dependency declaration recognised by a matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Library(LibraryDependency),
    Project(ProjectDependency),
    Bom(BomDependency),
}

/// One dependency-declaration grammar.
///
/// New build dialects are supported by adding a matcher to [`DEFAULT_MATCHERS`].
pub trait DependencyMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Try to read a declaration from one logical line of a `dependencies` block.
    fn attempt(&self, line: &str, variables: &Variables) -> Option<Declaration>;
}

pub static DEFAULT_MATCHERS: &[&dyn DependencyMatcher] = &[
    &LiteralCoordinate,
    &NamedArguments,
    &VariableVersion,
    &ProjectReference,
    &PlatformImport,
];

/// `compile "g:n:v"`, `implementation("g:n:v:classifier")`, `api "g:n"`.
#[derive(Debug, Clone, Copy)]
pub struct LiteralCoordinate;

impl DependencyMatcher for LiteralCoordinate {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn attempt(&self, line: &str, variables: &Variables) -> Option<Declaration> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(
                r#"^([A-Za-z_]\w*)\s*\(?\s*["']([^:"'\s]+):([^:"'\s]+)(?::([^:"'\s@]+))?(?::[^"'\s@]+)?(?:@\w+)?["']"#,
            )
            .expect("valid regex")
        });

        let caps = re.captures(line)?;
        let configuration = &caps[1];
        if !is_dependency_configuration(configuration) {
            return None;
        }
        let version = caps
            .get(4)
            .and_then(|version| variables.interpolate(version.as_str()));
        Some(Declaration::Library(LibraryDependency::new(
            Some(&caps[2]),
            &caps[3],
            version.as_deref(),
            is_test_configuration(configuration),
        )))
    }
}

/// `compileOnly group: "g", name: "n", version: "v"` in any argument order. The version may be
/// omitted; the group may be omitted for ungrouped core libraries.
#[derive(Debug, Clone, Copy)]
pub struct NamedArguments;

impl DependencyMatcher for NamedArguments {
    fn name(&self) -> &'static str {
        "named"
    }

    fn attempt(&self, line: &str, variables: &Variables) -> Option<Declaration> {
        let named = parse_named_arguments(line)?;
        let version = match named.version {
            Some(NamedValue::Quoted(version)) => variables.interpolate(&version),
            Some(NamedValue::Bare(_)) => return None,
            None => None,
        };
        Some(Declaration::Library(LibraryDependency::new(
            named.group.as_deref(),
            &named.name,
            version.as_deref(),
            is_test_configuration(&named.configuration),
        )))
    }
}

/// The named form whose version is a bare identifier naming a variable declared in the build
/// script or a `gradle.properties`.
#[derive(Debug, Clone, Copy)]
pub struct VariableVersion;

impl DependencyMatcher for VariableVersion {
    fn name(&self) -> &'static str {
        "variable"
    }

    fn attempt(&self, line: &str, variables: &Variables) -> Option<Declaration> {
        let named = parse_named_arguments(line)?;
        let Some(NamedValue::Bare(identifier)) = named.version else {
            return None;
        };
        let version = variables.lookup(&identifier);
        if version.is_none() {
            tracing::debug!(
                target = "portalws.extract",
                variable = %identifier,
                name = %named.name,
                "unresolved version variable"
            );
        }
        Some(Declaration::Library(LibraryDependency::new(
            named.group.as_deref(),
            &named.name,
            version.as_deref(),
            is_test_configuration(&named.configuration),
        )))
    }
}

/// `compile project(":apps:foo:foo-api")`; the target is the last path segment.
#[derive(Debug, Clone, Copy)]
pub struct ProjectReference;

impl DependencyMatcher for ProjectReference {
    fn name(&self) -> &'static str {
        "project"
    }

    fn attempt(&self, line: &str, _variables: &Variables) -> Option<Declaration> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(
                r#"^([A-Za-z_]\w*)\s*\(?\s*project\s*\(\s*(?:path\s*:\s*)?["']([^"']+)["']"#,
            )
            .expect("valid regex")
        });

        let caps = re.captures(line)?;
        let name = caps[2].rsplit(':').next().unwrap_or_default().trim();
        if name.is_empty() {
            return None;
        }
        Some(Declaration::Project(ProjectDependency::new(
            name,
            is_test_configuration(&caps[1]),
        )))
    }
}

/// `implementation platform("g:n:v")` and `enforcedPlatform(...)`.
#[derive(Debug, Clone, Copy)]
pub struct PlatformImport;

impl DependencyMatcher for PlatformImport {
    fn name(&self) -> &'static str {
        "platform"
    }

    fn attempt(&self, line: &str, variables: &Variables) -> Option<Declaration> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(
                r#"^[A-Za-z_]\w*\s*\(?\s*(?:platform|enforcedPlatform)\s*\(\s*["']([^:"'\s]+):([^:"'\s]+):([^"'\s]+)["']"#,
            )
            .expect("valid regex")
        });

        let caps = re.captures(line)?;
        Some(Declaration::Bom(BomDependency {
            group: caps[1].to_string(),
            name: caps[2].to_string(),
            version: variables.interpolate(&caps[3])?,
        }))
    }
}

#[derive(Debug)]
enum NamedValue {
    Quoted(String),
    Bare(String),
}

#[derive(Debug)]
struct NamedDeclaration {
    configuration: String,
    group: Option<String>,
    name: String,
    version: Option<NamedValue>,
}

fn parse_named_arguments(line: &str) -> Option<NamedDeclaration> {
    static HEAD: OnceLock<Regex> = OnceLock::new();
    static ARG: OnceLock<Regex> = OnceLock::new();
    let head = HEAD.get_or_init(|| {
        Regex::new(r"^([A-Za-z_]\w*)\s*\(?\s*(?:group|name|version)\s*:").expect("valid regex")
    });
    let arg = ARG.get_or_init(|| {
        Regex::new(
            r#"\b(group|name|version)\s*:\s*(?:"([^"]*)"|'([^']*)'|([A-Za-z_][\w.]*))"#,
        )
        .expect("valid regex")
    });

    let configuration = head.captures(line)?.get(1)?.as_str().to_string();
    if !is_dependency_configuration(&configuration) {
        return None;
    }

    let mut group = None;
    let mut name = None;
    let mut version = None;
    for caps in arg.captures_iter(line) {
        let value = if let Some(quoted) = caps.get(2).or_else(|| caps.get(3)) {
            NamedValue::Quoted(quoted.as_str().to_string())
        } else {
            NamedValue::Bare(caps.get(4)?.as_str().to_string())
        };
        match (&caps[1], value) {
            ("group", NamedValue::Quoted(value)) => group = Some(value),
            ("name", NamedValue::Quoted(value)) => name = Some(value),
            ("version", value) => version = Some(value),
            _ => {}
        }
    }

    Some(NamedDeclaration {
        configuration,
        group: group.filter(|g| !g.is_empty()),
        name: name.filter(|n| !n.is_empty())?,
        version,
    })
}

fn is_dependency_configuration(token: &str) -> bool {
    !matches!(
        token,
        "project"
            | "platform"
            | "enforcedPlatform"
            | "files"
            | "fileTree"
            | "exclude"
            | "mavenBom"
            // dependency-management plugin pins, not dependencies
            | "dependency"
            | "dependencySet"
    )
}

fn is_test_configuration(token: &str) -> bool {
    token.to_ascii_lowercase().contains("test")
}

/// Variables visible to one build script: `gradle.properties` entries from the module directory
/// up to the workspace root (nearest wins), overridden by assignments in the script itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        let mut variables = Self { values };
        variables.resolve_references();
        variables
    }

    pub fn collect(workspace_root: &Path, module_dir: &Path, script: &str) -> Self {
        let mut values = BTreeMap::new();
        let properties = ancestor_files_named(module_dir, Some(workspace_root), GRADLE_PROPERTIES);
        for path in properties.iter().rev() {
            if let Some(text) = read_best_effort(path) {
                values.extend(portalws_properties::parse(&text).to_map());
            }
        }
        values.extend(script_assignments(script));
        Self::from_map(values)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Look up a bare identifier such as `fooVersion` or `project.ext.fooVersion`.
    pub fn lookup(&self, identifier: &str) -> Option<String> {
        self.get(identifier)
            .or_else(|| self.get(identifier.rsplit('.').next()?))
            .filter(|value| !value.contains('$'))
            .map(str::to_string)
    }

    /// Substitute `${x}` / `$x` references; `None` if any reference stays unresolved.
    pub fn interpolate(&self, text: &str) -> Option<String> {
        let resolved = substitute(text, &self.values);
        (!resolved.contains('$')).then_some(resolved)
    }

    fn resolve_references(&mut self) {
        for _ in 0..MAX_VARIABLE_PASSES {
            let snapshot = self.values.clone();
            let mut changed = false;
            for value in self.values.values_mut() {
                if !value.contains('$') {
                    continue;
                }
                let next = substitute(value, &snapshot);
                if next != *value {
                    *value = next;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}

fn substitute(text: &str, values: &BTreeMap<String, String>) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][\w.]*)").expect("valid regex")
    });

    re.replace_all(text, |caps: &regex::Captures<'_>| {
        let key = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim())
            .unwrap_or_default();
        values
            .get(key)
            .or_else(|| key.rsplit('.').next().and_then(|last| values.get(last)))
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

fn script_assignments(script: &str) -> BTreeMap<String, String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^\s*(?:def\s+|String\s+|ext\.|project\.ext\.)?([A-Za-z_]\w*)\s*=\s*(?:"([^"]*)"|'([^']*)')\s*;?\s*$"#,
        )
        .expect("valid regex")
    });

    re.captures_iter(script)
        .filter_map(|caps| {
            let value = caps.get(2).or_else(|| caps.get(3))?;
            Some((caps[1].to_string(), value.as_str().to_string()))
        })
        .collect()
}

/// Extract the dependencies of the module in `module_dir`.
///
/// A module without a build script has no declared dependencies. One whose script lacks a
/// `dependencies` block inherits the nearest ancestor script (up to `workspace_root`) that has
/// one. Modules with test sources get a test-scoped project dependency on the shared
/// test-support modules.
pub fn extract_dependencies(
    workspace_root: &Path,
    module_dir: &Path,
    options: &ExtractOptions,
) -> ExtractedDependencies {
    let mut extracted = ExtractedDependencies::default();

    if let Some(script) = read_build_script(module_dir) {
        let variables = Variables::collect(workspace_root, module_dir, &script);
        let parsed = parse_build_script(&script, &variables, DEFAULT_MATCHERS);
        extracted = parsed.dependencies;

        if !parsed.has_dependency_block && module_dir != workspace_root {
            if let Some((ancestor, inherited)) = inherit_from_ancestors(workspace_root, module_dir)
            {
                tracing::debug!(
                    target = "portalws.extract",
                    module = %module_dir.display(),
                    ancestor = %ancestor.display(),
                    "inheriting dependencies from ancestor build script"
                );
                extracted.merge_missing(inherited);
            }
        }
    }

    add_test_support(module_dir, options, &mut extracted);
    extracted.normalize();
    extracted
}

fn inherit_from_ancestors(
    workspace_root: &Path,
    module_dir: &Path,
) -> Option<(PathBuf, ExtractedDependencies)> {
    let parent = module_dir.parent()?;
    if !parent.starts_with(workspace_root) {
        return None;
    }
    search_ancestors(parent, Some(workspace_root), |dir| {
        let script = read_build_script(dir)?;
        let variables = Variables::collect(workspace_root, dir, &script);
        let parsed = parse_build_script(&script, &variables, DEFAULT_MATCHERS);
        parsed
            .has_dependency_block
            .then(|| (dir.to_path_buf(), parsed.dependencies))
    })
    .into_iter()
    .next()
}

fn add_test_support(
    module_dir: &Path,
    options: &ExtractOptions,
    extracted: &mut ExtractedDependencies,
) {
    let module_name = module_dir
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let support = [
        ("src/test", options.unit_test_support_module.as_deref()),
        (
            "src/testIntegration",
            options.integration_test_support_module.as_deref(),
        ),
    ];
    for (rel, support_module) in support {
        let Some(support_module) = support_module else {
            continue;
        };
        if support_module != module_name && module_dir.join(rel).is_dir() {
            extracted
                .project_dependencies
                .push(ProjectDependency::new(support_module, true));
        }
    }
}

fn read_build_script(dir: &Path) -> Option<String> {
    let path = dir.join(BUILD_FILE);
    if !path.is_file() {
        return None;
    }
    read_best_effort(&path)
}

fn read_best_effort(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::debug!(
                target = "portalws.extract",
                path = %path.display(),
                error = %err,
                "failed to read file (best effort)"
            );
            None
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ParsedScript {
    pub(crate) has_dependency_block: bool,
    pub(crate) dependencies: ExtractedDependencies,
}

pub(crate) fn parse_build_script(
    script: &str,
    variables: &Variables,
    matchers: &[&dyn DependencyMatcher],
) -> ParsedScript {
    let script = strip_gradle_comments(script);
    let mut parsed = ParsedScript::default();

    for block in dependency_blocks(&script) {
        parsed.has_dependency_block = true;
        for line in logical_lines(block) {
            for matcher in matchers {
                if let Some(declaration) = matcher.attempt(&line, variables) {
                    tracing::trace!(
                        target = "portalws.extract",
                        matcher = matcher.name(),
                        line = %line,
                        "matched declaration"
                    );
                    parsed.dependencies.push(declaration);
                }
            }
        }
    }

    parsed
        .dependencies
        .bom_dependencies
        .extend(maven_bom_imports(&script, variables));
    parsed.dependencies.normalize();
    parsed
}

/// `dependencyManagement { imports { mavenBom "g:n:v" } }`
fn maven_bom_imports(script: &str, variables: &Variables) -> Vec<BomDependency> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"\bmavenBom\s*\(?\s*["']([^:"'\s]+):([^:"'\s]+):([^"'\s]+)["']"#)
            .expect("valid regex")
    });

    re.captures_iter(script)
        .filter_map(|caps| {
            Some(BomDependency {
                group: caps[1].to_string(),
                name: caps[2].to_string(),
                version: variables.interpolate(&caps[3])?,
            })
        })
        .collect()
}

/// Bodies of every `dependencies { ... }` block outside `buildscript { ... }`.
fn dependency_blocks(script: &str) -> Vec<&str> {
    static DEPS: OnceLock<Regex> = OnceLock::new();
    static BUILDSCRIPT: OnceLock<Regex> = OnceLock::new();
    let deps = DEPS.get_or_init(|| Regex::new(r"\bdependencies\s*\{").expect("valid regex"));
    let buildscript =
        BUILDSCRIPT.get_or_init(|| Regex::new(r"\bbuildscript\s*\{").expect("valid regex"));

    let skipped: Vec<Range<usize>> = buildscript
        .find_iter(script)
        .filter_map(|m| extract_balanced_braces(script, m.end() - 1))
        .collect();

    deps.find_iter(script)
        .filter(|m| !skipped.iter().any(|range| range.contains(&m.start())))
        .filter_map(|m| extract_balanced_braces(script, m.end() - 1))
        .map(|range| &script[range.start + 1..range.end - 1])
        .collect()
}

/// Byte range of the `{ ... }` block opening at `open_index`, braces included.
fn extract_balanced_braces(contents: &str, open_index: usize) -> Option<Range<usize>> {
    let bytes = contents.as_bytes();
    if bytes.get(open_index) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_single = false;
    let mut in_double = false;

    let mut i = open_index;
    while i < bytes.len() {
        let b = bytes[i];

        if in_single || in_double {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if (in_single && b == b'\'') || (in_double && b == b'"') {
                in_single = false;
                in_double = false;
            }
            i += 1;
            continue;
        }

        match b {
            b'\'' => in_single = true,
            b'"' => in_double = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open_index..i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

// Declarations may wrap after a comma.
fn logical_lines(block: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending = String::new();
    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !pending.is_empty() {
            pending.push(' ');
        }
        pending.push_str(line);
        if !line.ends_with(',') {
            out.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        out.push(pending);
    }
    out
}

fn strip_gradle_comments(contents: &str) -> String {
    // Strips `// ...` and `/* ... */` while preserving quoted strings.
    let bytes = contents.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());

    let mut i = 0;
    let mut quote: Option<u8> = None;
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while i < bytes.len() {
        let b = bytes[i];

        if in_line_comment {
            if b == b'\n' {
                in_line_comment = false;
                out.push(b'\n');
            }
            i += 1;
            continue;
        }

        if in_block_comment {
            if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                in_block_comment = false;
                i += 2;
                continue;
            }
            if b == b'\n' {
                out.push(b'\n');
            }
            i += 1;
            continue;
        }

        if let Some(q) = quote {
            out.push(b);
            if b == b'\\' {
                if let Some(next) = bytes.get(i + 1) {
                    out.push(*next);
                    i += 2;
                    continue;
                }
            } else if b == q || b == b'\n' {
                quote = None;
            }
            i += 1;
            continue;
        }

        if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            in_line_comment = true;
            i += 2;
            continue;
        }

        if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            in_block_comment = true;
            i += 2;
            continue;
        }

        if b == b'\'' || b == b'"' {
            quote = Some(b);
        }
        out.push(b);
        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|_| contents.to_string())
}
