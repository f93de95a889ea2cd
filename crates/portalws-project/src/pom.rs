//! Reading package manifests (`*.pom`) found in the local caches.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::discover::ProjectError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RawPom {
    pub(crate) group_id: Option<String>,
    pub(crate) artifact_id: Option<String>,
    pub(crate) version: Option<String>,
    pub(crate) packaging: Option<String>,
    pub(crate) parent: Option<PomRef>,
    pub(crate) relocation: Option<Relocation>,
    pub(crate) properties: BTreeMap<String, String>,
    pub(crate) dependencies: Vec<PomDependency>,
    pub(crate) dependency_management: Vec<PomDependency>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PomRef {
    pub(crate) group_id: String,
    pub(crate) artifact_id: String,
    pub(crate) version: String,
}

/// `distributionManagement/relocation`; absent fields keep the original value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Relocation {
    pub(crate) group_id: Option<String>,
    pub(crate) artifact_id: Option<String>,
    pub(crate) version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PomDependency {
    pub(crate) group_id: String,
    pub(crate) artifact_id: String,
    pub(crate) version: Option<String>,
    pub(crate) scope: Option<String>,
    pub(crate) type_: Option<String>,
    pub(crate) optional: bool,
}

impl PomDependency {
    /// Scopes that never reach a consumer's classpath.
    pub(crate) fn is_followed(&self) -> bool {
        if self.optional {
            return false;
        }
        !matches!(
            self.scope.as_deref(),
            Some("test") | Some("provided") | Some("system")
        )
    }

    pub(crate) fn is_bom_import(&self) -> bool {
        self.scope.as_deref() == Some("import") && self.type_.as_deref() == Some("pom")
    }
}

impl RawPom {
    pub(crate) fn is_pom_packaging(&self) -> bool {
        self.packaging.as_deref() == Some("pom")
    }

    /// Built-in `project.*` / `pom.*` properties, the last level of the variable scope.
    pub(crate) fn builtin_properties(
        &self,
        group: &str,
        name: &str,
        version: &str,
    ) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for prefix in ["project", "pom"] {
            out.insert(format!("{prefix}.groupId"), group.to_string());
            out.insert(format!("{prefix}.artifactId"), name.to_string());
            out.insert(format!("{prefix}.version"), version.to_string());
        }
        if let Some(parent) = &self.parent {
            out.insert("project.parent.groupId".into(), parent.group_id.clone());
            out.insert("project.parent.artifactId".into(), parent.artifact_id.clone());
            out.insert("project.parent.version".into(), parent.version.clone());
        }
        out
    }
}

pub(crate) fn read_pom(path: &Path) -> Result<RawPom, ProjectError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_pom(&contents).map_err(|source| ProjectError::Xml {
        path: PathBuf::from(path),
        source,
    })
}

pub(crate) fn parse_pom(contents: &str) -> Result<RawPom, roxmltree::Error> {
    let doc = roxmltree::Document::parse(contents)?;
    let project = doc.root_element();

    let mut pom = RawPom {
        group_id: child_text(&project, "groupId"),
        artifact_id: child_text(&project, "artifactId"),
        version: child_text(&project, "version"),
        packaging: child_text(&project, "packaging"),
        ..RawPom::default()
    };

    if let Some(parent_node) = child_element(&project, "parent") {
        if let (Some(group_id), Some(artifact_id), Some(version)) = (
            child_text(&parent_node, "groupId"),
            child_text(&parent_node, "artifactId"),
            child_text(&parent_node, "version"),
        ) {
            pom.parent = Some(PomRef {
                group_id,
                artifact_id,
                version,
            });
        }
    }

    if let Some(relocation) = child_element(&project, "distributionManagement")
        .and_then(|dm| child_element(&dm, "relocation"))
    {
        pom.relocation = Some(Relocation {
            group_id: child_text(&relocation, "groupId"),
            artifact_id: child_text(&relocation, "artifactId"),
            version: child_text(&relocation, "version"),
        });
    }

    if let Some(props_node) = child_element(&project, "properties") {
        for child in props_node.children().filter(|n| n.is_element()) {
            let key = child.tag_name().name().to_string();
            let value = child.text().map(str::trim).unwrap_or_default();
            pom.properties.insert(key, value.to_string());
        }
    }

    if let Some(deps_node) = child_element(&project, "dependencies") {
        pom.dependencies = parse_dependencies(&deps_node);
    }

    if let Some(dep_mgmt) = child_element(&project, "dependencyManagement") {
        if let Some(deps_node) = child_element(&dep_mgmt, "dependencies") {
            pom.dependency_management = parse_dependencies(&deps_node);
        }
    }

    Ok(pom)
}

fn parse_dependencies(deps_node: &roxmltree::Node<'_, '_>) -> Vec<PomDependency> {
    deps_node
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("dependency"))
        .filter_map(|dep_node| {
            Some(PomDependency {
                group_id: child_text(&dep_node, "groupId")?,
                artifact_id: child_text(&dep_node, "artifactId")?,
                version: child_text(&dep_node, "version"),
                scope: child_text(&dep_node, "scope"),
                type_: child_text(&dep_node, "type"),
                optional: child_text(&dep_node, "optional").as_deref() == Some("true"),
            })
        })
        .collect()
}

fn child_element<'a, 'input>(
    node: &roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: &roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    child_element(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Substitute `${key}` placeholders, looking each key up in `scopes` in order.
///
/// Unknown keys are left untouched. Values may themselves contain placeholders, so
/// substitution repeats a bounded number of times.
pub(crate) fn resolve_placeholders(text: &str, scopes: &[&BTreeMap<String, String>]) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"));

    let mut current = text.to_string();
    for _ in 0..8 {
        if !current.contains("${") {
            break;
        }
        let next = re
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                let key = &caps[1];
                scopes
                    .iter()
                    .find_map(|scope| scope.get(key))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}
