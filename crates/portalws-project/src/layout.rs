//! Conventional source layout of a module directory.

use std::collections::BTreeSet;
use std::path::Path;

use crate::model::SourceLayout;

/// A subpath carrying this file is left out of every folder set.
pub const DISABLE_MARKER: &str = ".portalws-ignore";

const SOURCE_FOLDERS: &[&str] = &["src/main/java", "docroot/WEB-INF/src"];
const RESOURCE_FOLDERS: &[&str] = &["src/main/resources"];
const TEST_SOURCE_FOLDERS: &[&str] = &[
    "src/test/java",
    "src/testIntegration/java",
    "test/unit",
    "test/integration",
];
const TEST_RESOURCE_FOLDERS: &[&str] = &["src/test/resources", "src/testIntegration/resources"];
const WEBROOT_FOLDERS: &[&str] = &["src/main/resources/META-INF/resources", "docroot"];

const SEED_EXCLUDES: &[&str] = &["build", "tmp", ".gradle"];

/// Output folders implied by the presence of an include folder.
const IMPLIED_EXCLUDES: &[(&str, &str)] = &[
    ("src/main/java", "classes"),
    ("src/test/java", "test-classes"),
    ("src/testIntegration/java", "test-classes/integration"),
    ("src/main/resources/META-INF/resources", "node_modules"),
    ("docroot", "docroot/WEB-INF/classes"),
];

pub fn scan_layout(module_dir: &Path) -> SourceLayout {
    let mut source_folders = existing(module_dir, SOURCE_FOLDERS);
    // Legacy flat layout: `src` holds the main sources directly.
    if !["src/main", "src/test", "src/testIntegration"]
        .iter()
        .any(|rel| module_dir.join(rel).is_dir())
        && is_enabled_dir(module_dir, "src")
    {
        source_folders.insert("src".to_string());
    }

    let mut layout = SourceLayout {
        source_folders,
        resource_folders: existing(module_dir, RESOURCE_FOLDERS),
        test_source_folders: existing(module_dir, TEST_SOURCE_FOLDERS),
        test_resource_folders: existing(module_dir, TEST_RESOURCE_FOLDERS),
        webroot_folders: existing(module_dir, WEBROOT_FOLDERS),
        exclude_folders: SEED_EXCLUDES.iter().map(|s| s.to_string()).collect(),
    };

    for (include, exclude) in IMPLIED_EXCLUDES {
        let present = [
            &layout.source_folders,
            &layout.test_source_folders,
            &layout.webroot_folders,
        ]
        .iter()
        .any(|set| set.contains(*include));
        if present {
            layout.exclude_folders.insert(exclude.to_string());
        }
    }

    layout
}

/// Whether any webroot folder carries an `init.jsp`.
pub fn has_init_jsp(module_dir: &Path, layout: &SourceLayout) -> bool {
    layout
        .webroot_folders
        .iter()
        .any(|webroot| module_dir.join(webroot).join("init.jsp").is_file())
}

fn existing(module_dir: &Path, candidates: &[&str]) -> BTreeSet<String> {
    candidates
        .iter()
        .filter(|rel| is_enabled_dir(module_dir, rel))
        .map(|rel| rel.to_string())
        .collect()
}

fn is_enabled_dir(module_dir: &Path, rel: &str) -> bool {
    let path = module_dir.join(rel);
    path.is_dir() && !path.join(DISABLE_MARKER).exists()
}
