use std::path::Path;

use crate::discover::DiscoveredModule;
use crate::extract::{extract_dependencies, ExtractOptions};
use crate::layout::{has_init_jsp, scan_layout};
use crate::manifest::read_manifest;
use crate::model::{Module, ModuleType};

/// Build the [`Module`] for one discovered directory: layout, bundle identity and declared
/// dependencies. Never fails; anything unreadable is treated as absent.
pub fn load_module(
    workspace_root: &Path,
    discovered: &DiscoveredModule,
    options: &ExtractOptions,
) -> Module {
    let dir = discovered.dir.as_path();
    let layout = scan_layout(dir);
    let manifest = read_manifest(dir);
    let extracted = extract_dependencies(workspace_root, dir, options);

    let module_name = dir
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    let barebone = !layout.has_sources()
        && extracted.library_dependencies.is_empty()
        && extracted.project_dependencies.is_empty();
    let has_init_jsp = has_init_jsp(dir, &layout);

    Module {
        module_name,
        module_path: relative_module_path(workspace_root, dir),
        root: dir.to_path_buf(),
        module_type: classify(workspace_root, dir),
        bundle_symbolic_name: manifest.symbolic_name,
        bundle_version: manifest.version,
        has_webroot: !layout.webroot_folders.is_empty(),
        has_init_jsp,
        layout,
        library_dependencies: extracted.library_dependencies,
        project_dependencies: extracted.project_dependencies,
        bom_dependencies: extracted.bom_dependencies,
        unload: discovered.unload,
        barebone,
    }
}

pub fn classify(workspace_root: &Path, dir: &Path) -> ModuleType {
    if dir.join("docroot").is_dir() {
        ModuleType::Plugin
    } else if dir.parent() == Some(workspace_root) && !dir.join("bnd.bnd").is_file() {
        ModuleType::Core
    } else {
        ModuleType::Module
    }
}

/// `/`-separated path of `dir` relative to `workspace_root`; `.` for the root itself.
pub fn relative_module_path(workspace_root: &Path, dir: &Path) -> String {
    let rel = dir.strip_prefix(workspace_root).unwrap_or(dir);
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}
