use std::path::PathBuf;

use portalws_config::PortalWsConfig;
use portalws_project::{
    discover_modules, discover_modules_with_options, load_modules, DiscoverOptions, ModuleType,
    ProjectError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::support::{testdata_path, write_file};

fn relative(root: &std::path::Path, dirs: &[PathBuf]) -> Vec<String> {
    let root = std::fs::canonicalize(root).expect("canonical root");
    dirs.iter()
        .map(|dir| {
            dir.strip_prefix(&root)
                .expect("module below root")
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

#[test]
fn finds_modules_and_prunes_generated_and_archetype_dirs() {
    let root = testdata_path("portal-mini");
    let dirs = discover_modules(&root, 6).expect("discover");

    assert_eq!(
        relative(&root, &dirs),
        vec![
            "modules/apps/bar/bar-api",
            "modules/apps/baz/baz-api",
            "modules/apps/foo/foo-service",
            "portal-kernel",
            "portal-test",
        ]
    );
}

#[test]
fn pull_mode_sub_repositories_are_opt_in_and_unloaded() {
    let root = testdata_path("portal-mini");

    let by_flag = discover_modules_with_options(
        &root,
        &DiscoverOptions {
            include_pull_repos: true,
            ..DiscoverOptions::default()
        },
    )
    .expect("discover");
    let qux: Vec<_> = by_flag
        .iter()
        .filter(|module| module.dir.ends_with("modules/private/sub/qux"))
        .collect();
    assert_eq!(qux.len(), 1);
    assert!(qux[0].unload);
    assert!(by_flag
        .iter()
        .filter(|module| !module.dir.ends_with("qux"))
        .all(|module| !module.unload));

    let by_path = discover_modules_with_options(
        &root,
        &DiscoverOptions {
            include_sub_repos: vec![PathBuf::from("modules/private/sub")],
            ..DiscoverOptions::default()
        },
    )
    .expect("discover");
    assert!(by_path
        .iter()
        .any(|module| module.dir.ends_with("modules/private/sub/qux") && module.unload));
}

#[test]
fn depth_limit_stops_the_walk() {
    let root = testdata_path("portal-mini");
    let dirs = discover_modules(&root, 1).expect("discover");
    assert_eq!(relative(&root, &dirs), vec!["portal-kernel", "portal-test"]);
}

#[test]
fn missing_root_is_an_error() {
    let tmp = TempDir::new().expect("tempdir");
    let err = discover_modules(tmp.path().join("nope"), 6).expect_err("missing root");
    assert!(matches!(err, ProjectError::Io { .. }), "{err:?}");
}

#[test]
fn file_root_is_rejected() {
    let tmp = TempDir::new().expect("tempdir");
    let file = tmp.path().join("build.gradle");
    write_file(&file, "");
    let err = discover_modules(&file, 6).expect_err("file root");
    assert!(matches!(err, ProjectError::NotADirectory { .. }), "{err:?}");
}

#[test]
fn loads_types_and_bundle_metadata() {
    let config = PortalWsConfig::default();
    let (_, modules) = load_modules(testdata_path("portal-mini"), &config).expect("load");

    let summary: Vec<_> = modules
        .iter()
        .map(|module| {
            (
                module.module_path.as_str(),
                module.module_type,
                module.bundle_symbolic_name.as_deref(),
                module.bundle_version.as_deref(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (
                "modules/apps/bar/bar-api",
                ModuleType::Module,
                Some("com.liferay.bar.api"),
                Some("1.5.0"),
            ),
            (
                "modules/apps/baz/baz-api",
                ModuleType::Module,
                Some("com.liferay.baz.api"),
                Some("2.0.0"),
            ),
            (
                "modules/apps/foo/foo-service",
                ModuleType::Module,
                Some("com.liferay.foo.service"),
                Some("1.0.0"),
            ),
            ("portal-kernel", ModuleType::Core, None, None),
            ("portal-test", ModuleType::Core, None, None),
        ]
    );

    let kernel = modules
        .iter()
        .find(|module| module.module_name == "portal-kernel")
        .expect("portal-kernel");
    assert_eq!(
        kernel.layout.source_folders.iter().collect::<Vec<_>>(),
        vec!["src"]
    );
    assert!(kernel.library_dependencies.is_empty());
}
