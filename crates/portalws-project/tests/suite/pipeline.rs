use std::path::Path;

use portalws_config::PortalWsConfig;
use portalws_project::{resolve_workspace, Coordinate, MAVEN_REPO_MARKER};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::support::{copy_tree, maven_jar, testdata_path, write_file, RecordingFetcher};

/// `portal-mini` copied next to a workspace-local Maven repository holding `org.x:y:3.0`.
fn workspace(tmp: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    let root = tmp.path().join("ws");
    copy_tree(&testdata_path("portal-mini"), &root);
    let repo = tmp.path().join(MAVEN_REPO_MARKER);
    write_file(&maven_jar(&repo, &Coordinate::new("org.x", "y", "3.0")), "");
    (root, repo)
}

fn offline_config() -> PortalWsConfig {
    let mut config = PortalWsConfig::default();
    config.caches.use_home = false;
    config
}

fn canonical(path: &Path) -> std::path::PathBuf {
    std::fs::canonicalize(path).expect("canonical path")
}

#[test]
fn resolves_the_workspace_and_completes_what_it_can() {
    let tmp = TempDir::new().expect("tempdir");
    let (root, repo) = workspace(&tmp);
    let junit = Coordinate::new("junit", "junit", "4.13.2");
    let baz = Coordinate::new("com.liferay", "com.liferay.baz.api", "1.0.0");
    let kernel = Coordinate::new("com.liferay.portal", "com.liferay.portal.kernel", "default");
    let fetcher = RecordingFetcher::serving(&repo, vec![junit.clone()]);

    let resolved = resolve_workspace(&root, &offline_config(), &fetcher).expect("resolve");

    assert_eq!(resolved.workspace_root, canonical(&root));
    assert_eq!(resolved.modules.len(), 5);
    assert_eq!(
        resolved.libraries.keys().cloned().collect::<Vec<_>>(),
        vec![
            baz.clone(),
            kernel.clone(),
            junit.clone(),
            Coordinate::new("org.x", "y", "3.0"),
        ]
    );
    assert_eq!(resolved.missing, vec![baz.clone(), kernel.clone()]);
    assert_eq!(
        resolved.libraries[&junit],
        vec![canonical(&maven_jar(&repo, &junit))]
    );

    let completion = resolved.completion.as_ref().expect("completion ran");
    assert_eq!(completion.iterations, 2);
    assert_eq!(completion.resolved, vec![junit.clone()]);
    assert_eq!(completion.remaining, vec![baz.clone(), kernel.clone()]);
    assert_eq!(
        fetcher.calls(),
        vec![vec![baz.clone(), kernel.clone(), junit], vec![baz, kernel]]
    );
    assert_eq!(resolved.report.mismatches.len(), 1);
}

#[test]
fn disabled_completion_reports_missing_without_fetching() {
    let tmp = TempDir::new().expect("tempdir");
    let (root, _) = workspace(&tmp);
    let mut config = offline_config();
    config.completion.enabled = false;
    let fetcher = RecordingFetcher::failing();

    let resolved = resolve_workspace(&root, &config, &fetcher).expect("resolve");

    assert!(resolved.completion.is_none());
    assert!(fetcher.calls().is_empty());
    assert_eq!(resolved.missing.len(), 3);
}

#[test]
fn serializes_for_descriptor_emitters() {
    let tmp = TempDir::new().expect("tempdir");
    let (root, _) = workspace(&tmp);
    let mut config = offline_config();
    config.completion.enabled = false;

    let resolved =
        resolve_workspace(&root, &config, &RecordingFetcher::failing()).expect("resolve");
    let json = serde_json::to_value(&resolved).expect("serialize");

    assert!(json["libraries"]["org.x:y:3.0"].is_array());
    let foo = json["modules"]
        .as_array()
        .expect("modules array")
        .iter()
        .find(|module| module["moduleName"] == "foo-service")
        .expect("foo-service");
    assert_eq!(foo["type"], "module");
    assert_eq!(foo["modulePath"], "modules/apps/foo/foo-service");
    assert_eq!(foo["bundleSymbolicName"], "com.liferay.foo.service");
}
