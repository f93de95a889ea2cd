use std::path::PathBuf;
use std::sync::Arc;

use portalws_config::CompletionConfig;
use portalws_process::RunCommandError;
use portalws_project::{
    complete_cache, ArtifactFetcher, ArtifactLocator, CacheRoots, CompletionOptions, Coordinate,
    FetchError, MavenFetcher,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::support::{
    failure_status, maven_jar, success_status, write_file, FakeCommandRunner, RecordingFetcher,
};

fn locator_for(repo: &std::path::Path) -> ArtifactLocator {
    ArtifactLocator::new(CacheRoots {
        maven: vec![repo.to_path_buf()],
        ..CacheRoots::default()
    })
}

#[test]
fn failing_fetch_stops_after_one_iteration() {
    let tmp = TempDir::new().expect("tempdir");
    let mut locator = locator_for(tmp.path());
    let missing = vec![
        Coordinate::new("org.b", "b", "1"),
        Coordinate::new("org.a", "a", "1"),
    ];
    let fetcher = RecordingFetcher::failing();

    let report = complete_cache(
        &mut locator,
        &missing,
        &fetcher,
        &CompletionOptions { max_iterations: 5 },
    );

    assert_eq!(report.iterations, 1);
    assert!(report.resolved.is_empty());
    assert_eq!(
        report.remaining,
        vec![
            Coordinate::new("org.a", "a", "1"),
            Coordinate::new("org.b", "b", "1"),
        ]
    );
    assert_eq!(fetcher.calls().len(), 1);
}

#[test]
fn fetched_artifacts_are_found_on_the_next_pass() {
    let tmp = TempDir::new().expect("tempdir");
    let repo = tmp.path().join("repo");
    let servable = Coordinate::new("org.a", "a", "1");
    let unknown = Coordinate::new("org.b", "b", "1");
    let mut locator = locator_for(&repo);
    // Memoized misses must not hide what the fetch brought in.
    assert!(!locator.is_located(&servable));

    let fetcher = RecordingFetcher::serving(&repo, vec![servable.clone()]);
    let report = complete_cache(
        &mut locator,
        &[servable.clone(), unknown.clone()],
        &fetcher,
        &CompletionOptions::default(),
    );

    assert_eq!(report.iterations, 2);
    assert_eq!(report.resolved, vec![servable.clone()]);
    assert_eq!(report.remaining, vec![unknown.clone()]);
    assert_eq!(
        fetcher.calls(),
        vec![vec![servable.clone(), unknown.clone()], vec![unknown]]
    );
    assert_eq!(locator.locate(&servable), vec![maven_jar(&repo, &servable)]);
}

#[test]
fn fetching_a_transitive_dependency_refreshes_its_dependents() {
    let tmp = TempDir::new().expect("tempdir");
    let repo = tmp.path().join("repo");
    let library = Coordinate::new("org.l", "l", "1");
    let transitive = Coordinate::new("org.m", "m", "1");
    write_file(
        &repo.join("org/l/l/1/l-1.pom"),
        r#"<project><groupId>org.l</groupId><artifactId>l</artifactId><version>1</version>
            <dependencies><dependency><groupId>org.m</groupId><artifactId>m</artifactId><version>1</version></dependency></dependencies>
        </project>"#,
    );
    write_file(&maven_jar(&repo, &library), "");

    let mut locator = locator_for(&repo);
    assert_eq!(locator.locate(&library), vec![maven_jar(&repo, &library)]);

    let fetcher = RecordingFetcher::serving(&repo, vec![transitive.clone()]);
    let report = complete_cache(
        &mut locator,
        std::slice::from_ref(&library),
        &fetcher,
        &CompletionOptions::default(),
    );

    assert_eq!(fetcher.calls(), vec![vec![transitive.clone()]]);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.resolved, vec![transitive.clone()]);
    assert!(report.remaining.is_empty());
    assert_eq!(
        locator.locate(&library),
        vec![maven_jar(&repo, &library), maven_jar(&repo, &transitive)]
    );
}

#[test]
fn zero_iterations_never_fetches() {
    let tmp = TempDir::new().expect("tempdir");
    let mut locator = locator_for(tmp.path());
    let fetcher = RecordingFetcher::failing();
    let missing = vec![Coordinate::new("org.a", "a", "1")];

    let report = complete_cache(
        &mut locator,
        &missing,
        &fetcher,
        &CompletionOptions { max_iterations: 0 },
    );

    assert_eq!(report.iterations, 0);
    assert_eq!(report.remaining, missing);
    assert!(fetcher.calls().is_empty());
}

#[test]
fn maven_fetcher_runs_the_package_manager_on_a_generated_descriptor() {
    let tmp = TempDir::new().expect("tempdir");
    let repo = tmp.path().join("repo");
    let wanted = Coordinate::new("org.a", "a", "1");
    let runner = Arc::new(FakeCommandRunner::new(
        success_status(),
        vec![maven_jar(&repo, &wanted)],
    ));
    let config = CompletionConfig {
        mvn_path: PathBuf::from("/opt/maven/bin/mvn"),
        ..CompletionConfig::default()
    };
    let fetcher = MavenFetcher::new(runner.clone(), &config);

    fetcher
        .fetch(&[wanted.clone(), Coordinate::ungrouped("portal-kernel", "default")])
        .expect("fetch");

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 1);
    let invocation = &invocations[0];
    assert_eq!(invocation.program, PathBuf::from("/opt/maven/bin/mvn"));
    assert_eq!(invocation.args, config.args);
    assert!(!invocation.cwd.exists(), "scratch directory is removed");
    let pom = invocation.pom.as_deref().expect("pom.xml written before the run");
    assert!(pom.contains("<artifactId>a</artifactId>"), "{pom}");
    assert!(!pom.contains("portal-kernel"), "{pom}");

    let mut locator = locator_for(&repo);
    assert!(!locator.locate(&wanted).is_empty());
}

#[test]
fn maven_fetcher_skips_ungrouped_coordinates_entirely() {
    let runner = Arc::new(FakeCommandRunner::new(success_status(), Vec::new()));
    let fetcher = MavenFetcher::new(runner.clone(), &CompletionConfig::default());

    fetcher
        .fetch(&[Coordinate::ungrouped("portal-kernel", "default")])
        .expect("fetch");

    assert!(runner.invocations().is_empty());
}

#[test]
fn non_zero_exit_is_a_fetch_error() {
    let runner = Arc::new(FakeCommandRunner::new(failure_status(), Vec::new()));
    let fetcher = MavenFetcher::new(runner, &CompletionConfig::default());

    let err = fetcher
        .fetch(&[Coordinate::new("org.a", "a", "1")])
        .expect_err("failed run");

    match err {
        FetchError::Command(RunCommandError::Failed(failure)) => {
            assert!(!failure.output.success());
            assert_eq!(failure.command.args, CompletionConfig::default().args);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
