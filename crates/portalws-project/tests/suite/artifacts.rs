use portalws_config::CachesConfig;
use portalws_project::{ArtifactLocator, CacheRoots, Coordinate, GRADLE_CACHE_MARKER, MAVEN_REPO_MARKER};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::support::{maven_jar, write_file};

#[test]
fn lookups_are_memoized_hits_and_misses_alike() {
    let tmp = TempDir::new().expect("tempdir");
    let repo = tmp.path().join("repo");
    let present = Coordinate::new("org.x", "y", "3.0");
    write_file(&maven_jar(&repo, &present), "");
    let mut locator = ArtifactLocator::new(CacheRoots {
        maven: vec![repo.clone()],
        ..CacheRoots::default()
    });

    let first = locator.locate(&present);
    let second = locator.locate(&present);
    assert_eq!(first, vec![maven_jar(&repo, &present)]);
    assert_eq!(first, second);
    assert_eq!(locator.searches(), 1);

    let absent = Coordinate::new("org.x", "missing", "1.0");
    assert!(locator.locate(&absent).is_empty());
    assert!(!locator.is_located(&absent));
    assert_eq!(locator.searches(), 2);
}

#[test]
fn caches_next_to_the_workspace_are_searched_before_configured_ones() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("portal");
    let module = root.join("modules/apps/foo");
    std::fs::create_dir_all(&module).expect("mkdir");
    let local_maven = tmp.path().join(MAVEN_REPO_MARKER);
    let local_gradle = root.join(GRADLE_CACHE_MARKER);
    std::fs::create_dir_all(&local_maven).expect("mkdir");
    std::fs::create_dir_all(&local_gradle).expect("mkdir");

    let config = CachesConfig {
        maven_repos: vec![tmp.path().join("extra-m2")],
        use_home: false,
        core_lib_dirs: vec!["lib/development".into()],
        ..CachesConfig::default()
    };
    let roots = CacheRoots::from_config(&root, [module.as_path()], &config);

    assert_eq!(roots.maven, vec![local_maven, tmp.path().join("extra-m2")]);
    assert_eq!(roots.gradle, vec![local_gradle]);
    assert_eq!(roots.core_lib_dirs, vec![root.join("lib/development")]);
}

#[test]
fn maven_repository_wins_over_gradle_cache() {
    let tmp = TempDir::new().expect("tempdir");
    let maven = tmp.path().join("m2");
    let gradle = tmp.path().join("gradle");
    let coordinate = Coordinate::new("com.acme", "widget", "1.4");
    write_file(&maven_jar(&maven, &coordinate), "");
    write_file(
        &gradle.join("com.acme/widget/1.4/0a1b2c/widget-1.4.jar"),
        "",
    );

    let mut locator = ArtifactLocator::new(CacheRoots {
        maven: vec![maven.clone()],
        gradle: vec![gradle.clone()],
        ..CacheRoots::default()
    });
    assert_eq!(locator.locate(&coordinate), vec![maven_jar(&maven, &coordinate)]);

    let mut gradle_only = ArtifactLocator::new(CacheRoots {
        gradle: vec![gradle.clone()],
        ..CacheRoots::default()
    });
    assert_eq!(
        gradle_only.locate(&coordinate),
        vec![gradle.join("com.acme/widget/1.4/0a1b2c/widget-1.4.jar")]
    );
}

#[test]
fn pom_only_artifacts_contribute_their_dependencies() {
    let tmp = TempDir::new().expect("tempdir");
    let repo = tmp.path().join("m2");
    let bundle = Coordinate::new("com.acme", "bundle", "2.0");
    let leaf = Coordinate::new("com.acme", "leaf", "1.1");
    write_file(
        &repo.join("com/acme/bundle/2.0/bundle-2.0.pom"),
        r#"<project>
  <groupId>com.acme</groupId>
  <artifactId>bundle</artifactId>
  <version>2.0</version>
  <packaging>pom</packaging>
  <properties><leaf.version>1.1</leaf.version></properties>
  <dependencies>
    <dependency>
      <groupId>${project.groupId}</groupId>
      <artifactId>leaf</artifactId>
      <version>${leaf.version}</version>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13.2</version>
      <scope>test</scope>
    </dependency>
  </dependencies>
</project>
"#,
    );
    write_file(&maven_jar(&repo, &leaf), "");

    let mut locator = ArtifactLocator::new(CacheRoots {
        maven: vec![repo.clone()],
        ..CacheRoots::default()
    });

    assert_eq!(locator.locate(&bundle), vec![maven_jar(&repo, &leaf)]);
    assert!(locator.is_located(&bundle));
}
