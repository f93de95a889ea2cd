use portalws_project::{
    extract_dependencies, BomDependency, ExtractOptions, LibraryDependency, ProjectDependency,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::support::{testdata_path, write_file};

fn options() -> ExtractOptions {
    ExtractOptions {
        unit_test_support_module: Some("portal-test".to_string()),
        integration_test_support_module: Some("portal-test-integration".to_string()),
    }
}

#[test]
fn foo_service_declarations_resolve_through_gradle_properties() {
    let root = std::fs::canonicalize(testdata_path("portal-mini")).expect("canonical root");
    let module = root.join("modules/apps/foo/foo-service");

    let extracted = extract_dependencies(&root, &module, &options());

    assert_eq!(
        extracted.library_dependencies,
        vec![
            LibraryDependency::new(None, "portal-kernel", None, false),
            LibraryDependency::new(Some("com.liferay"), "com.liferay.bar.api", Some("1.2.0"), false),
            LibraryDependency::new(Some("com.liferay"), "com.liferay.baz.api", Some("1.0.0"), false),
            LibraryDependency::new(Some("junit"), "junit", Some("4.13.2"), true),
            LibraryDependency::new(Some("org.x"), "y", Some("3.0"), false),
        ]
    );
    assert_eq!(
        extracted.project_dependencies,
        vec![ProjectDependency::new("portal-test", true)]
    );
}

#[test]
fn all_grammars_contribute_to_one_deduplicated_list() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path();
    let module = root.join("modules/apps/acme/acme-web");
    write_file(&root.join("gradle.properties"), "springVersion=5.3.9\n");
    write_file(
        &module.join("build.gradle"),
        r#"
ext.guavaVersion = "31.1"

buildscript {
    dependencies {
        classpath "com.liferay:com.liferay.gradle.plugins:4.4.0"
    }
}

dependencies {
    compileOnly "org.springframework:spring-core:5.3.9"
    compileOnly group: "org.springframework", name: "spring-core", version: springVersion
    implementation(group: "com.google.guava", name: "guava", version: "${guavaVersion}")
    implementation "com.google.guava:guava:31.1" // same artifact again
    compileOnly project(":apps:acme:acme-api")
    compileOnly project(':apps:acme:acme-api')
    implementation platform("com.liferay.portal:release.portal.bom:7.4.3")
    /* compileOnly "commented:out:1.0" */
}
"#,
    );

    let extracted = extract_dependencies(root, &module, &options());

    assert_eq!(
        extracted.library_dependencies,
        vec![
            LibraryDependency::new(Some("com.google.guava"), "guava", Some("31.1"), false),
            LibraryDependency::new(
                Some("org.springframework"),
                "spring-core",
                Some("5.3.9"),
                false
            ),
        ]
    );
    assert_eq!(
        extracted.project_dependencies,
        vec![ProjectDependency::new("acme-api", false)]
    );
    assert_eq!(
        extracted.bom_dependencies,
        vec![BomDependency {
            group: "com.liferay.portal".to_string(),
            name: "release.portal.bom".to_string(),
            version: "7.4.3".to_string(),
        }]
    );
}

#[test]
fn module_without_dependency_block_inherits_nearest_ancestor() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path();
    write_file(
        &root.join("modules/build.gradle"),
        "dependencies {\n    compileOnly \"org.far:away:1.0\"\n}\n",
    );
    write_file(
        &root.join("modules/apps/build.gradle"),
        "dependencies {\n    compileOnly \"org.near:by:2.0\"\n}\n",
    );
    let module = root.join("modules/apps/plain");
    write_file(&module.join("build.gradle"), "apply plugin: \"java\"\n");

    let extracted = extract_dependencies(root, &module, &options());

    assert_eq!(
        extracted.library_dependencies,
        vec![LibraryDependency::new(Some("org.near"), "by", Some("2.0"), false)]
    );
}

#[test]
fn module_without_build_script_declares_nothing() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path();
    write_file(
        &root.join("modules/apps/build.gradle"),
        "dependencies {\n    compileOnly \"org.near:by:2.0\"\n}\n",
    );
    let module = root.join("modules/apps/bare");
    write_file(&module.join("bnd.bnd"), "Bundle-SymbolicName: com.example.bare\n");
    write_file(&module.join("src/main/java/Bare.java"), "class Bare {}\n");

    let extracted = extract_dependencies(root, &module, &options());

    assert!(extracted.library_dependencies.is_empty());
    assert!(extracted.project_dependencies.is_empty());
}

#[test]
fn unresolved_version_keeps_the_dependency_without_a_version() {
    let tmp = TempDir::new().expect("tempdir");
    let module = tmp.path().join("m");
    write_file(
        &module.join("build.gradle"),
        "dependencies {\n    compileOnly group: \"org.x\", name: \"y\", version: unknownVersion\n}\n",
    );

    let extracted = extract_dependencies(tmp.path(), &module, &options());

    assert_eq!(
        extracted.library_dependencies,
        vec![LibraryDependency::new(Some("org.x"), "y", None, false)]
    );
}

#[test]
fn integration_sources_pull_in_the_integration_support_module() {
    let tmp = TempDir::new().expect("tempdir");
    let module = tmp.path().join("m");
    write_file(&module.join("src/testIntegration/java/ItTest.java"), "");
    write_file(&module.join("src/test/java/UnitTest.java"), "");

    let extracted = extract_dependencies(tmp.path(), &module, &options());

    assert_eq!(
        extracted.project_dependencies,
        vec![
            ProjectDependency::new("portal-test", true),
            ProjectDependency::new("portal-test-integration", true),
        ]
    );
}
