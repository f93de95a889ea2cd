use std::path::Path;

/// Bundle identity read from a module's manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleManifest {
    pub symbolic_name: Option<String>,
    pub version: Option<String>,
}

const JAR_MANIFEST: &str = "src/main/resources/META-INF/MANIFEST.MF";

/// Read `bnd.bnd`, falling back to the jar manifest. A missing or unreadable manifest is an
/// empty identity, not an error.
pub fn read_manifest(module_dir: &Path) -> BundleManifest {
    let bnd = module_dir.join("bnd.bnd");
    if let Some(text) = read_optional(&bnd) {
        return parse_manifest(&text);
    }

    let jar_manifest = module_dir.join(JAR_MANIFEST);
    match read_optional(&jar_manifest) {
        Some(text) => parse_manifest(&unfold_jar_manifest(&text)),
        None => BundleManifest::default(),
    }
}

pub fn parse_manifest(text: &str) -> BundleManifest {
    let props = portalws_properties::parse(text);
    BundleManifest {
        symbolic_name: props
            .get("Bundle-SymbolicName")
            .map(strip_directives)
            .filter(|v| !v.is_empty()),
        version: props
            .get("Bundle-Version")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
    }
}

// `com.example.foo;singleton:=true` -> `com.example.foo`
fn strip_directives(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

// Jar manifests wrap long values onto lines starting with a single space.
fn unfold_jar_manifest(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(' ') {
            out.push_str(rest);
        } else {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(line);
        }
    }
    out
}

fn read_optional(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::debug!(
                target = "portalws.discover",
                path = %path.display(),
                error = %err,
                "failed to read manifest (best effort)"
            );
            None
        }
    }
}
