//! Workspace configuration (`portalws.toml`) and logging setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once, OnceLock};
use std::time::Duration;

use parking_lot::ReentrantMutex;
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

/// Module discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// How many directory levels below the root are searched for modules.
    #[serde(default = "DiscoveryConfig::default_max_depth")]
    pub max_depth: usize,

    /// Include modules that live in pull-mode (read-only mirrored) sub-repositories.
    #[serde(default)]
    pub include_pull_repos: bool,

    /// Sub-repository directories (relative to the root) that are always included.
    #[serde(default)]
    pub include_sub_repos: Vec<PathBuf>,

    /// Extra directory names pruned during the walk.
    #[serde(default)]
    pub skip_dirs: Vec<String>,
}

impl DiscoveryConfig {
    fn default_max_depth() -> usize {
        6
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_depth: Self::default_max_depth(),
            include_pull_repos: false,
            include_sub_repos: Vec::new(),
            skip_dirs: Vec::new(),
        }
    }
}

/// Library → project rewriting settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Coordinate groups owned by the workspace. Only libraries in these groups are
    /// candidates for conversion into project dependencies.
    #[serde(default = "ReconcileConfig::default_workspace_groups")]
    pub workspace_groups: Vec<String>,

    /// Module appended as a test dependency of every module with `src/test`.
    #[serde(default = "ReconcileConfig::default_unit_test_support")]
    pub unit_test_support_module: Option<String>,

    /// Module appended as a test dependency of every module with `src/testIntegration`.
    #[serde(default = "ReconcileConfig::default_integration_test_support")]
    pub integration_test_support_module: Option<String>,

    /// Module path prefixes that mark third-party/SDK modules (all their dependencies are
    /// exported).
    #[serde(default = "ReconcileConfig::default_third_party_prefixes")]
    pub third_party_prefixes: Vec<String>,
}

impl ReconcileConfig {
    fn default_workspace_groups() -> Vec<String> {
        vec!["com.liferay".to_owned()]
    }

    fn default_unit_test_support() -> Option<String> {
        Some("portal-test".to_owned())
    }

    fn default_integration_test_support() -> Option<String> {
        Some("portal-test-integration".to_owned())
    }

    fn default_third_party_prefixes() -> Vec<String> {
        vec!["third-party".to_owned(), "sdk".to_owned()]
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            workspace_groups: Self::default_workspace_groups(),
            unit_test_support_module: Self::default_unit_test_support(),
            integration_test_support_module: Self::default_integration_test_support(),
            third_party_prefixes: Self::default_third_party_prefixes(),
        }
    }
}

/// Local package caches searched by the artifact locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachesConfig {
    /// Extra Maven-layout repositories (`group/as/path/name/version/name-version.jar`).
    #[serde(default)]
    pub maven_repos: Vec<PathBuf>,

    /// Extra Gradle-layout caches (`group/name/version/<hash>/file.jar`).
    #[serde(default)]
    pub gradle_caches: Vec<PathBuf>,

    /// Search `~/.m2/repository` and `~/.gradle/caches/modules-2/files-2.1`.
    #[serde(default = "CachesConfig::default_use_home")]
    pub use_home: bool,

    /// Workspace-relative directories holding ungrouped core libraries (`<name>.jar`).
    #[serde(default = "CachesConfig::default_core_lib_dirs")]
    pub core_lib_dirs: Vec<PathBuf>,
}

impl CachesConfig {
    fn default_use_home() -> bool {
        true
    }

    fn default_core_lib_dirs() -> Vec<PathBuf> {
        ["lib/development", "lib/global", "lib/portal"]
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            maven_repos: Vec::new(),
            gradle_caches: Vec::new(),
            use_home: Self::default_use_home(),
            core_lib_dirs: Self::default_core_lib_dirs(),
        }
    }
}

/// Missing-dependency completion (package manager invocation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "CompletionConfig::default_enabled")]
    pub enabled: bool,

    /// Package manager executable.
    #[serde(default = "CompletionConfig::default_mvn_path")]
    pub mvn_path: PathBuf,

    /// Arguments passed after the generated descriptor is written.
    #[serde(default = "CompletionConfig::default_args")]
    pub args: Vec<String>,

    /// Upper bound on fetch → re-locate rounds.
    #[serde(default = "CompletionConfig::default_max_iterations")]
    pub max_iterations: usize,

    /// Wall-clock limit for a single package manager invocation.
    #[serde(default = "CompletionConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    /// Let the package manager write straight to the terminal.
    #[serde(default = "CompletionConfig::default_inherit_stdio")]
    pub inherit_stdio: bool,
}

impl CompletionConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_mvn_path() -> PathBuf {
        PathBuf::from("mvn")
    }

    fn default_args() -> Vec<String> {
        vec!["-q".to_owned(), "dependency:go-offline".to_owned()]
    }

    fn default_max_iterations() -> usize {
        3
    }

    fn default_timeout_ms() -> u64 {
        10 * 60 * 1000
    }

    fn default_inherit_stdio() -> bool {
        true
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            mvn_path: Self::default_mvn_path(),
            args: Self::default_args(),
            max_iterations: Self::default_max_iterations(),
            timeout_ms: Self::default_timeout_ms(),
            inherit_stdio: Self::default_inherit_stdio(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Append logs to the given file (in addition to stderr).
    ///
    /// If the file cannot be opened, file logging is disabled.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective `EnvFilter`; `RUST_LOG`, when set, is merged after the configured level.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            file: None,
        }
    }
}

/// Top-level configuration, usually read from `portalws.toml` at the workspace root.
///
/// ```toml
/// [discovery]
/// max_depth = 6
/// include_pull_repos = false
///
/// [reconcile]
/// workspace_groups = ["com.liferay"]
///
/// [caches]
/// maven_repos = ["/opt/m2"]
///
/// [completion]
/// enabled = true
/// max_iterations = 3
/// timeout_ms = 600000
///
/// [logging]
/// level = "info"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalWsConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub caches: CachesConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // Keep the message and location only; the default `Display` quotes source lines.
        let message = err.message().to_owned();
        match err.span() {
            Some(span) => ConfigError::Toml(format!("{message} (at byte {})", span.start)),
            None => ConfigError::Toml(message),
        }
    }
}

impl PortalWsConfig {
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }
}

/// Environment variable overriding config discovery.
pub const PORTALWS_CONFIG_ENV_VAR: &str = "PORTALWS_CONFIG";

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Tests that set [`PORTALWS_CONFIG_ENV_VAR`] must go through this so concurrent discovery in
/// other tests does not observe the temporary override.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Discover the configuration file for a workspace root.
///
/// Search order:
/// 1) `PORTALWS_CONFIG` (absolute or relative to `workspace_root`)
/// 2) `portalws.toml`
/// 3) `.portalws.toml`
/// 4) `.portalws/config.toml`
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(PORTALWS_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            workspace_root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }

    ["portalws.toml", ".portalws.toml", ".portalws/config.toml"]
        .into_iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the configuration for a workspace root.
///
/// If no config is present, returns [`PortalWsConfig::default`] and `None`.
pub fn load_for_workspace(
    workspace_root: &Path,
) -> Result<(PortalWsConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(workspace_root) else {
        return Ok((PortalWsConfig::default(), None));
    };

    let config = PortalWsConfig::load_from_path(&path)?;
    Ok((config, Some(path)))
}

static TRACING_INIT: Once = Once::new();

#[derive(Clone)]
struct MutexFileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

struct MutexFileWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl std::io::Write for MutexFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.file.lock() {
            Ok(mut file) => file.write(buf),
            // A poisoned sink drops the line rather than taking logging down.
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.file.lock() {
            Ok(mut file) => file.flush(),
            Err(_) => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for MutexFileMakeWriter {
    type Writer = MutexFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MutexFileWriter {
            file: self.file.clone(),
        }
    }
}

/// Install the global tracing subscriber. Only the first call has an effect.
pub fn init_tracing(logging: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = logging.env_filter();

        let file = logging
            .file
            .as_ref()
            .and_then(|path| {
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .ok()
            })
            .map(|file| Arc::new(Mutex::new(file)));

        let mut make_writer = BoxMakeWriter::new(std::io::stderr);
        if let Some(file) = file {
            make_writer = BoxMakeWriter::new(std::io::stderr.and(MutexFileMakeWriter { file }));
        }

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .with_target(true)
                .boxed()
        };

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init();
    });
}
