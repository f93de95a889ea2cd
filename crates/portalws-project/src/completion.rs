//! Populating the local caches with artifacts nothing has downloaded yet.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use portalws_config::CompletionConfig;
use portalws_process::{
    CommandRunner, CommandSpec, DefaultCommandRunner, RunCommandError, RunOptions,
};
use serde::Serialize;
use thiserror::Error;

use crate::artifacts::ArtifactLocator;
use crate::model::Coordinate;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Command(#[from] RunCommandError),
}

/// Something that can download coordinates into a local cache.
///
/// A successful fetch is only a hint; the caller re-runs the locator to see what arrived.
pub trait ArtifactFetcher: Send + Sync + fmt::Debug {
    fn fetch(&self, coordinates: &[Coordinate]) -> Result<(), FetchError>;
}

/// Runs the configured package manager against a generated `pom.xml` that lists the missing
/// coordinates as dependencies.
#[derive(Debug, Clone)]
pub struct MavenFetcher {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    args: Vec<String>,
}

impl MavenFetcher {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &CompletionConfig) -> Self {
        Self {
            runner,
            program: config.mvn_path.clone(),
            args: config.args.clone(),
        }
    }

    /// A fetcher backed by the real process runner, bounded by the configured timeout.
    pub fn from_config(config: &CompletionConfig) -> Self {
        let runner = DefaultCommandRunner::new(RunOptions {
            timeout: Some(config.timeout()),
            inherit_stdio: config.inherit_stdio,
            ..RunOptions::default()
        });
        Self::new(Arc::new(runner), config)
    }
}

impl ArtifactFetcher for MavenFetcher {
    fn fetch(&self, coordinates: &[Coordinate]) -> Result<(), FetchError> {
        // Ungrouped core libraries are not published anywhere.
        let grouped: Vec<&Coordinate> = coordinates.iter().filter(|c| c.group.is_some()).collect();
        if grouped.is_empty() {
            return Ok(());
        }

        let scratch = tempfile::Builder::new()
            .prefix("portalws-fetch")
            .tempdir()
            .map_err(FetchError::Scratch)?;
        let pom_path = scratch.path().join("pom.xml");
        std::fs::write(&pom_path, synthetic_pom(&grouped)).map_err(|source| FetchError::Io {
            path: pom_path.clone(),
            source,
        })?;

        let command = CommandSpec::new(scratch.path(), &self.program, &self.args);
        tracing::info!(
            target = "portalws.completion",
            command = %command,
            coordinates = grouped.len(),
            "running package manager"
        );
        let output = self
            .runner
            .run(scratch.path(), &self.program, &self.args)
            .map_err(|source| RunCommandError::Io {
                command: command.clone(),
                source,
            })?;
        RunCommandError::check(command, output)?;
        Ok(())
    }
}

fn synthetic_pom(coordinates: &[&Coordinate]) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <project xmlns=\"http://maven.apache.org/POM/4.0.0\">\n\
         \x20 <modelVersion>4.0.0</modelVersion>\n\
         \x20 <groupId>portalws</groupId>\n\
         \x20 <artifactId>portalws-completion</artifactId>\n\
         \x20 <version>1</version>\n\
         \x20 <packaging>pom</packaging>\n\
         \x20 <dependencies>\n",
    );
    for coordinate in coordinates {
        out.push_str("    <dependency>\n");
        out.push_str(&format!(
            "      <groupId>{}</groupId>\n",
            escape_xml(coordinate.group.as_deref().unwrap_or_default())
        ));
        out.push_str(&format!(
            "      <artifactId>{}</artifactId>\n",
            escape_xml(&coordinate.name)
        ));
        out.push_str(&format!(
            "      <version>{}</version>\n",
            escape_xml(&coordinate.version)
        ));
        out.push_str("    </dependency>\n");
    }
    out.push_str("  </dependencies>\n</project>\n");
    out
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOptions {
    pub max_iterations: usize,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self::from(&CompletionConfig::default())
    }
}

impl From<&CompletionConfig> for CompletionOptions {
    fn from(config: &CompletionConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub iterations: usize,
    /// Coordinates that became available, sorted.
    pub resolved: Vec<Coordinate>,
    /// Coordinates still missing, sorted.
    pub remaining: Vec<Coordinate>,
}

/// Fetch what `wanted` still lacks, transitive dependencies included, and re-locate against
/// a cleared memo until nothing is missing, a pass makes no progress, or
/// `options.max_iterations` passes ran. Fetch failures are logged and never abort the loop.
pub fn complete_cache(
    locator: &mut ArtifactLocator,
    wanted: &[Coordinate],
    fetcher: &dyn ArtifactFetcher,
    options: &CompletionOptions,
) -> CompletionReport {
    let mut remaining = locator.unresolved(wanted);

    let mut report = CompletionReport::default();
    while !remaining.is_empty() && report.iterations < options.max_iterations {
        report.iterations += 1;
        tracing::info!(
            target = "portalws.completion",
            iteration = report.iterations,
            missing = remaining.len(),
            "fetching missing artifacts"
        );

        if let Err(err) = fetcher.fetch(&remaining) {
            tracing::warn!(
                target = "portalws.completion",
                iteration = report.iterations,
                error = %err,
                "artifact fetch failed"
            );
        }

        // Entries located earlier embed jar lists computed while their dependencies were
        // absent, so nothing memoized survives a fetch.
        locator.clear();
        let next = locator.unresolved(wanted);
        report
            .resolved
            .extend(remaining.iter().filter(|c| !next.contains(c)).cloned());
        let progressed = next.len() < remaining.len();
        remaining = next;

        if !progressed {
            tracing::debug!(
                target = "portalws.completion",
                iteration = report.iterations,
                "no progress; giving up on remaining artifacts"
            );
            break;
        }
    }

    if !remaining.is_empty() {
        tracing::warn!(
            target = "portalws.completion",
            missing = remaining.len(),
            "artifacts still missing after completion"
        );
    }
    report.resolved.sort();
    report.resolved.dedup();
    report.remaining = remaining;
    report
}
