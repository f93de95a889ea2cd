use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use portalws_config::{init_tracing, load_for_workspace, PortalWsConfig};
use portalws_project::{
    load_modules, resolve_workspace, ArtifactLocator, CacheRoots, Coordinate, MavenFetcher,
    Module, ModuleType, ResolvedWorkspace,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "portalws",
    version,
    about = "Portal workspace model (discovery, dependency reconciliation, artifact lookup)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve every module's dependencies and locate library artifacts
    Resolve(ResolveArgs),
    /// List discovered modules with their declared dependencies
    Modules(ModulesArgs),
    /// Look up one `group:name:version` coordinate in the local caches
    Locate(LocateArgs),
}

#[derive(Args)]
struct ResolveArgs {
    /// Workspace root (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,
    /// Emit the resolved workspace as JSON
    #[arg(long)]
    json: bool,
    /// Never run the package manager for missing artifacts
    #[arg(long)]
    offline: bool,
    /// Override `discovery.max_depth`
    #[arg(long)]
    max_depth: Option<usize>,
}

#[derive(Args)]
struct ModulesArgs {
    /// Workspace root (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct LocateArgs {
    /// Coordinate as `group:name:version`
    coordinate: String,
    /// Workspace root (defaults to current directory)
    #[arg(long, default_value = ".")]
    path: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Resolve(args) => {
            let mut config = load_config(&args.path)?;
            if args.offline {
                config.completion.enabled = false;
            }
            if let Some(max_depth) = args.max_depth {
                config.discovery.max_depth = max_depth;
            }

            let fetcher = MavenFetcher::from_config(&config.completion);
            let resolved = resolve_workspace(&args.path, &config, &fetcher)
                .with_context(|| format!("failed to resolve {}", args.path.display()))?;
            if args.json {
                print_json(&resolved)?;
            } else {
                print_resolved(&resolved);
            }
            Ok(0)
        }
        Command::Modules(args) => {
            let config = load_config(&args.path)?;
            let (_, modules) = load_modules(&args.path, &config)
                .with_context(|| format!("failed to load {}", args.path.display()))?;
            if args.json {
                print_json(&modules)?;
            } else {
                for module in &modules {
                    println!("{}", describe_module(module));
                }
            }
            Ok(0)
        }
        Command::Locate(args) => {
            let coordinate = Coordinate::parse(&args.coordinate).with_context(|| {
                format!("invalid coordinate `{}` (expected group:name:version)", args.coordinate)
            })?;
            let config = load_config(&args.path)?;
            let root = std::fs::canonicalize(&args.path)
                .with_context(|| format!("failed to read {}", args.path.display()))?;

            let roots = CacheRoots::from_config(&root, [root.as_path()], &config.caches);
            let mut locator = ArtifactLocator::new(roots);
            let jars = locator.locate(&coordinate);
            let located = locator.is_located(&coordinate);

            if args.json {
                print_json(&LocateReport {
                    coordinate: coordinate.to_string(),
                    located,
                    jars,
                })?;
            } else if located {
                println!("{coordinate}");
                for jar in &jars {
                    println!("  {}", jar.display());
                }
            } else {
                println!("{coordinate}: not found in any cache root");
            }
            Ok(0)
        }
    }
}

fn load_config(path: &Path) -> Result<PortalWsConfig> {
    let (config, config_path) = load_for_workspace(path)
        .with_context(|| format!("failed to load configuration for {}", path.display()))?;
    init_tracing(&config.logging);
    if let Some(config_path) = config_path {
        tracing::debug!(
            target = "portalws.cli",
            path = %config_path.display(),
            "loaded configuration"
        );
    }
    Ok(config)
}

#[derive(Serialize)]
struct LocateReport {
    coordinate: String,
    located: bool,
    jars: Vec<PathBuf>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

fn describe_module(module: &Module) -> String {
    let bundle = match (&module.bundle_symbolic_name, &module.bundle_version) {
        (Some(name), Some(version)) => format!(" {name}@{version}"),
        (Some(name), None) => format!(" {name}"),
        _ => String::new(),
    };
    let unload = if module.unload { " [unloaded]" } else { "" };
    format!(
        "{} ({}){bundle}: {} libraries, {} projects{unload}",
        module.module_path,
        module_type_name(module),
        module.library_dependencies.len(),
        module.project_dependencies.len(),
    )
}

fn module_type_name(module: &Module) -> &'static str {
    match module.module_type {
        ModuleType::Core => "core",
        ModuleType::Module => "module",
        ModuleType::Plugin => "plugin",
    }
}

fn print_resolved(resolved: &ResolvedWorkspace) {
    println!("workspace: {}", resolved.workspace_root.display());
    println!("  modules: {}", resolved.modules.len());
    println!(
        "  libraries: {} ({} missing)",
        resolved.libraries.len(),
        resolved.missing.len()
    );
    let report = &resolved.report;
    println!("  converted: {}", report.converted.len());
    println!("  retained_for_classpath: {}", report.retained_for_classpath.len());
    println!("  reverted: {}", report.reverted.len());
    if let Some(completion) = &resolved.completion {
        println!(
            "  completion: {} iterations, {} fetched",
            completion.iterations,
            completion.resolved.len()
        );
    }
    for mismatch in &report.mismatches {
        println!(
            "mismatch: {}: {} (workspace has {})",
            mismatch.module, mismatch.dependency, mismatch.actual
        );
    }
    for coordinate in &resolved.missing {
        println!("missing: {coordinate}");
    }
}
