use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, warn};

use pkgmeta::config::{self, Config};
use pkgmeta::service::{Resolution, Service};
use pkgmeta::version::error::RegistryError;
use pkgmeta::version::registries::ListingKind;
use pkgmeta::version::store::{ListingStore, SqliteListingStore};
use pkgmeta::version::telemetry::TracingTelemetry;
use pkgmeta::version::types::RepoId;

#[derive(Parser)]
#[command(name = "pkgmeta")]
#[command(version, about = "Resolve package versions from npm registries and GitHub tags")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the log file as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Do not persist file listings
    #[arg(long, global = true)]
    no_store: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a version of an npm package
    Npm {
        name: String,
        /// Exact version, dist-tag or range (default: latest)
        #[arg(default_value = "")]
        spec: String,
        /// Print the full metadata document
        #[arg(long)]
        json: bool,
    },
    /// Resolve a version from the tags of a GitHub repository
    Gh {
        /// Repository as owner/repo
        repo: String,
        #[arg(default_value = "")]
        spec: String,
        #[arg(long)]
        json: bool,
    },
    /// Print the file listing of a published version
    Files {
        name: String,
        version: String,
        /// Treat `name` as a GitHub owner/repo
        #[arg(long)]
        gh: bool,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .with_env();

    let _guard = pkgmeta::logging::init(&config::log_path(), cli.log_json)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli, config))
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<ExitCode> {
    let store = if cli.no_store {
        None
    } else {
        open_store()
    };
    let mut service = Service::from_config(&config, store, Arc::new(TracingTelemetry));
    let monitor = service.spawn_rate_limit_monitor();

    let result = match cli.command {
        Command::Npm { name, spec, json } => service
            .resolve_npm(&name, &spec)
            .await
            .and_then(|resolution| print_resolution(&resolution, json)),
        Command::Gh { repo, spec, json } => match RepoId::parse(&repo) {
            Ok(repo) => service
                .resolve_github(&repo, &spec)
                .await
                .and_then(|resolution| print_resolution(&resolution, json)),
            Err(e) => Err(e),
        },
        Command::Files { name, version, gh } => {
            let kind = if gh {
                ListingKind::GitHub
            } else {
                ListingKind::Npm
            };
            service
                .files(kind, &name, &version)
                .await
                .and_then(|listing| print_json(&listing))
        }
    };

    if let Some(monitor) = monitor {
        monitor.abort();
    }

    match result {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", e.status_code(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn open_store() -> Option<Arc<dyn ListingStore>> {
    match SqliteListingStore::new(&config::db_path()) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!("Listing store unavailable, continuing without it: {}", e);
            None
        }
    }
}

/// Prints the resolved version, or the whole document with `json`.
/// Returns whether a version was found.
fn print_resolution(resolution: &Resolution, json: bool) -> Result<bool, RegistryError> {
    if json {
        print_json(&resolution.document)?;
    }
    match &resolution.version {
        Some(version) => {
            if !json {
                println!("{}", version);
            }
            Ok(true)
        }
        None => {
            eprintln!("no matching version");
            Ok(false)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<bool, RegistryError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| RegistryError::Validation(e.to_string()))?;
    println!("{}", out);
    Ok(true)
}
