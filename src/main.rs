// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nuvault::search::{SearchBackend, SearchRequest};
use nuvault::storage::read_to_bytes;
use nuvault::{
    IndexingResult, PackageCatalog, PackageIndexer, PackageVersion, Registry, RegistryConfig, SearchFilters,
    StorageService,
};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Config file picked up from the working directory when --config is absent
const DEFAULT_CONFIG_PATH: &str = "nuvault.toml";

#[derive(Parser)]
#[command(name = "nuvault")]
#[command(author, version, about = "NuGet-compatible package registry", long_about = None)]
struct Cli {
    /// Configuration file (default: ./nuvault.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print registry metrics when the command finishes
    #[arg(long, global = true)]
    stats: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog database and storage layout
    Init,
    /// Publish a .nupkg file
    Push {
        /// Path to the package archive
        package_path: PathBuf,
    },
    /// List every known version of a package
    Versions { id: String },
    /// List every known version of a package with its metadata
    Packages { id: String },
    /// Fetch a package archive, mirroring it from upstream if needed
    Fetch {
        id: String,
        version: String,
        /// Output file (default: {id}.{version}.nupkg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a package version (unlist or hard delete, per configuration)
    Delete { id: String, version: String },
    /// Make an unlisted package version visible again
    Relist { id: String, version: String },
    /// Record a download of a package version
    Download { id: String, version: String },
    /// Rebuild search documents (all packages when no ids are given)
    Reindex { ids: Vec<String> },
    /// Search packages
    Search {
        #[arg(default_value = "")]
        query: String,
        /// Include prerelease versions
        #[arg(long)]
        prerelease: bool,
        /// Include SemVer 2.0.0 versions
        #[arg(long)]
        semver2: bool,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = 20)]
        take: usize,
    },
}

fn load_config(path: Option<&Path>) -> Result<RegistryConfig> {
    match path {
        Some(path) => RegistryConfig::load(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => RegistryConfig::load(Path::new(DEFAULT_CONFIG_PATH)),
        None => Ok(RegistryConfig::new()),
    }
}

fn parse_version(version: &str) -> Result<PackageVersion> {
    PackageVersion::parse(version).with_context(|| format!("Invalid version: {}", version))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config = load_config(cli.config.as_deref())?;
    let registry = Registry::open(&config)?;

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling...");
            ctrl_c.cancel();
        }
    });

    let result = run(cli.command, &registry, &token).await;

    if cli.stats {
        println!("{}", serde_json::to_string_pretty(&registry.metrics.snapshot())?);
    }
    result
}

async fn run(command: Commands, registry: &Registry, token: &CancellationToken) -> Result<()> {
    match command {
        Commands::Init => {
            info!("Registry initialized");
            println!("Registry initialized ({} storage)", registry.storage.storage().name());
            Ok(())
        }
        Commands::Push { package_path } => {
            let data = tokio::fs::read(&package_path)
                .await
                .with_context(|| format!("Failed to read package: {}", package_path.display()))?;

            match registry.indexer.index(data.into(), token).await? {
                IndexingResult::Success => {
                    println!("Published {}", package_path.display());
                    Ok(())
                }
                IndexingResult::PackageAlreadyExists => {
                    anyhow::bail!("Package already exists: {}", package_path.display())
                }
                IndexingResult::InvalidPackage => {
                    anyhow::bail!("Invalid package: {}", package_path.display())
                }
            }
        }
        Commands::Versions { id } => {
            let versions = registry.packages.find_versions(&id, token).await?;
            if versions.is_empty() {
                anyhow::bail!("Package not found: {}", id);
            }
            for version in versions {
                println!("{}", version);
            }
            Ok(())
        }
        Commands::Packages { id } => {
            let packages = registry.packages.find_packages(&id, token).await?;
            if packages.is_empty() {
                anyhow::bail!("Package not found: {}", id);
            }
            for package in packages {
                println!(
                    "{} {}{} downloads={} published={}",
                    package.id,
                    package.version,
                    if package.listed { "" } else { " (unlisted)" },
                    package.downloads,
                    package.published.to_rfc3339()
                );
            }
            Ok(())
        }
        Commands::Fetch { id, version, output } => {
            let version = parse_version(&version)?;
            let package = registry
                .packages
                .find_or_null(&id, &version, token)
                .await?
                .with_context(|| format!("Package not found: {} {}", id, version))?;

            let reader = registry.storage.get_archive(&package.id, &package.version, token).await?;
            let data = read_to_bytes(reader).await?;

            let output = output.unwrap_or_else(|| {
                let identity = package.identity();
                PathBuf::from(format!("{}.{}.nupkg", identity.lower_id(), identity.lower_version()))
            });
            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Saved {} {} to {}", package.id, package.version, output.display());
            Ok(())
        }
        Commands::Delete { id, version } => {
            let version = parse_version(&version)?;
            if !registry.deletion.try_delete(&id, &version, token).await? {
                anyhow::bail!("Package not found: {} {}", id, version);
            }
            println!("Deleted {} {} ({})", id, version, registry.deletion.behavior());
            Ok(())
        }
        Commands::Relist { id, version } => {
            let version = parse_version(&version)?;
            if !registry.deletion.relist(&id, &version, token).await? {
                anyhow::bail!("Package not found: {} {}", id, version);
            }
            println!("Relisted {} {}", id, version);
            Ok(())
        }
        Commands::Download { id, version } => {
            let version = parse_version(&version)?;
            if !registry.packages.exists(&id, &version, token).await? {
                anyhow::bail!("Package not found: {} {}", id, version);
            }
            registry.packages.add_download(&id, &version, token).await?;
            println!("Recorded download of {} {}", id, version);
            Ok(())
        }
        Commands::Reindex { ids } => {
            let ids = if ids.is_empty() {
                registry.catalog.package_ids(token).await?
            } else {
                ids
            };
            let count = registry.search.reindex(&ids, token).await?;
            println!("Reindexed {} packages", count);
            Ok(())
        }
        Commands::Search {
            query,
            prerelease,
            semver2,
            skip,
            take,
        } => {
            let request = SearchRequest {
                query,
                filters: SearchFilters::new(prerelease, semver2),
                skip,
                take,
            };
            let hits = registry.search.backend().search(&request, token).await?;
            for hit in hits {
                println!(
                    "{} {} downloads={} {}",
                    hit.id,
                    hit.version,
                    hit.total_downloads,
                    hit.title.as_deref().unwrap_or(&hit.description)
                );
            }
            Ok(())
        }
    }
}
