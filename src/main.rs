use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use edist::archive::ArchiveExtractorImpl;
use edist::edition::engine_version::EngineVersionResolver;
use edist::edition::provider::UpdatingEditionProvider;
use edist::edition::resolver::EditionResolver;
use edist::edition::{RawEdition, RepositoryRef};
use edist::engine::{HttpReleaseProvider, RuntimeVersionManager};
use edist::http::HttpClient;
use edist::library::{HttpRepositoryClient, PublishedLibraryCache};
use edist::paths::{DistributionLayout, SearchPathResolver};
use edist::requests::{GetPackage, PackageRequestHandler, VersionSpec};
use edist::runtime::RealRuntime;
use edist::version::{LibraryName, parse_version};

/// edist - edition and library distribution resolver
///
/// Resolves edition configuration chains, installs the engine versions they
/// require, and answers package metadata queries against the local library
/// cache and remote repositories.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Distribution root directory (overrides defaults; also via EDIST_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "EDIST_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub root: Option<PathBuf>,

    /// Release provider URL for engine and runtime downloads
    #[arg(
        long = "release-url",
        env = "EDIST_RELEASE_URL",
        value_name = "URL",
        default_value = "https://releases.edist.dev",
        global = true
    )]
    pub release_url: String,

    /// Repository URL to refresh editions from (repeatable)
    #[arg(long = "edition-repository", value_name = "URL", global = true)]
    pub edition_repositories: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Resolve an edition and print the merged configuration
    Resolve(EditionArgs),

    /// Print the engine version an edition requires
    EngineVersion(EngineVersionArgs),

    /// List available editions
    ListEditions(ListEditionsArgs),

    /// Download and install an engine version (and its runtime)
    InstallEngine(EngineArgs),

    /// Remove an installed engine version
    UninstallEngine(EngineArgs),

    /// List installed engine versions
    ListEngines,

    /// Query package metadata for a library
    Package(PackageArgs),
}

#[derive(clap::Args, Debug)]
struct EditionArgs {
    /// Edition name
    #[arg(value_name = "EDITION")]
    edition: String,
}

#[derive(clap::Args, Debug)]
struct EngineVersionArgs {
    /// Edition name
    #[arg(value_name = "EDITION")]
    edition: String,

    /// Engine version used when no edition in the chain names one
    #[arg(
        long = "default-engine-version",
        env = "EDIST_DEFAULT_ENGINE_VERSION",
        value_name = "SEMVER",
        default_value = "2024.1.1"
    )]
    default_engine_version: String,
}

#[derive(clap::Args, Debug)]
struct ListEditionsArgs {
    /// Refresh the edition cache from the configured repositories first
    #[arg(long)]
    update: bool,
}

#[derive(clap::Args, Debug)]
struct EngineArgs {
    /// Engine version
    #[arg(value_name = "SEMVER")]
    version: String,
}

#[derive(clap::Args, Debug)]
struct PackageArgs {
    /// Library name in the form "Namespace.Name"
    #[arg(value_name = "NAMESPACE.NAME")]
    library: String,

    /// Published version to query; without it the local cache is consulted
    #[arg(long, value_name = "SEMVER", requires = "repository")]
    version: Option<String>,

    /// Repository URL to query on a cache miss
    #[arg(long, value_name = "URL")]
    repository: Option<String>,

    /// Give up after this many seconds
    #[arg(long = "timeout-secs", value_name = "SECS", default_value_t = 30)]
    timeout_secs: u64,
}

fn edition_repositories(urls: &[String]) -> Vec<RepositoryRef> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| RepositoryRef {
            name: format!("repository-{i}"),
            url: url.clone(),
        })
        .collect()
}

fn edition_provider(
    runtime: Arc<RealRuntime>,
    layout: &DistributionLayout,
    repositories: Vec<RepositoryRef>,
) -> UpdatingEditionProvider<RealRuntime> {
    let search_paths = SearchPathResolver::new(layout.clone(), None).resolve(runtime.as_ref());
    UpdatingEditionProvider::new(
        runtime,
        HttpClient::default(),
        repositories,
        layout.editions_dir(),
        search_paths,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = Arc::new(RealRuntime);
    let layout = DistributionLayout::detect(runtime.as_ref(), cli.root.clone())?;
    let repositories = edition_repositories(&cli.edition_repositories);

    match cli.command {
        Commands::Resolve(args) => {
            let provider = edition_provider(Arc::clone(&runtime), &layout, repositories);
            let resolver = EditionResolver::new(runtime, provider);
            let raw = RawEdition {
                parent: Some(args.edition),
                ..Default::default()
            };
            let resolved = resolver.resolve(raw).await?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        Commands::EngineVersion(args) => {
            let provider = edition_provider(Arc::clone(&runtime), &layout, repositories);
            let resolver = EditionResolver::new(runtime, provider);
            let raw = RawEdition {
                parent: Some(args.edition),
                ..Default::default()
            };
            let default_version = parse_version(&args.default_engine_version)?;
            let version = EngineVersionResolver::new(default_version)
                .resolve_engine_version(&resolver, raw)
                .await?;
            println!("{version}");
        }
        Commands::ListEditions(args) => {
            use edist::edition::provider::EditionProvider;
            let provider = edition_provider(Arc::clone(&runtime), &layout, repositories);
            for name in provider.list_available(args.update).await {
                println!("{name}");
            }
        }
        Commands::InstallEngine(args) => {
            let version = parse_version(&args.version)?;
            let manager = RuntimeVersionManager::new(
                runtime,
                HttpReleaseProvider::new(HttpClient::default(), cli.release_url),
                ArchiveExtractorImpl::new(),
                layout,
            );
            let release = manager.find_or_install_engine(&version).await?;
            println!("engine {} installed", release.version);
        }
        Commands::UninstallEngine(args) => {
            let version = parse_version(&args.version)?;
            let manager = RuntimeVersionManager::new(
                runtime,
                HttpReleaseProvider::new(HttpClient::default(), cli.release_url),
                ArchiveExtractorImpl::new(),
                layout,
            );
            manager.uninstall_engine(&version).await?;
            println!("engine {version} uninstalled");
        }
        Commands::ListEngines => {
            let manager = RuntimeVersionManager::new(
                runtime,
                HttpReleaseProvider::new(HttpClient::default(), cli.release_url),
                ArchiveExtractorImpl::new(),
                layout,
            );
            for release in manager.list_installed_engines() {
                println!("{}", release.version);
            }
        }
        Commands::Package(args) => {
            let library: LibraryName = args.library.parse()?;
            let version = match (&args.version, &args.repository) {
                (Some(version), Some(repository)) => VersionSpec::Published {
                    version: parse_version(version)?,
                    repository_url: repository.clone(),
                },
                _ => VersionSpec::Local,
            };
            let cache = PublishedLibraryCache::new(
                runtime,
                HttpRepositoryClient::new(HttpClient::default()),
                layout,
            );
            let handler = PackageRequestHandler::new(
                Arc::new(cache),
                Duration::from_secs(args.timeout_secs),
            );
            let reply = handler
                .handle(GetPackage {
                    namespace: library.namespace,
                    name: library.name,
                    version,
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
    }
    Ok(())
}
