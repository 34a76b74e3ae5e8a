use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gitgate::config::get_config_path;
use gitgate::server::GatewayOptions;
use gitgate::{Config, GitGateServer, HttpBackend, RepoStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gitgate")]
#[command(about = "Self-hosted git repositories over smart HTTP", long_about = None)]
struct Cli {
    /// Config file (default: ~/.gitgate/config.toml)
    #[arg(long, global = true, env = "GITGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the repository root from the config
    #[arg(long, global = true)]
    repos_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Start {
        /// Listen address (default from config)
        #[arg(long)]
        addr: Option<String>,
    },
    /// Create a bare repository
    Create {
        org: String,
        name: String,
    },
    /// List repositories
    List,
    /// Show the push log of a repository
    Pushlog {
        org: String,
        name: String,
        /// Print parsed entries as JSON
        #[arg(long)]
        json: bool,
    },
}

fn open_store(config: &Config, repos_root: Option<PathBuf>) -> Result<RepoStore> {
    let root = repos_root.unwrap_or_else(|| PathBuf::from(&config.storage.repos_root));
    let store = RepoStore::open(&root)
        .with_context(|| format!("Failed to open repository root {}", root.display()))?
        .with_git_binary(&config.git.binary)
        .with_default_branch(&config.git.default_branch)
        .with_public_url(config.public_url());
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gitgate=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(get_config_path);
    let mut config = Config::load_from(&config_path)?;

    match cli.command {
        Commands::Start { addr } => {
            if let Some(addr) = addr {
                config.server.bind_address = addr;
            }
            let store = Arc::new(open_store(&config, cli.repos_root)?);

            let mut backend = HttpBackend::new(&config.git.binary);
            if config.git.backend_timeout_secs > 0 {
                backend = backend.with_timeout(Duration::from_secs(config.git.backend_timeout_secs));
            }

            let options = GatewayOptions {
                allow_push: config.git.allow_push,
                pusher_header: config.server.pusher_header.clone(),
                expose_backend_errors: config.server.expose_backend_errors,
            };

            println!("Starting gitgate on {}", config.server.bind_address);
            println!("Repositories: {}", store.root().display());
            println!("Clone URLs: {}/<org>/<name>.git", config.public_url());
            if !config.git.allow_push {
                println!("Push over HTTP: disabled");
            }

            let server = GitGateServer::new(store, Arc::new(backend), config.server.bind_address.clone())
                .with_options(options)
                .with_max_body_bytes(config.max_body_bytes());
            server.run().await?;
        }
        Commands::Create { org, name } => {
            let store = open_store(&config, cli.repos_root)?;
            let repo = store
                .create(&org, &name)
                .with_context(|| format!("Failed to create {}/{}", org, name))?;
            println!("Created: {}/{}", repo.org, repo.name);
            println!("Path: {}", repo.path.display());
            println!("Clone: {}", repo.clone_url_http);
        }
        Commands::List => {
            let store = open_store(&config, cli.repos_root)?;
            let repos = store.list()?;
            if repos.is_empty() {
                println!("No repositories");
            } else {
                println!("Repositories ({}):", repos.len());
                for repo in repos {
                    println!("  {}/{}  {}", repo.org, repo.name, repo.clone_url_http);
                }
            }
        }
        Commands::Pushlog { org, name, json } => {
            let store = open_store(&config, cli.repos_root)?;
            let log = store.read_push_log(&org, &name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&log.entries())?);
            } else {
                match log.text {
                    Some(text) => print!("{}", text),
                    None => println!("{}", gitgate::server::NO_PUSHES_NOTE),
                }
            }
        }
    }

    Ok(())
}
