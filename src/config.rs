use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub git: GitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Base URL advertised in clone URLs. Defaults to http://<bind_address>
    #[serde(default)]
    pub public_url: Option<String>,
    /// Largest accepted request body, in MiB
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: u64,
    /// Request header carrying the pusher identity
    #[serde(default = "default_pusher_header")]
    pub pusher_header: String,
    /// Include backend stderr in 5xx responses. Only for trusted deployments.
    #[serde(default = "default_expose_backend_errors")]
    pub expose_backend_errors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_repos_root")]
    pub repos_root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// git executable, used for `init` and `http-backend`
    #[serde(default = "default_git_binary")]
    pub binary: String,
    /// Branch HEAD points at in new repositories
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Accept pushes over HTTP at all
    #[serde(default = "default_allow_push")]
    pub allow_push: bool,
    /// Kill the protocol backend after this many seconds (0 = never)
    #[serde(default)]
    pub backend_timeout_secs: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_body_mb() -> u64 {
    1024
}

fn default_pusher_header() -> String {
    "X-Pusher-Name".to_string()
}

fn default_expose_backend_errors() -> bool {
    true
}

fn default_repos_root() -> String {
    get_gitgate_dir()
        .join("repos")
        .to_string_lossy()
        .to_string()
}

fn default_git_binary() -> String {
    "git".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_allow_push() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_url: None,
            max_body_mb: default_max_body_mb(),
            pusher_header: default_pusher_header(),
            expose_backend_errors: default_expose_backend_errors(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            repos_root: default_repos_root(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            default_branch: default_branch(),
            allow_push: default_allow_push(),
            backend_timeout_secs: 0,
        }
    }
}

impl Config {
    /// Load config from the default location, or create it if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path())
    }

    /// Load config from `path`, writing defaults there first if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Base URL for clone URLs, without a trailing slash
    pub fn public_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.server.bind_address),
        }
    }

    pub fn max_body_bytes(&self) -> usize {
        usize::try_from(self.server.max_body_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

/// Get the gitgate directory (~/.gitgate)
pub fn get_gitgate_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gitgate")
}

/// Get the config file path (~/.gitgate/config.toml)
pub fn get_config_path() -> PathBuf {
    get_gitgate_dir().join("config.toml")
}
