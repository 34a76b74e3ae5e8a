//! Repository store
//!
//! Bare repositories live at `<root>/<org>/<name>.git`. Organization and
//! repository names are restricted to `[A-Za-z0-9._-]` so no request can
//! address anything outside the root.

use gitgate_git::hook::{self, PUSH_LOG_FILE};
use gitgate_git::{parse_push_log, PushLogEntry};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Suffix of bare repository directories
pub const REPO_SUFFIX: &str = ".git";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Repo already exists: {org}/{name}")]
    Conflict { org: String, name: String },

    #[error("Repo not found: {org}/{name}")]
    NotFound { org: String, name: String },

    #[error("git failed: {0}")]
    Git(String),

    #[error("Hook installation failed: {0}")]
    Hook(#[from] gitgate_git::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check an organization or repository name.
///
/// Surrounding whitespace is ignored; the trimmed name is returned.
pub fn validate_identifier(s: &str) -> Result<&str, StoreError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(StoreError::InvalidName("Empty name not allowed".into()));
    }
    if s.contains('/') || s.contains('\\') || s.contains("..") || s == "." {
        return Err(StoreError::InvalidName("Invalid name".into()));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(StoreError::InvalidName(
            "Only letters, numbers, '-', '_', '.' are allowed".into(),
        ));
    }
    Ok(s)
}

/// A repository as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryDescriptor {
    pub org: String,
    pub name: String,
    pub path: PathBuf,
    pub clone_url_http: String,
    pub clone_url_file: String,
}

/// Contents of a repository's push log
#[derive(Debug, Clone)]
pub struct PushLog {
    pub repo: RepositoryDescriptor,
    /// `None` until the first push has been recorded
    pub text: Option<String>,
}

impl PushLog {
    pub fn entries(&self) -> Vec<PushLogEntry> {
        self.text.as_deref().map(parse_push_log).unwrap_or_default()
    }
}

pub struct RepoStore {
    root: PathBuf,
    git_binary: PathBuf,
    default_branch: String,
    public_url: String,
}

impl RepoStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let root = root.canonicalize()?;

        Ok(Self {
            root,
            git_binary: PathBuf::from("git"),
            default_branch: "main".to_string(),
            public_url: "http://127.0.0.1:8080".to_string(),
        })
    }

    pub fn with_git_binary(mut self, git_binary: impl Into<PathBuf>) -> Self {
        self.git_binary = git_binary.into();
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Base URL used for `clone_url_http`
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn repo_path(&self, org: &str, name: &str) -> PathBuf {
        self.root.join(org).join(format!("{}{}", name, REPO_SUFFIX))
    }

    fn descriptor(&self, org: &str, name: &str) -> RepositoryDescriptor {
        let path = self.repo_path(org, name);
        RepositoryDescriptor {
            org: org.to_string(),
            name: name.to_string(),
            clone_url_http: format!("{}/{}/{}{}", self.public_url, org, name, REPO_SUFFIX),
            clone_url_file: format!("file://{}", path.display()),
            path,
        }
    }

    /// Create a new bare repository with HTTP access enabled and the push hook installed
    pub fn create(&self, org: &str, name: &str) -> Result<RepositoryDescriptor, StoreError> {
        let org = validate_identifier(org)?;
        let name = validate_identifier(name)?;
        let path = self.repo_path(org, name);
        let org_dir = self.root.join(org);

        // Exclusive create is the only race-safe existence check
        match create_exclusive(&org_dir, &path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::Conflict {
                    org: org.to_string(),
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.initialize(&path) {
            warn!("Rolling back {}: {}", path.display(), e);
            if let Err(cleanup) = fs::remove_dir_all(&path) {
                warn!("Failed to remove {}: {}", path.display(), cleanup);
            }
            // Only succeeds when no other repository lives in the org
            if fs::remove_dir(&org_dir).is_ok() {
                debug!("Removed empty org directory {}", org_dir.display());
            }
            return Err(e);
        }

        info!("Created repository {}/{} at {}", org, name, path.display());
        Ok(self.descriptor(org, name))
    }

    fn initialize(&self, path: &Path) -> Result<(), StoreError> {
        let path_lossy = path.to_string_lossy();
        let path_str: &str = &path_lossy;
        self.git(&["init", "--bare", "--quiet", path_str])?;

        let head = format!("refs/heads/{}", self.default_branch);
        self.git(&["-C", path_str, "symbolic-ref", "HEAD", head.as_str()])?;
        self.git(&["-C", path_str, "config", "http.receivepack", "true"])?;
        self.git(&["-C", path_str, "config", "http.uploadpack", "true"])?;

        hook::install(path)?;
        Ok(())
    }

    fn git(&self, args: &[&str]) -> Result<(), StoreError> {
        debug!("{} {}", self.git_binary.display(), args.join(" "));

        let output = Command::new(&self.git_binary)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    StoreError::Git(format!("{} not found", self.git_binary.display()))
                } else {
                    StoreError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(StoreError::Git(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    /// Look up an existing repository. Only a stat; repository integrity is not checked.
    pub fn resolve(&self, org: &str, name: &str) -> Result<RepositoryDescriptor, StoreError> {
        let org = validate_identifier(org)?;
        let name = validate_identifier(name)?;

        if !self.repo_path(org, name).is_dir() {
            return Err(StoreError::NotFound {
                org: org.to_string(),
                name: name.to_string(),
            });
        }
        Ok(self.descriptor(org, name))
    }

    /// All repositories under the root, sorted by org then name
    pub fn list(&self) -> Result<Vec<RepositoryDescriptor>, StoreError> {
        let mut repos = Vec::new();

        for org_entry in fs::read_dir(&self.root)? {
            let org_entry = org_entry?;
            if !org_entry.file_type()?.is_dir() {
                continue;
            }
            let org_name = org_entry.file_name();
            let Some(org) = org_name.to_str() else {
                continue;
            };
            if validate_identifier(org).map(|v| v != org).unwrap_or(true) {
                continue;
            }

            for repo_entry in fs::read_dir(org_entry.path())? {
                let repo_entry = repo_entry?;
                if !repo_entry.file_type()?.is_dir() {
                    continue;
                }
                let file_name = repo_entry.file_name();
                let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(REPO_SUFFIX))
                else {
                    continue;
                };
                if validate_identifier(name).map(|v| v == name).unwrap_or(false) {
                    repos.push(self.descriptor(org, name));
                }
            }
        }

        repos.sort_by(|a, b| (&a.org, &a.name).cmp(&(&b.org, &b.name)));
        Ok(repos)
    }

    /// Read a repository's push log verbatim
    pub fn read_push_log(&self, org: &str, name: &str) -> Result<PushLog, StoreError> {
        let repo = self.resolve(org, name)?;

        let text = match fs::read(repo.path.join(PUSH_LOG_FILE)) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(PushLog { repo, text })
    }
}

/// Create `path` inside `org_dir`, failing with `AlreadyExists` if it is taken.
/// A rollback elsewhere may remove an empty `org_dir` between the two steps,
/// so that case is retried once.
fn create_exclusive(org_dir: &Path, path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(org_dir)?;
    match fs::create_dir(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(org_dir)?;
            fs::create_dir(path)
        }
        result => result,
    }
}
