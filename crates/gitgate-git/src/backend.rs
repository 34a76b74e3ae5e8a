//! Protocol backend invocation
//!
//! The pack protocol itself is delegated to an external CGI program
//! (`git http-backend`). [`ProtocolBackend`] is the seam the gateway talks to,
//! so it can be exercised against a fake without a git installation.

use crate::cgi::{parse_cgi_response, CgiResponse};
use crate::hook::PUSHER_ENV;
use crate::http::CgiRequest;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Something that can answer a CGI exchange
#[async_trait]
pub trait ProtocolBackend: Send + Sync {
    /// Run one request to completion. Headers and status are only known once
    /// the backend has finished, so nothing is streamed to the client early.
    async fn invoke(&self, request: CgiRequest) -> Result<CgiResponse>;
}

/// Runs a CGI program once per request
#[derive(Debug, Clone)]
pub struct HttpBackend {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl HttpBackend {
    /// `git http-backend` using the given git binary
    pub fn new(git_binary: impl Into<PathBuf>) -> Self {
        Self::with_program(git_binary, vec!["http-backend".to_string()])
    }

    /// Any CGI program with fixed arguments
    pub fn with_program(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// Kill the backend if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn run(&self, request: CgiRequest) -> Result<CgiResponse> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            // Identity only ever comes from the request
            .env_remove(PUSHER_ENV)
            .envs(request.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the request future (client went away) kills the child
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::BackendUnavailable(format!("{}: {}", self.program.display(), e))
            } else {
                Error::Io(e)
            }
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::BackendUnavailable("backend stdin not captured".into()))?;
        let body = request.body;

        let feed = async move {
            let result = stdin.write_all(&body).await;
            drop(stdin);
            result
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        if let Err(e) = fed {
            // The backend may answer (e.g. 403) without reading its input
            debug!("Backend closed stdin early: {}", e);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!("{} stderr: {}", self.program.display(), stderr.trim());
        }

        if !output.status.success() && output.stdout.is_empty() {
            return Err(Error::BackendFailure {
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        parse_cgi_response(&output.stdout)
    }
}

#[async_trait]
impl ProtocolBackend for HttpBackend {
    async fn invoke(&self, request: CgiRequest) -> Result<CgiResponse> {
        debug!(
            "Invoking {} {} {}?{}",
            self.program.display(),
            request.method,
            request.path_info,
            request.query_string
        );

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(request))
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => self.run(request).await,
        }
    }
}
