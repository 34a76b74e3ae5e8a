//! Git smart HTTP calling convention
//!
//! Maps the smart HTTP endpoints under `/{org}/{repo}.git/` onto the CGI
//! environment understood by `git http-backend`:
//! - GET  /info/refs?service=git-upload-pack
//! - GET  /info/refs?service=git-receive-pack
//! - POST /git-upload-pack
//! - POST /git-receive-pack

use crate::hook::PUSHER_ENV;
use std::net::IpAddr;
use std::path::PathBuf;

/// Service types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    UploadPack,
    ReceivePack,
}

impl Service {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "git-upload-pack" => Some(Service::UploadPack),
            "git-receive-pack" => Some(Service::ReceivePack),
            _ => None,
        }
    }

    /// Extract the `service` parameter from a raw query string.
    pub fn from_query(query: &str) -> Option<Self> {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "service")
            .and_then(|(_, value)| Self::from_str(value))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::UploadPack => "git-upload-pack",
            Service::ReceivePack => "git-receive-pack",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Service::UploadPack => "application/x-git-upload-pack-advertisement",
            Service::ReceivePack => "application/x-git-receive-pack-advertisement",
        }
    }

    pub fn result_content_type(&self) -> &'static str {
        match self {
            Service::UploadPack => "application/x-git-upload-pack-result",
            Service::ReceivePack => "application/x-git-receive-pack-result",
        }
    }
}

/// Endpoint addressed by the path remainder after `{repo}.git/`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `info/refs`; the service comes from the query string
    InfoRefs,
    /// `git-upload-pack` or `git-receive-pack`
    Rpc(Service),
}

impl Endpoint {
    pub fn from_rest(rest: &str) -> Option<Self> {
        match rest {
            "info/refs" => Some(Endpoint::InfoRefs),
            other => Service::from_str(other).map(Endpoint::Rpc),
        }
    }

    /// HTTP method the endpoint is served on
    pub fn method(&self) -> &'static str {
        match self {
            Endpoint::InfoRefs => "GET",
            Endpoint::Rpc(_) => "POST",
        }
    }
}

/// One gateway request, ready to be handed to a protocol backend.
///
/// The body is fully buffered: the backend reads exactly `CONTENT_LENGTH`
/// bytes from its stdin.
#[derive(Debug, Clone, Default)]
pub struct CgiRequest {
    /// Store root; the backend finds `{org}/{repo}.git` beneath it
    pub project_root: PathBuf,
    pub method: String,
    /// `/{org}/{repo}.git/{rest}`
    pub path_info: String,
    pub query_string: String,
    pub content_type: Option<String>,
    /// `Content-Encoding` of the request body (git gzips large requests)
    pub content_encoding: Option<String>,
    /// `Git-Protocol` request header, used for protocol v2
    pub git_protocol: Option<String>,
    pub remote_addr: Option<IpAddr>,
    /// Pusher identity for the post-receive hook
    pub pusher: Option<String>,
    pub body: Vec<u8>,
}

impl CgiRequest {
    pub fn new(project_root: impl Into<PathBuf>, method: &str, path_info: String) -> Self {
        Self {
            project_root: project_root.into(),
            method: method.to_string(),
            path_info,
            ..Default::default()
        }
    }

    /// Build the `PATH_INFO` value for a repository endpoint.
    pub fn path_info_for(org: &str, name: &str, rest: &str) -> String {
        format!("/{}/{}.git/{}", org, name, rest)
    }

    /// CGI environment variables for this request
    pub fn env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("GATEWAY_INTERFACE", "CGI/1.1".to_string()),
            ("GIT_PROJECT_ROOT", self.project_root.to_string_lossy().into_owned()),
            ("GIT_HTTP_EXPORT_ALL", "1".to_string()),
            ("REQUEST_METHOD", self.method.clone()),
            ("PATH_INFO", self.path_info.clone()),
            ("QUERY_STRING", self.query_string.clone()),
            ("CONTENT_TYPE", self.content_type.clone().unwrap_or_default()),
            ("CONTENT_LENGTH", self.body.len().to_string()),
        ];

        if let Some(addr) = self.remote_addr {
            env.push(("REMOTE_ADDR", addr.to_string()));
        }
        if let Some(encoding) = &self.content_encoding {
            env.push(("HTTP_CONTENT_ENCODING", encoding.clone()));
        }
        if let Some(protocol) = &self.git_protocol {
            env.push(("GIT_PROTOCOL", protocol.clone()));
        }
        if let Some(pusher) = &self.pusher {
            env.push(("REMOTE_USER", pusher.clone()));
            env.push((PUSHER_ENV, pusher.clone()));
        }

        env
    }
}
