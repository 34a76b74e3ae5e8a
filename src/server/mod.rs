mod auth;
mod git;
mod handlers;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use crate::storage::RepoStore;
use gitgate_git::ProtocolBackend;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub use auth::{AppState, GatewayOptions, RequesterContext};
pub use git::{into_http_response, parse_repo_path};
pub use handlers::{CreateRepoRequest, PushLogResponse, RepoList, NO_PUSHES_NOTE};

/// Default request body ceiling (1 GiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024 * 1024;

pub struct GitGateServer {
    state: AppState,
    addr: String,
}

impl GitGateServer {
    pub fn new(store: Arc<RepoStore>, backend: Arc<dyn ProtocolBackend>, addr: String) -> Self {
        Self {
            state: AppState {
                store,
                backend,
                options: GatewayOptions::default(),
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            },
            addr,
        }
    }

    pub fn with_options(mut self, options: GatewayOptions) -> Self {
        self.state.options = options;
        self
    }

    /// Largest request body accepted on any route
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.state.max_body_bytes = max;
        self
    }

    pub fn router(&self) -> Router {
        // Anything the JSON API doesn't claim is a smart HTTP request
        Router::new()
            .route("/repos", get(handlers::list_repos).post(handlers::create_repo))
            .route("/repos/:org/:name/pushlog", get(handlers::push_log))
            .fallback(git::smart_http)
            .layer(DefaultBodyLimit::max(self.state.max_body_bytes))
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until the process stops
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!("Listening on {}", listener.local_addr()?);
        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}
