use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use gitgate_git::PushLogEntry;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::auth::AppState;
use crate::storage::{RepositoryDescriptor, StoreError};

/// No pushes recorded yet is a valid state, reported with this note
pub const NO_PUSHES_NOTE: &str = "No pushes logged yet";

#[derive(Deserialize)]
pub struct CreateRepoRequest {
    pub org: String,
    pub name: String,
}

#[derive(Serialize)]
pub struct RepoList {
    pub repos: Vec<RepositoryDescriptor>,
}

#[derive(Serialize)]
pub struct PushLogResponse {
    pub org: String,
    pub name: String,
    /// Raw log text, empty before the first push
    pub pushes: String,
    pub entries: Vec<PushLogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

pub fn store_error_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::InvalidName(_) => StatusCode::BAD_REQUEST,
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Git(_) | StoreError::Hook(_) | StoreError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn store_error_response(e: StoreError) -> Response {
    let status = store_error_status(&e);
    if status.is_server_error() {
        error!("Repository store error: {}", e);
    }
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

/// Run a store operation off the async runtime; the store does blocking
/// filesystem work and spawns git
async fn blocking<T, F>(f: F) -> Result<T, Response>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(store_error_response(e)),
        Err(e) => {
            error!("Repository store task failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response())
        }
    }
}

/// POST /repos
pub async fn create_repo(
    State(state): State<AppState>,
    Json(body): Json<CreateRepoRequest>,
) -> Response {
    let store = state.store.clone();
    match blocking(move || store.create(&body.org, &body.name)).await {
        Ok(repo) => (StatusCode::CREATED, Json(repo)).into_response(),
        Err(response) => response,
    }
}

/// GET /repos
pub async fn list_repos(State(state): State<AppState>) -> Response {
    let store = state.store.clone();
    match blocking(move || store.list()).await {
        Ok(repos) => Json(RepoList { repos }).into_response(),
        Err(response) => response,
    }
}

/// GET /repos/:org/:name/pushlog
pub async fn push_log(
    State(state): State<AppState>,
    Path((org, name)): Path<(String, String)>,
) -> Response {
    let store = state.store.clone();
    let log = match blocking(move || store.read_push_log(&org, &name)).await {
        Ok(log) => log,
        Err(response) => return response,
    };

    let entries = log.entries();
    let note = log.text.is_none().then_some(NO_PUSHES_NOTE);

    Json(PushLogResponse {
        org: log.repo.org,
        name: log.repo.name,
        pushes: log.text.unwrap_or_default(),
        entries,
        note,
    })
    .into_response()
}
