//! Git smart HTTP gateway
//!
//! Serves `/{org}/{repo}.git/{rest}`:
//!   - GET  /{org}/{repo}.git/info/refs?service=git-upload-pack|git-receive-pack
//!   - POST /{org}/{repo}.git/git-upload-pack
//!   - POST /{org}/{repo}.git/git-receive-pack
//!
//! Requests are validated and resolved against the store before any
//! subprocess starts, and before the request body is read. Accepted requests
//! are handed to the protocol backend as a CGI exchange. The backend's body is
//! forwarded byte for byte.

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use gitgate_git::{CgiRequest, CgiResponse, Endpoint, Error as BackendError, Service};
use std::net::SocketAddr;
use tracing::{debug, error, warn};

use super::auth::{AppState, RequesterContext};
use super::handlers::store_error_status;
use crate::storage::REPO_SUFFIX;

/// Header carrying the requested wire protocol version
const GIT_PROTOCOL_HEADER: &str = "git-protocol";

/// Split `/{org}/{repo}.git/{rest}` into its parts
pub fn parse_repo_path(path: &str) -> Option<(&str, &str, &str)> {
    let mut parts = path.strip_prefix('/')?.splitn(3, '/');
    let org = parts.next()?;
    let name = parts.next()?.strip_suffix(REPO_SUFFIX)?;
    let rest = parts.next()?;
    Some((org, name, rest))
}

fn header_string(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Handles every request not claimed by the JSON API
pub async fn smart_http(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    requester: RequesterContext,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some((org, name, rest)) = parse_repo_path(uri.path()) else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };
    let Some(endpoint) = Endpoint::from_rest(rest) else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };
    if method.as_str() != endpoint.method() {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, endpoint.method())],
            "Method Not Allowed",
        )
            .into_response();
    }

    // Validation and existence are checked before anything is spawned
    let repo = match state.store.resolve(org, name) {
        Ok(repo) => repo,
        Err(e) => {
            debug!("Rejecting {} {}: {}", method, uri.path(), e);
            return (store_error_status(&e), e.to_string()).into_response();
        }
    };

    let query = uri.query().unwrap_or("");
    let service = match endpoint {
        Endpoint::InfoRefs => match Service::from_query(query) {
            Some(service) => service,
            None => return (StatusCode::BAD_REQUEST, "Unknown service").into_response(),
        },
        Endpoint::Rpc(service) => service,
    };

    if service == Service::ReceivePack && !state.options.allow_push {
        return (StatusCode::FORBIDDEN, "Push over HTTP is disabled").into_response();
    }

    let body = match to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            debug!("Request body for {}/{} rejected: {}", repo.org, repo.name, e);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
        }
    };

    let mut request = CgiRequest::new(
        state.store.root(),
        method.as_str(),
        CgiRequest::path_info_for(&repo.org, &repo.name, rest),
    );
    request.query_string = query.to_string();
    request.content_type = header_string(&headers, header::CONTENT_TYPE);
    request.content_encoding = header_string(&headers, header::CONTENT_ENCODING);
    request.git_protocol = header_string(&headers, GIT_PROTOCOL_HEADER);
    request.remote_addr = connect_info.map(|ConnectInfo(addr)| addr.ip());
    request.pusher = requester.pusher;
    request.body = body.into();

    match state.backend.invoke(request).await {
        Ok(response) => {
            debug!(
                "{} {}/{} -> {} ({} bytes)",
                service.as_str(),
                repo.org,
                repo.name,
                response.status,
                response.body.len()
            );
            into_http_response(response)
        }
        Err(e) => backend_error_response(&e, state.options.expose_backend_errors),
    }
}

/// Turn a parsed CGI response into the HTTP response, body untouched
pub fn into_http_response(cgi: CgiResponse) -> Response {
    let status = StatusCode::from_u16(cgi.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(cgi.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (key, value) in cgi.headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("Dropping invalid backend header {:?}: {:?}", key, value),
        }
    }

    response
}

fn backend_error_response(e: &BackendError, expose: bool) -> Response {
    let status = match e {
        BackendError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
        BackendError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        BackendError::BackendUnavailable(_)
        | BackendError::BackendFailure { .. }
        | BackendError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!("Protocol backend error: {}", e);

    let body = if expose {
        e.to_string()
    } else {
        status
            .canonical_reason()
            .unwrap_or("Internal Server Error")
            .to_string()
    };
    (status, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_repo_path() {
        assert_eq!(
            parse_repo_path("/gov/portal.git/info/refs"),
            Some(("gov", "portal", "info/refs"))
        );
        assert_eq!(
            parse_repo_path("/gov/portal.git/git-receive-pack"),
            Some(("gov", "portal", "git-receive-pack"))
        );
        assert_eq!(parse_repo_path("/gov/portal/info/refs"), None);
        assert_eq!(parse_repo_path("/gov/portal.git"), None);
        assert_eq!(parse_repo_path("/"), None);
        assert_eq!(parse_repo_path("gov/portal.git/info/refs"), None);
    }

    #[test]
    fn test_into_http_response_status_and_headers() {
        let response = into_http_response(CgiResponse {
            status: 404,
            headers: vec![
                ("Expires".into(), "Fri, 01 Jan 1980 00:00:00 GMT".into()),
                ("Bad Header".into(), "x".into()),
            ],
            body: Vec::new(),
        });
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(header::EXPIRES));
        assert_eq!(response.headers().len(), 1);
    }

    #[test]
    fn test_backend_error_statuses() {
        let unavailable = BackendError::BackendUnavailable("git: not found".into());
        assert_eq!(
            backend_error_response(&unavailable, true).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            backend_error_response(&BackendError::MalformedResponse("x".into()), false).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            backend_error_response(&BackendError::Timeout(Duration::from_secs(30)), false).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
