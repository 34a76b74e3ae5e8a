use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use crate::storage::RepoStore;
use gitgate_git::ProtocolBackend;
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RepoStore>,
    pub backend: Arc<dyn ProtocolBackend>,
    pub options: GatewayOptions,
    /// Ceiling for a smart HTTP request body, applied once the request is accepted
    pub max_body_bytes: usize,
}

/// Per-deployment gateway policy
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// When false, receive-pack is refused before the backend runs
    pub allow_push: bool,
    /// Header the pusher identity is read from
    pub pusher_header: String,
    /// Put backend stderr into 5xx bodies
    pub expose_backend_errors: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            allow_push: true,
            pusher_header: "X-Pusher-Name".to_string(),
            expose_backend_errors: true,
        }
    }
}

/// Who is making the request, as far as the transport can tell.
///
/// There is no authentication: the identity is taken at face value from the
/// pusher header, or from the user part of HTTP Basic credentials. It is only
/// used to label push log entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequesterContext {
    pub pusher: Option<String>,
}

impl RequesterContext {
    pub fn from_headers(headers: &HeaderMap, pusher_header: &str) -> Self {
        let from_header = headers
            .get(pusher_header)
            .and_then(|v| v.to_str().ok())
            .and_then(sanitize);

        let pusher = from_header.or_else(|| basic_auth_user(headers).and_then(|u| sanitize(&u)));
        Self { pusher }
    }
}

/// User name from `Authorization: Basic ...`, unverified
fn basic_auth_user(headers: &HeaderMap) -> Option<String> {
    use base64::Engine;

    let credentials = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(credentials.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let user = decoded.split_once(':').map(|(u, _)| u).unwrap_or(&decoded);
    Some(user.to_string())
}

/// Identities end up as a single line in push.log
fn sanitize(value: &str) -> Option<String> {
    let cleaned: String = value.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for RequesterContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers, &state.options.pusher_header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn test_pusher_from_header() {
        let ctx = RequesterContext::from_headers(&headers(&[("x-pusher-name", "alice")]), "X-Pusher-Name");
        assert_eq!(ctx.pusher.as_deref(), Some("alice"));
    }

    #[test]
    fn test_pusher_from_basic_auth() {
        // "bob:secret"
        let ctx = RequesterContext::from_headers(
            &headers(&[("authorization", "Basic Ym9iOnNlY3JldA==")]),
            "X-Pusher-Name",
        );
        assert_eq!(ctx.pusher.as_deref(), Some("bob"));
    }

    #[test]
    fn test_header_wins_over_basic_auth() {
        let ctx = RequesterContext::from_headers(
            &headers(&[
                ("x-pusher-name", "alice"),
                ("authorization", "Basic Ym9iOnNlY3JldA=="),
            ]),
            "X-Pusher-Name",
        );
        assert_eq!(ctx.pusher.as_deref(), Some("alice"));
    }

    #[test]
    fn test_no_identity() {
        assert_eq!(
            RequesterContext::from_headers(&HeaderMap::new(), "X-Pusher-Name"),
            RequesterContext::default()
        );
        let ctx = RequesterContext::from_headers(
            &headers(&[("x-pusher-name", "   "), ("authorization", "Bearer abc")]),
            "X-Pusher-Name",
        );
        assert_eq!(ctx.pusher, None);
    }

    #[test]
    fn test_control_characters_stripped() {
        assert_eq!(sanitize("eve\tmallory").as_deref(), Some("evemallory"));
        assert_eq!(sanitize("\u{7f}"), None);
    }
}
