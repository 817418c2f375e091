//! Routers for the two listeners plus the small cookie helpers shared by
//! handlers on both ports.

pub mod admin;
pub mod dashboard;

use axum::http::{header, HeaderMap};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;

use crate::state::AppState;
use crate::{authn, authz, docs};

/// The document port: SAML endpoints plus the catch-all document handler.
/// Responses are gzip-compressed when the client advertises support.
pub fn docs_router() -> Router<AppState> {
    Router::new()
        .route(authn::AUTHN_ENTRY_PATH, get(authn::initiate))
        .route(authn::ASSERTION_CONSUMER_PATH, get(authn::assertion_consumer))
        .route(authz::AUTHZ_PATH, post(authz::respond))
        .fallback(docs::serve_doc)
        .layer(CompressionLayer::new())
}

/// The dashboard port: administrator gate in front of the status pages and
/// the RPC endpoint.
pub fn dashboard_router() -> Router<AppState> {
    Router::new()
        .route("/", get(admin::index))
        .route("/dashboard", get(admin::dashboard))
        .route("/login", post(admin::login))
        .route("/rpc", post(dashboard::rpc))
}

/// Extract the `sessid` cookie from a request.
pub(crate) fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').map(str::trim).find_map(|pair| {
        pair.strip_prefix(sb_sessions::COOKIE_NAME)?
            .strip_prefix('=')
    })
}

/// Render the `Set-Cookie` header for a freshly created session.
pub(crate) fn set_session_cookie(session_id: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={session_id}; Path=/; HttpOnly",
        sb_sessions::COOKIE_NAME
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
