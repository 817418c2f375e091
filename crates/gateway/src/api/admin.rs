//! Administrator gate in front of the dashboard: login form, credential
//! check, and the server-rendered status page.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::api::{session_cookie, set_session_cookie};
use crate::state::{AdminAuthenticator, AppState};

/// Credential check against the config-bound admin account.
///
/// The stored secret is a SHA-256 digest; comparison is constant-time, same
/// as the API token gates elsewhere. With no digest configured the
/// dashboard runs open (dev mode) and this authenticator rejects everything
/// so a stray login form cannot mint admin sessions.
pub struct ConfigAdminAuthenticator {
    username: String,
    password_sha256: Option<Vec<u8>>,
}

impl ConfigAdminAuthenticator {
    pub fn new(username: String, password_sha256_hex: Option<&str>) -> Self {
        let password_sha256 = password_sha256_hex.and_then(|raw| hex::decode(raw).ok());
        Self {
            username,
            password_sha256,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.password_sha256.is_some()
    }
}

impl AdminAuthenticator for ConfigAdminAuthenticator {
    fn validate(&self, username: &str, password: &str) -> bool {
        let Some(expected) = &self.password_sha256 else {
            return false;
        };
        let provided = Sha256::digest(password.as_bytes());
        username == self.username && bool::from(provided.ct_eq(expected.as_slice()))
    }
}

/// Whether the presented request belongs to an admin session (or the gate
/// is disabled entirely).
fn is_admin(state: &AppState, headers: &HeaderMap) -> bool {
    if state.config.admin.password_sha256.is_none() {
        return true;
    }
    session_cookie(headers)
        .and_then(|id| state.sessions.with_session(id, |s| s.admin))
        .unwrap_or(false)
}

pub async fn index() -> Redirect {
    Redirect::to("/dashboard")
}

pub async fn dashboard(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !is_admin(&state, &headers) {
        return Html(login_page("")).into_response();
    }

    // Ensure the RPC token exists for the page's scripts.
    let presented = session_cookie(&headers);
    let (session_id, created) = state.sessions.resolve(presented);
    let xsrf = state
        .sessions
        .with_session(&session_id, |s| {
            s.xsrf_token
                .get_or_insert_with(|| uuid::Uuid::new_v4().simple().to_string())
                .clone()
        })
        .unwrap_or_default();

    let statuses = state.monitor.retrieve_all();
    let snapshot = state.journal.snapshot();

    let status_html: String = statuses
        .iter()
        .map(|s| {
            format!(
                "<li><strong>{}</strong> — {:?}{}</li>",
                s.source,
                s.status.code,
                s.status
                    .message
                    .as_deref()
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let push_html = match snapshot.last_full_push {
        Some((at, outcome)) => format!("{outcome} at {at}"),
        None => "never".to_owned(),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="xsrf-token" content="{xsrf}">
<title>SearchBridge Dashboard</title>
<style>
  body {{ font-family: system-ui, sans-serif; max-width: 900px; margin: 2rem auto; padding: 0 1rem; }}
  h2 {{ border-bottom: 1px solid #ccc; padding-bottom: 0.3em; margin-top: 2em; }}
  .card {{ border: 1px solid #ddd; border-radius: 6px; padding: 1rem; margin: 0.5rem 0; }}
</style>
</head>
<body>
<h1>SearchBridge Dashboard</h1>

<h2>Status</h2>
<div class="card"><ul>{status_html}</ul></div>

<h2>Feed push</h2>
<div class="card">
<p>Last full push: {push_html}</p>
<p>Docids pushed: {pushed_total} ({pushed_unique} unique)</p>
</div>

<h2>Serving</h2>
<div class="card">
<p>Indexer requests: {gsa_total} ({gsa_unique} unique docids)</p>
<p>Other requests: {other_total} ({other_unique} unique docids)</p>
<p>In flight now: {in_flight}</p>
</div>
</body>
</html>"#,
        pushed_total = snapshot.pushed.total,
        pushed_unique = snapshot.pushed.unique,
        gsa_total = snapshot.indexer_requests.total,
        gsa_unique = snapshot.indexer_requests.unique,
        other_total = snapshot.other_requests.total,
        other_unique = snapshot.other_requests.unique,
        in_flight = snapshot.in_flight_requests,
    );

    let mut response = Html(html).into_response();
    if created {
        if let Ok(value) = set_session_cookie(&session_id, state.config.server.secure).parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    if !state.admin_auth.validate(&form.username, &form.password) {
        tracing::warn!(username = %form.username, "dashboard login rejected");
        return (StatusCode::FORBIDDEN, Html(login_page("Invalid credentials."))).into_response();
    }

    let presented = session_cookie(&headers);
    let (session_id, created) = state.sessions.resolve(presented);
    let _ = state.sessions.with_session(&session_id, |s| {
        s.admin = true;
        s.xsrf_token
            .get_or_insert_with(|| uuid::Uuid::new_v4().simple().to_string());
    });
    tracing::info!(username = %form.username, "administrator logged in");

    let mut response = Redirect::to("/dashboard").into_response();
    if created {
        if let Ok(value) = set_session_cookie(&session_id, state.config.server.secure).parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

fn login_page(error: &str) -> String {
    let error_html = if error.is_empty() {
        String::new()
    } else {
        format!("<p class=\"error\">{error}</p>")
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>SearchBridge Login</title>
<style>
  body {{ font-family: system-ui, sans-serif; max-width: 360px; margin: 4rem auto; }}
  label {{ display: block; margin-top: 1em; }}
  .error {{ color: #b00; }}
</style>
</head>
<body>
<h1>SearchBridge</h1>
{error_html}
<form method="post" action="/login">
  <label>Username <input name="username" autocomplete="username"></label>
  <label>Password <input name="password" type="password" autocomplete="current-password"></label>
  <button type="submit">Log in</button>
</form>
</body>
</html>"#
    )
}
