//! SAML authentication orchestration: the assertion-consumer endpoint.
//!
//! Initiation lives in the document handler (an unauthenticated end-user
//! request redirects to the identity provider); this endpoint receives the
//! artifact-binding response, validates it through the black-box SAML
//! interface, and transitions the session's state machine under the session
//! lock.

use axum::extract::{Query, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use sb_sessions::AssertionOutcome;

use crate::api::{session_cookie, set_session_cookie};
use crate::state::AppState;

pub const AUTHN_ENTRY_PATH: &str = "/samlip";
pub const ASSERTION_CONSUMER_PATH: &str = "/samlassertionconsumer";

#[derive(Debug, Deserialize)]
pub struct InitiateParams {
    /// Absolute URL the user agent was originally after.
    #[serde(rename = "returnPath")]
    pub return_path: String,
}

/// Authentication entry point: builds the signed AuthnRequest, moves the
/// session to `Pending`, and sends the user agent to the identity provider.
pub async fn initiate(
    State(state): State<AppState>,
    Query(params): Query<InitiateParams>,
    headers: HeaderMap,
) -> Response {
    let presented = session_cookie(&headers);
    let (session_id, created) = state.sessions.resolve(presented);

    let request = match state.saml_idp.begin_authn(&params.return_path) {
        Ok(request) => request,
        Err(err) => {
            tracing::error!(error = %err, "cannot build an AuthnRequest");
            return (StatusCode::FORBIDDEN, "authentication unavailable").into_response();
        }
    };
    let _ = state.sessions.with_session(&session_id, |s| {
        s.authn.start(params.return_path.clone());
    });

    let mut response = (
        StatusCode::FOUND,
        [(header::LOCATION, request.redirect_location.to_string())],
        "redirecting to the identity provider",
    )
        .into_response();
    if created {
        if let Ok(value) = set_session_cookie(&session_id, state.config.server.secure).parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

pub async fn assertion_consumer(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    // No cookie means no pending flow to complete.
    let Some(session_id) = session_cookie(&headers) else {
        return (StatusCode::FORBIDDEN, "no authentication in progress").into_response();
    };
    let session_id = session_id.to_owned();

    let is_pending = state
        .sessions
        .with_session(&session_id, |s| s.authn.is_pending())
        .unwrap_or(false);
    if !is_pending {
        return (StatusCode::FORBIDDEN, "no authentication in progress").into_response();
    }

    let verdict = match state
        .saml_idp
        .consume_assertion(query.as_deref().unwrap_or(""))
        .await
    {
        Ok(verdict) => verdict,
        Err(err) => {
            tracing::warn!(error = %err, "assertion validation failed");
            // Validation failure resets the machine like any bad assertion.
            let _ = state
                .sessions
                .with_session(&session_id, |s| s.authn.fail());
            return (StatusCode::FORBIDDEN, "invalid assertion").into_response();
        }
    };

    let outcome = state
        .sessions
        .with_session(&session_id, |s| s.authn.consume(verdict));
    match outcome {
        Some(AssertionOutcome::Redirect { original_uri }) => {
            tracing::debug!("assertion accepted; returning the user agent");
            (
                StatusCode::FOUND,
                [(header::LOCATION, original_uri)],
                "authenticated",
            )
                .into_response()
        }
        Some(AssertionOutcome::Rejected) | None => {
            (StatusCode::FORBIDDEN, "invalid assertion").into_response()
        }
    }
}
