//! The document handler: decodes docids out of request URLs, enforces the
//! authentication/authorization path for end users, honors conditional GET,
//! and streams adaptor content.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, OriginalUri, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use url::Url;

use sb_domain::adaptor::{DocError, DocRequest, DocResponse};
use sb_domain::authz::AuthzStatus;
use sb_domain::docid::DocId;
use sb_journal::{RequestOrigin, RetrievalOutcome};

use crate::api::{session_cookie, set_session_cookie};
use crate::state::AppState;

/// User-agent prefix the indexer's crawler presents.
const CRAWLER_UA_PREFIX: &str = "gsa-crawler";

/// Fallback handler on the docs port: everything that is not a SAML
/// endpoint is treated as a document URL.
pub async fn serve_doc(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return text(StatusCode::METHOD_NOT_ALLOWED, "only GET and HEAD are served");
    }

    // ── Reconstruct the absolute request URL ─────────────────────────
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let Some(url) = reconstruct_url(&state, &headers, path) else {
        return text(StatusCode::BAD_REQUEST, "unparseable request URL");
    };

    let doc_id = match state.codec.decode(&url) {
        Ok(id) => id,
        Err(err) => {
            tracing::debug!(%url, error = %err, "request URL is not a docid");
            return text(StatusCode::NOT_FOUND, "no such document");
        }
    };

    // ── Classify the requester ───────────────────────────────────────
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let origin = if state.is_indexer_ip(remote.ip()) || user_agent.starts_with(CRAWLER_UA_PREFIX)
    {
        RequestOrigin::Indexer
    } else {
        RequestOrigin::Other
    };
    let token = state.journal.request_started(origin, &doc_id, 0);

    // ── Authentication + authorization for end users ─────────────────
    let mut set_cookie: Option<String> = None;
    if state.config.server.secure && origin == RequestOrigin::Other {
        match authenticate(&state, &headers, &url, &mut set_cookie) {
            AuthnDecision::Proceed(identity) => {
                let decision = state
                    .adaptor
                    .is_user_authorized(&identity, std::slice::from_ref(&doc_id))
                    .await;
                let permitted = matches!(
                    decision.as_ref().map(|m| m.get(&doc_id)),
                    Ok(Some(AuthzStatus::Permit))
                );
                if !permitted {
                    state.journal.request_finished(token, 0);
                    return with_cookie(
                        text(StatusCode::FORBIDDEN, "you are not authorized"),
                        set_cookie,
                    );
                }
            }
            AuthnDecision::Redirect(location) => {
                state.journal.request_finished(token, 0);
                let response = (
                    StatusCode::FOUND,
                    [(header::LOCATION, location)],
                    "authentication required",
                )
                    .into_response();
                return with_cookie(response, set_cookie);
            }
        }
    }

    // ── Conditional GET ──────────────────────────────────────────────
    let last_access = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);

    // ── Ask the adaptor ──────────────────────────────────────────────
    let request = DocRequest::new(doc_id.clone(), last_access);
    let mut doc_response = DocResponse::new();
    state.journal.processing_started(token);
    let result = state.adaptor.get_doc_content(&request, &mut doc_response).await;
    state.journal.processing_ended(token);

    let (response, bytes_out) = match result {
        Err(DocError::NotFound) => {
            // Adaptor-signaled absence, not a retriever failure.
            state.journal.record_retrieval(RetrievalOutcome::Ok);
            (text(StatusCode::NOT_FOUND, "no such document"), 0)
        }
        Err(err) => {
            tracing::warn!(doc_id = %doc_id, error = %err, "adaptor failed to produce the document");
            state.journal.record_retrieval(RetrievalOutcome::Error);
            (
                text(StatusCode::INTERNAL_SERVER_ERROR, "failed to retrieve document"),
                0,
            )
        }
        Ok(()) => {
            state.journal.record_retrieval(RetrievalOutcome::Ok);
            let bytes = doc_response.body().len() as u64;
            (render_doc(doc_response), bytes)
        }
    };

    state.journal.request_finished(token, bytes_out);
    with_cookie(response, set_cookie)
}

enum AuthnDecision {
    Proceed(sb_domain::authz::UserIdentity),
    Redirect(String),
}

/// Look up the session's authenticated identity. Without one the caller
/// bounces the user agent into the authentication entry point, carrying the
/// original URL along.
fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    url: &Url,
    set_cookie: &mut Option<String>,
) -> AuthnDecision {
    let presented = session_cookie(headers);
    let (session_id, created) = state.sessions.resolve(presented);
    if created {
        *set_cookie = Some(set_session_cookie(&session_id, state.config.server.secure));
    }

    let identity = state
        .sessions
        .with_session(&session_id, |s| s.authn.identity(Utc::now()))
        .flatten();
    match identity {
        Some(identity) => AuthnDecision::Proceed(identity),
        None => AuthnDecision::Redirect(format!(
            "{}?returnPath={}",
            crate::authn::AUTHN_ENTRY_PATH,
            utf8_percent_encode(url.as_str(), NON_ALPHANUMERIC)
        )),
    }
}

/// Turn the adaptor's buffered response into HTTP.
fn render_doc(doc: DocResponse) -> Response {
    if doc.is_not_modified() {
        return StatusCode::NOT_MODIFIED.into_response();
    }
    if !doc.has_body() {
        // The adaptor violated the contract: no 304, no body, no error.
        tracing::warn!("adaptor produced no response at all");
        return text(StatusCode::INTERNAL_SERVER_ERROR, "empty adaptor response");
    }

    let mut builder = axum::http::Response::builder().status(StatusCode::OK).header(
        header::CONTENT_TYPE,
        doc.content_type().unwrap_or("application/octet-stream"),
    );
    if let Some(modified) = doc.last_modified() {
        builder = builder.header(header::LAST_MODIFIED, http_date(modified));
    }
    if !doc.metadata().is_empty() {
        let encoded = doc
            .metadata()
            .iter()
            .map(|(name, content)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(name, NON_ALPHANUMERIC),
                    utf8_percent_encode(content, NON_ALPHANUMERIC)
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        builder = builder.header("X-Gsa-External-Metadata", encoded);
    }
    builder
        .body(axum::body::Body::from(doc.into_body()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Scheme from the listener, host from the `Host` header (with the
/// configured hostname as the HTTP/1.0 fallback), resolved against the
/// request path.
fn reconstruct_url(state: &AppState, headers: &HeaderMap, path: &str) -> Option<Url> {
    let server = &state.config.server;
    let fallback;
    let host = match headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
        Some(host) => host,
        None => {
            fallback = format!(
                "{}:{}",
                server.hostname.as_deref().unwrap_or("localhost"),
                server.port
            );
            &fallback
        }
    };
    Url::parse(&format!("{}://{host}{path}", server.scheme())).ok()
}

fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn http_date(when: DateTime<Utc>) -> String {
    when.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn text(status: StatusCode, message: &'static str) -> Response {
    (status, message).into_response()
}

fn with_cookie(mut response: Response, set_cookie: Option<String>) -> Response {
    if let Some(cookie) = set_cookie {
        if let Ok(value) = cookie.parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}
