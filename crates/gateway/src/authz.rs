//! Batch authorization responder: late-binding authorization queries from
//! the indexer.
//!
//! POST-only. The SOAP envelope parsing and response rendering go through
//! the black-box SAML codec; this module owns the semantics: one shared
//! subject per batch, resource URLs decoded to docids where they belong to
//! this server, one `is_user_authorized` call for the union, and
//! `Indeterminate` for everything unknown.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

use sb_domain::authz::{AuthzStatus, UserIdentity};
use sb_domain::docid::DocId;
use sb_domain::saml::AuthzDecision;

use crate::state::AppState;

pub const AUTHZ_PATH: &str = "/saml-authz";

pub async fn respond(State(state): State<AppState>, body: String) -> Response {
    let queries = match state.saml_authz.parse_queries(&body) {
        Ok(queries) => queries,
        Err(err) => {
            tracing::warn!(error = %err, "unparseable authorization batch");
            return (StatusCode::BAD_REQUEST, "unparseable authorization batch").into_response();
        }
    };
    if queries.is_empty() {
        return (StatusCode::BAD_REQUEST, "no authorization queries").into_response();
    }

    // Every query in the batch must carry the same subject.
    let subject = queries[0].subject.clone();
    if queries.iter().any(|q| q.subject != subject) {
        tracing::warn!("authorization batch mixes subjects; failing the whole request");
        return (StatusCode::BAD_REQUEST, "mixed subjects in one batch").into_response();
    }

    // Decode in-scope resources to docids; everything else stays unknown.
    let mut doc_ids: Vec<DocId> = Vec::new();
    let decoded: Vec<Option<DocId>> = queries
        .iter()
        .map(|query| {
            let url = Url::parse(&query.resource).ok()?;
            if !state.codec.is_our_url(&url) {
                return None;
            }
            let id = state.codec.decode(&url).ok()?;
            if !doc_ids.contains(&id) {
                doc_ids.push(id.clone());
            }
            Some(id)
        })
        .collect();

    let answers: HashMap<DocId, AuthzStatus> = if doc_ids.is_empty() {
        HashMap::new()
    } else {
        let identity = UserIdentity::new(subject);
        match state.adaptor.is_user_authorized(&identity, &doc_ids).await {
            Ok(answers) => answers,
            Err(err) => {
                tracing::error!(error = %err, "adaptor failed the authorization batch");
                return (StatusCode::INTERNAL_SERVER_ERROR, "authorization failed").into_response();
            }
        }
    };

    let decisions: Vec<AuthzDecision> = queries
        .into_iter()
        .zip(decoded)
        .map(|(query, doc_id)| {
            let status = doc_id
                .and_then(|id| answers.get(&id).copied())
                .unwrap_or(AuthzStatus::Indeterminate);
            AuthzDecision { query, status }
        })
        .collect();

    match state.saml_authz.render_decisions(&decisions) {
        Ok(xml) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/xml")],
            xml,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "cannot render authorization response");
            (StatusCode::INTERNAL_SERVER_ERROR, "cannot render response").into_response()
        }
    }
}
