//! Dashboard RPC endpoint: JSON-RPC-shaped methods over the journal, the
//! status monitor, and the push engine. XSRF-protected by a header-echoed
//! per-session token.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::session_cookie;
use crate::state::AppState;

pub const XSRF_HEADER: &str = "x-xsrf-token";

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub id: Value,
}

pub async fn rpc(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RpcRequest>,
) -> Response {
    // ── Session + admin gate ─────────────────────────────────────────
    let admin_required = state.config.admin.password_sha256.is_some();
    let Some(session_id) = session_cookie(&headers).map(str::to_owned) else {
        return session_missing();
    };
    let session = state
        .sessions
        .with_session(&session_id, |s| (s.admin, s.xsrf_token.clone()));
    let Some((is_admin, xsrf_token)) = session else {
        return session_missing();
    };
    if admin_required && !is_admin {
        return session_missing();
    }

    // ── XSRF: the caller must echo the session's token ───────────────
    let expected = match xsrf_token {
        Some(token) => token,
        None => {
            // Mint on demand so the client can fetch and retry.
            state
                .sessions
                .with_session(&session_id, |s| {
                    s.xsrf_token
                        .get_or_insert_with(|| uuid::Uuid::new_v4().simple().to_string())
                        .clone()
                })
                .unwrap_or_default()
        }
    };
    let echoed = headers
        .get(XSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if echoed != expected {
        return (
            StatusCode::CONFLICT,
            [(XSRF_HEADER, expected)],
            Json(json!({
                "error": format!("echo the security token in the {XSRF_HEADER} header and retry"),
            })),
        )
            .into_response();
    }

    // ── Dispatch ─────────────────────────────────────────────────────
    let result = match request.method.as_str() {
        "getStatus" => json!(state.monitor.retrieve_all()),
        "getStats" => json!(state.journal.snapshot()),
        "getConfig" => config_summary(&state),
        "getSessionCount" => json!(state.sessions.len()),
        "startFeedPush" => {
            if state.runner.is_running() {
                json!({ "started": false, "reason": "a full push is already in progress" })
            } else {
                let runner = state.runner.clone();
                tokio::spawn(async move {
                    runner.run_full_push().await;
                });
                json!({ "started": true })
            }
        }
        unknown => {
            return Json(json!({
                "id": request.id,
                "error": format!("unknown method {unknown:?}"),
            }))
            .into_response();
        }
    };

    Json(json!({ "id": request.id, "result": result })).into_response()
}

fn session_missing() -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": "no dashboard session; log in at /dashboard first",
        })),
    )
        .into_response()
}

/// The recognized key set with secrets left out.
fn config_summary(state: &AppState) -> Value {
    let config = &state.config;
    json!({
        "server.hostname": config.server.hostname,
        "server.port": config.server.port,
        "server.dashboardPort": config.server.effective_dashboard_port(),
        "server.docIdPath": config.server.doc_id_path,
        "server.secure": config.server.secure,
        "server.keyAlias": config.server.key_alias,
        "server.gsaIps": config.server.gsa_ips,
        "gsa.hostname": config.gsa.hostname,
        "gsa.characterEncoding": config.gsa.character_encoding,
        "docId.isUrl": config.docid.is_url,
        "feed.name": config.feed.name,
        "feed.noRecrawlBitEnabled": config.feed.no_recrawl_bit_enabled,
        "feed.crawlImmediatelyBitEnabled": config.feed.crawl_immediately_bit_enabled,
        "feed.maxUrls": config.feed.max_urls,
        "adaptor.fullListingSchedule": config.adaptor.full_listing_schedule,
        "adaptor.incrementalPollPeriodMillis": config.adaptor.incremental_poll_period_millis,
    })
}
