//! End-to-end handler tests through the real routers: document serving,
//! conditional GET, HEAD, and the dashboard session/XSRF gate.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use sb_domain::adaptor::Adaptor;
use sb_domain::config::Config;
use sb_domain::docid::DocIdCodec;
use sb_domain::saml::UnconfiguredSaml;
use sb_feed::{BatchingPusher, DefaultListingErrorHandler, FeedSender, ManifestMaker, PushRunner};
use sb_gateway::api;
use sb_gateway::api::admin::ConfigAdminAuthenticator;
use sb_gateway::fs_adaptor::FsAdaptor;
use sb_gateway::state::AppState;
use sb_journal::status::StatusMonitor;
use sb_journal::Journal;
use sb_sessions::SessionStore;
use tokio_util::sync::CancellationToken;

fn test_state(content_root: &std::path::Path) -> AppState {
    let mut config = Config::default();
    config.server.hostname = Some("localhost".into());
    config.gsa.hostname = Some("gsa.test".into());
    let config = Arc::new(config);

    let base = config.server.base_url("localhost").unwrap();
    let codec = Arc::new(DocIdCodec::new(base, "/doc/", false).unwrap());
    let journal = Arc::new(Journal::new());
    let adaptor: Arc<dyn Adaptor> = Arc::new(FsAdaptor::new(content_root));
    let shutdown = CancellationToken::new();

    let sender = Arc::new(FeedSender::new("gsa.test", false).unwrap());
    let pusher = Arc::new(BatchingPusher::new(
        sender,
        ManifestMaker::new(&config),
        codec.clone(),
        journal.clone(),
        config.feed.max_urls,
        shutdown.clone(),
    ));
    let runner = Arc::new(PushRunner::new(
        adaptor.clone(),
        pusher,
        journal.clone(),
        Arc::new(DefaultListingErrorHandler::default()),
        shutdown.clone(),
    ));

    AppState {
        config: config.clone(),
        adaptor,
        codec,
        journal,
        monitor: Arc::new(StatusMonitor::new()),
        sessions: Arc::new(SessionStore::new(
            chrono::Duration::minutes(30),
            chrono::Duration::minutes(5),
        )),
        runner,
        saml_idp: Arc::new(UnconfiguredSaml),
        saml_authz: Arc::new(UnconfiguredSaml),
        admin_auth: Arc::new(ConfigAdminAuthenticator::new("admin".into(), None)),
        gsa_ips: Arc::new(Vec::new()),
        shutdown,
    }
}

fn doc_request(method: &str, path: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::HOST, "localhost:5678")
        .body(Body::empty())
        .unwrap();
    let addr: SocketAddr = "10.1.2.3:50000".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn get_serves_document_bytes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    let app = api::docs_router().with_state(test_state(dir.path()));

    let response = app.oneshot(doc_request("GET", "/doc/a.txt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain"
    );
    assert_eq!(body_bytes(response).await, b"alpha");
}

#[tokio::test]
async fn unknown_docid_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = api::docs_router().with_state(test_state(dir.path()));

    let response = app
        .clone()
        .oneshot(doc_request("GET", "/doc/absent.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // URLs outside the docid namespace are foreign.
    let response = app.oneshot(doc_request("GET", "/elsewhere")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fresh_if_modified_since_yields_304() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    let app = api::docs_router().with_state(test_state(dir.path()));

    let mut request = doc_request("GET", "/doc/a.txt");
    request.headers_mut().insert(
        header::IF_MODIFIED_SINCE,
        "Mon, 01 Jan 2596 00:00:00 GMT".parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn head_matches_get_headers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    let state = test_state(dir.path());
    let app = api::docs_router().with_state(state);

    let get = app
        .clone()
        .oneshot(doc_request("GET", "/doc/a.txt"))
        .await
        .unwrap();
    let head = app.oneshot(doc_request("HEAD", "/doc/a.txt")).await.unwrap();
    assert_eq!(head.status(), StatusCode::OK);
    assert_eq!(
        head.headers().get(header::CONTENT_TYPE),
        get.headers().get(header::CONTENT_TYPE)
    );
    assert_eq!(
        head.headers().get(header::LAST_MODIFIED),
        get.headers().get(header::LAST_MODIFIED)
    );
}

#[tokio::test]
async fn mutating_methods_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = api::docs_router().with_state(test_state(dir.path()));
    let response = app.oneshot(doc_request("POST", "/doc/a.txt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dashboard gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn rpc_request(cookie: Option<&str>, token: Option<&str>, method: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/rpc")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, format!("sessid={cookie}"));
    }
    if let Some(token) = token {
        builder = builder.header("x-xsrf-token", token);
    }
    builder
        .body(Body::from(format!(
            "{{\"method\":\"{method}\",\"id\":1}}"
        )))
        .unwrap()
}

fn cookie_from(response: &axum::response::Response) -> String {
    let raw = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap();
    raw.split(';')
        .next()
        .unwrap()
        .trim_start_matches("sessid=")
        .to_owned()
}

#[tokio::test]
async fn rpc_without_session_is_409() {
    let dir = tempfile::tempdir().unwrap();
    let app = api::dashboard_router().with_state(test_state(dir.path()));
    let response = app
        .oneshot(rpc_request(None, None, "getStatus"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn rpc_requires_the_echoed_xsrf_token() {
    let dir = tempfile::tempdir().unwrap();
    let app = api::dashboard_router().with_state(test_state(dir.path()));

    // The dashboard page (open in dev mode) mints the session + token.
    let page = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/dashboard")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let cookie = cookie_from(&page);

    // Without the token: 409 carrying the expected token in the header.
    let refused = app
        .clone()
        .oneshot(rpc_request(Some(&cookie), None, "getSessionCount"))
        .await
        .unwrap();
    assert_eq!(refused.status(), StatusCode::CONFLICT);
    let token = refused
        .headers()
        .get("x-xsrf-token")
        .expect("expected token header")
        .to_str()
        .unwrap()
        .to_owned();

    // Echoing the token succeeds.
    let accepted = app
        .oneshot(rpc_request(Some(&cookie), Some(&token), "getSessionCount"))
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
    let body = body_bytes(accepted).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["result"], serde_json::json!(1));
}
