//! Authentication and batch-authorization flows through the docs router,
//! with fake SAML interfaces standing in for the wire library.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use sb_domain::adaptor::Adaptor;
use sb_domain::config::Config;
use sb_domain::docid::DocIdCodec;
use sb_domain::saml::{
    AuthnRequest, AuthnVerdict, AuthzDecision, AuthzQuery, SamlAuthzCodec, SamlIdentityProvider,
};
use sb_feed::{BatchingPusher, DefaultListingErrorHandler, FeedSender, ManifestMaker, PushRunner};
use sb_gateway::api;
use sb_gateway::api::admin::ConfigAdminAuthenticator;
use sb_gateway::fs_adaptor::FsAdaptor;
use sb_gateway::state::AppState;
use sb_journal::status::StatusMonitor;
use sb_journal::Journal;
use sb_sessions::SessionStore;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fake SAML stack
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct FakeIdp;

#[async_trait]
impl SamlIdentityProvider for FakeIdp {
    fn begin_authn(&self, original_uri: &str) -> sb_domain::Result<AuthnRequest> {
        let redirect_location = url::Url::parse_with_params(
            "https://idp.test/sso",
            [("RelayState", original_uri)],
        )
        .map_err(|e| sb_domain::Error::Saml(e.to_string()))?;
        Ok(AuthnRequest { redirect_location })
    }

    async fn consume_assertion(&self, raw_query: &str) -> sb_domain::Result<AuthnVerdict> {
        match raw_query {
            "outcome=ok" => Ok(AuthnVerdict::Success {
                principal: "alice".into(),
                groups: BTreeSet::from(["eng".to_owned()]),
                expires_at: None,
            }),
            _ => Ok(AuthnVerdict::Failure {
                reason: "status != success".into(),
            }),
        }
    }
}

/// Line-oriented stand-in for the SOAP envelope: `id subject resource` per
/// query in, `id:STATUS` per decision out.
struct LineAuthzCodec;

impl SamlAuthzCodec for LineAuthzCodec {
    fn parse_queries(&self, body: &str) -> sb_domain::Result<Vec<AuthzQuery>> {
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let mut parts = line.splitn(3, ' ');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(id), Some(subject), Some(resource)) => Ok(AuthzQuery {
                        id: id.to_owned(),
                        subject: subject.to_owned(),
                        resource: resource.to_owned(),
                    }),
                    _ => Err(sb_domain::Error::Saml(format!("bad query line {line:?}"))),
                }
            })
            .collect()
    }

    fn render_decisions(&self, decisions: &[AuthzDecision]) -> sb_domain::Result<String> {
        Ok(decisions
            .iter()
            .map(|d| format!("{}:{}", d.query.id, d.status))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn secure_state(content_root: &std::path::Path) -> AppState {
    let mut config = Config::default();
    config.server.hostname = Some("localhost".into());
    config.server.secure = true;
    config.gsa.hostname = Some("gsa.test".into());
    let config = Arc::new(config);

    let base = config.server.base_url("localhost").unwrap();
    let codec = Arc::new(DocIdCodec::new(base, "/doc/", false).unwrap());
    let journal = Arc::new(Journal::new());
    let adaptor: Arc<dyn Adaptor> = Arc::new(FsAdaptor::new(content_root));
    let shutdown = CancellationToken::new();

    let sender = Arc::new(FeedSender::new("gsa.test", true).unwrap());
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
        saml_idp: Arc::new(FakeIdp),
        saml_authz: Arc::new(LineAuthzCodec),
        admin_auth: Arc::new(ConfigAdminAuthenticator::new("admin".into(), None)),
        gsa_ips: Arc::new(vec!["192.0.2.7".parse().unwrap()]),
        shutdown,
    }
}

fn request(method: &str, path: &str, from: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::HOST, "localhost:5678")
        .body(Body::empty())
        .unwrap();
    let addr: SocketAddr = format!("{from}:44444").parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn with_cookie(mut req: Request<Body>, cookie: &str) -> Request<Body> {
    req.headers_mut().insert(
        header::COOKIE,
        format!("sessid={cookie}").parse().unwrap(),
    );
    req
}

fn session_cookie_of(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .trim_start_matches("sessid=")
        .to_owned()
}

fn location_of(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .unwrap()
        .to_owned()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Authentication flow
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn end_user_walks_the_full_authn_loop() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    let app = api::docs_router().with_state(secure_state(dir.path()));

    // 1. Anonymous request: bounced into the authn entry point, session
    //    minted.
    let first = app
        .clone()
        .oneshot(request("GET", "/doc/a.txt", "10.0.0.9"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::FOUND);
    let entry = location_of(&first);
    assert!(entry.starts_with("/samlip?returnPath="), "{entry}");
    let cookie = session_cookie_of(&first);

    // 2. The entry point builds the AuthnRequest and redirects to the IdP.
    let initiated = app
        .clone()
        .oneshot(with_cookie(request("GET", &entry, "10.0.0.9"), &cookie))
        .await
        .unwrap();
    assert_eq!(initiated.status(), StatusCode::FOUND);
    let idp = location_of(&initiated);
    assert!(idp.starts_with("https://idp.test/sso"), "{idp}");
    assert!(idp.contains("RelayState"));

    // 3. Assertion consumer with a successful assertion: back to the doc.
    let consumed = app
        .clone()
        .oneshot(with_cookie(
            request("GET", "/samlassertionconsumer?outcome=ok", "10.0.0.9"),
            &cookie,
        ))
        .await
        .unwrap();
    assert_eq!(consumed.status(), StatusCode::FOUND);
    assert_eq!(location_of(&consumed), "https://localhost:5678/doc/a.txt");

    // 4. Authenticated request serves the document.
    let served = app
        .oneshot(with_cookie(request("GET", "/doc/a.txt", "10.0.0.9"), &cookie))
        .await
        .unwrap();
    assert_eq!(served.status(), StatusCode::OK);
}

#[tokio::test]
async fn bad_assertion_resets_the_flow_with_403() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    let app = api::docs_router().with_state(secure_state(dir.path()));

    let first = app
        .clone()
        .oneshot(request("GET", "/doc/a.txt", "10.0.0.9"))
        .await
        .unwrap();
    let cookie = session_cookie_of(&first);
    let entry = location_of(&first);
    let initiated = app
        .clone()
        .oneshot(with_cookie(request("GET", &entry, "10.0.0.9"), &cookie))
        .await
        .unwrap();
    assert_eq!(initiated.status(), StatusCode::FOUND);

    let consumed = app
        .clone()
        .oneshot(with_cookie(
            request("GET", "/samlassertionconsumer?outcome=denied", "10.0.0.9"),
            &cookie,
        ))
        .await
        .unwrap();
    assert_eq!(consumed.status(), StatusCode::FORBIDDEN);

    // The machine is back at the start: the next request redirects again.
    let again = app
        .oneshot(with_cookie(request("GET", "/doc/a.txt", "10.0.0.9"), &cookie))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::FOUND);
    assert!(location_of(&again).starts_with("/samlip?returnPath="));
}

#[tokio::test]
async fn consumer_without_a_pending_flow_is_403() {
    let dir = tempfile::tempdir().unwrap();
    let app = api::docs_router().with_state(secure_state(dir.path()));
    let response = app
        .oneshot(request("GET", "/samlassertionconsumer?outcome=ok", "10.0.0.9"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn whitelisted_indexer_skips_authentication() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    let app = api::docs_router().with_state(secure_state(dir.path()));

    // By IP whitelist.
    let by_ip = app
        .clone()
        .oneshot(request("GET", "/doc/a.txt", "192.0.2.7"))
        .await
        .unwrap();
    assert_eq!(by_ip.status(), StatusCode::OK);

    // By crawler user agent.
    let mut req = request("GET", "/doc/a.txt", "10.0.0.9");
    req.headers_mut().insert(
        header::USER_AGENT,
        "gsa-crawler (Enterprise; T4-ABC123; nobody@example.com)"
            .parse()
            .unwrap(),
    );
    let by_ua = app.oneshot(req).await.unwrap();
    assert_eq!(by_ua.status(), StatusCode::OK);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Batch authorization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn authz_request(body: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri("/saml-authz")
        .header(header::HOST, "localhost:5678")
        .body(Body::from(body.to_owned()))
        .unwrap();
    let addr: SocketAddr = "192.0.2.7:44444".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn in_scope_resources_are_decided_and_foreign_ones_stay_indeterminate() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    let app = api::docs_router().with_state(secure_state(dir.path()));

    // FsAdaptor permits everything it is asked about; the foreign resource
    // never reaches it.
    let body = "q1 alice https://localhost:5678/doc/a.txt\n\
                q2 alice https://other.example.com/doc/b.txt";
    let response = app.oneshot(authz_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rendered = body_string(response).await;
    assert_eq!(rendered, "q1:PERMIT\nq2:INDETERMINATE");
}

#[tokio::test]
async fn mixed_subjects_fail_the_whole_batch() {
    let dir = tempfile::tempdir().unwrap();
    let app = api::docs_router().with_state(secure_state(dir.path()));
    let body = "q1 alice https://localhost:5678/doc/a.txt\n\
                q2 bob https://localhost:5678/doc/a.txt";
    let response = app.oneshot(authz_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = api::docs_router().with_state(secure_state(dir.path()));
    let response = app.oneshot(authz_request("")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
