//! Shared application state passed to all handlers and runtime loops.

use std::net::IpAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use sb_domain::adaptor::Adaptor;
use sb_domain::config::Config;
use sb_domain::docid::DocIdCodec;
use sb_domain::saml::{SamlAuthzCodec, SamlIdentityProvider};
use sb_feed::PushRunner;
use sb_journal::status::StatusMonitor;
use sb_journal::Journal;
use sb_sessions::SessionStore;

/// Validates dashboard credentials. The gate itself never sees how.
pub trait AdminAuthenticator: Send + Sync {
    fn validate(&self, username: &str, password: &str) -> bool;
}

/// Shared application state.
///
/// Fields are grouped by concern:
/// - **Core services**: config, the adaptor, the docid codec
/// - **Serving**: journal, status monitor, sessions
/// - **Push**: the full-push runner
/// - **Security**: SAML interfaces, admin authenticator, indexer whitelist
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub adaptor: Arc<dyn Adaptor>,
    pub codec: Arc<DocIdCodec>,

    // ── Serving ───────────────────────────────────────────────────────
    pub journal: Arc<Journal>,
    pub monitor: Arc<StatusMonitor>,
    pub sessions: Arc<SessionStore>,

    // ── Push ──────────────────────────────────────────────────────────
    pub runner: Arc<PushRunner>,

    // ── Security ──────────────────────────────────────────────────────
    pub saml_idp: Arc<dyn SamlIdentityProvider>,
    pub saml_authz: Arc<dyn SamlAuthzCodec>,
    pub admin_auth: Arc<dyn AdminAuthenticator>,
    /// Indexer addresses served without per-user authorization
    /// (`server.gsaIps`), parsed once at startup.
    pub gsa_ips: Arc<Vec<IpAddr>>,

    // ── Lifecycle ─────────────────────────────────────────────────────
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn is_indexer_ip(&self, addr: IpAddr) -> bool {
        self.gsa_ips.contains(&addr)
    }
}
