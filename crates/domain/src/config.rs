//! Typed gateway configuration.
//!
//! Loaded from a TOML file; every field has a serde default so a missing file
//! or section still yields a usable config. `-D key=value` command-line
//! overrides use the flat dotted key names (`server.port`, `feed.maxUrls`, …)
//! and are applied after the file is parsed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gsa: GsaConfig,
    #[serde(default)]
    pub docid: DocIdConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub adaptor: AdaptorConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub saml: SamlConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl Config {
    /// Parse `path`. A missing file yields the defaults (the caller decides
    /// whether that is acceptable via [`Config::validate`]).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Apply one `-D key=value` override using the flat dotted key names.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<()> {
        fn bad<T>(key: &str, value: &str) -> Result<T> {
            Err(Error::Config(format!("invalid value {value:?} for {key}")))
        }
        match key {
            "server.hostname" => self.server.hostname = Some(value.to_owned()),
            "server.port" => match value.parse() {
                Ok(v) => self.server.port = v,
                Err(_) => return bad(key, value),
            },
            "server.dashboardPort" => match value.parse() {
                Ok(v) => self.server.dashboard_port = Some(v),
                Err(_) => return bad(key, value),
            },
            "server.docIdPath" => self.server.doc_id_path = value.to_owned(),
            "server.secure" => match value.parse() {
                Ok(v) => self.server.secure = v,
                Err(_) => return bad(key, value),
            },
            "server.keyAlias" => self.server.key_alias = value.to_owned(),
            "server.gsaIps" => {
                self.server.gsa_ips = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect();
            }
            "gsa.hostname" => self.gsa.hostname = Some(value.to_owned()),
            "gsa.characterEncoding" => self.gsa.character_encoding = value.to_owned(),
            "docId.isUrl" => match value.parse() {
                Ok(v) => self.docid.is_url = v,
                Err(_) => return bad(key, value),
            },
            "feed.name" => self.feed.name = value.to_owned(),
            "feed.noRecrawlBitEnabled" => match value.parse() {
                Ok(v) => self.feed.no_recrawl_bit_enabled = v,
                Err(_) => return bad(key, value),
            },
            "feed.crawlImmediatelyBitEnabled" => match value.parse() {
                Ok(v) => self.feed.crawl_immediately_bit_enabled = v,
                Err(_) => return bad(key, value),
            },
            "feed.maxUrls" => match value.parse() {
                Ok(v) => self.feed.max_urls = v,
                Err(_) => return bad(key, value),
            },
            "adaptor.fullListingSchedule" => {
                self.adaptor.full_listing_schedule = value.to_owned();
            }
            "adaptor.incrementalPollPeriodMillis" => match value.parse() {
                Ok(v) => self.adaptor.incremental_poll_period_millis = v,
                Err(_) => return bad(key, value),
            },
            _ => return Err(Error::Config(format!("unrecognized config key {key:?}"))),
        }
        Ok(())
    }

    /// Validate the resolved configuration, returning every issue found.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.gsa.hostname.is_none() {
            issues.push(ConfigIssue::error(
                "gsa.hostname is not set — feed pushes have no destination",
            ));
        }

        if self.feed.max_urls == 0 {
            issues.push(ConfigIssue::error("feed.maxUrls must be at least 1"));
        }

        if !self.server.doc_id_path.starts_with('/') {
            issues.push(ConfigIssue::error("server.docIdPath must start with '/'"));
        } else if !self.server.doc_id_path.ends_with('/') {
            issues.push(ConfigIssue::warning(
                "server.docIdPath does not end with '/'; docids will be glued to the last segment",
            ));
        }

        if self.server.secure {
            if self.server.tls_certificate.is_none() || self.server.tls_private_key.is_none() {
                issues.push(ConfigIssue::error(
                    "server.secure requires server.tls_certificate and server.tls_private_key",
                ));
            }
        }

        if self.server.effective_dashboard_port() == self.server.port {
            issues.push(ConfigIssue::error(
                "server.dashboardPort collides with server.port",
            ));
        }

        for ip in &self.server.gsa_ips {
            if ip.parse::<std::net::IpAddr>().is_err() {
                issues.push(ConfigIssue::warning(format!(
                    "server.gsaIps entry {ip:?} is not a valid IP address and will be ignored"
                )));
            }
        }

        let fields = self
            .adaptor
            .full_listing_schedule
            .split_whitespace()
            .count();
        if fields != 5 {
            issues.push(ConfigIssue::error(format!(
                "adaptor.fullListingSchedule must be a 5-field cron expression, got {fields} fields"
            )));
        }

        if let Some(hash) = &self.admin.password_sha256 {
            if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
                issues.push(ConfigIssue::error(
                    "admin.password_sha256 must be a 64-char hex SHA-256 digest",
                ));
            }
        }

        if self.sessions.lifetime_minutes < self.sessions.cleanup_period_minutes {
            issues.push(ConfigIssue::warning(
                "sessions.lifetime_minutes is shorter than the cleanup period; \
                 sessions will routinely outlive their lifetime",
            ));
        }

        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl ConfigIssue {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Hostname used in generated URLs. Resolved from the machine name when
    /// unset.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Document-serving port.
    #[serde(default = "d_5678")]
    pub port: u16,
    /// Dashboard port; defaults to `port + 1`.
    #[serde(default)]
    pub dashboard_port: Option<u16>,
    /// URL namespace documents are served under.
    #[serde(default = "d_doc_path")]
    pub doc_id_path: String,
    /// Serve both ports over TLS.
    #[serde(default)]
    pub secure: bool,
    /// Keystore entry used for SAML signing.
    #[serde(default = "d_key_alias")]
    pub key_alias: String,
    /// Indexer addresses allowed to fetch documents without authorization.
    #[serde(default)]
    pub gsa_ips: Vec<String>,
    #[serde(default)]
    pub tls_certificate: Option<PathBuf>,
    #[serde(default)]
    pub tls_private_key: Option<PathBuf>,
    /// How long in-flight requests get to finish during shutdown.
    #[serde(default = "d_10")]
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            port: 5678,
            dashboard_port: None,
            doc_id_path: d_doc_path(),
            secure: false,
            key_alias: d_key_alias(),
            gsa_ips: Vec::new(),
            tls_certificate: None,
            tls_private_key: None,
            shutdown_grace_seconds: 10,
        }
    }
}

impl ServerConfig {
    pub fn effective_dashboard_port(&self) -> u16 {
        self.dashboard_port.unwrap_or(self.port.wrapping_add(1))
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// The absolute root every generated document URL hangs off.
    pub fn base_url(&self, fallback_hostname: &str) -> Result<Url> {
        let host = self.hostname.as_deref().unwrap_or(fallback_hostname);
        let raw = format!("{}://{host}:{}/", self.scheme(), self.port);
        Url::parse(&raw).map_err(|e| Error::Config(format!("invalid server base {raw:?}: {e}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Indexer (GSA) target
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GsaConfig {
    /// Indexer the feed manifests are pushed to. Required for pushing.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Charset declared on the manifest XML.
    #[serde(default = "d_utf8")]
    pub character_encoding: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DocId codec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DocIdConfig {
    /// URL-passthrough mode: docids are themselves crawlable URLs.
    #[serde(default)]
    pub is_url: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Feed
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    /// Datasource name declared in the manifest header.
    #[serde(default = "d_feed_name")]
    pub name: String,
    #[serde(default)]
    pub no_recrawl_bit_enabled: bool,
    #[serde(default)]
    pub crawl_immediately_bit_enabled: bool,
    /// Batch size for one manifest POST.
    #[serde(default = "d_5000")]
    pub max_urls: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            name: d_feed_name(),
            no_recrawl_bit_enabled: false,
            crawl_immediately_bit_enabled: false,
            max_urls: 5000,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adaptor scheduling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptorConfig {
    /// 5-field cron expression triggering the daily full push.
    #[serde(default = "d_schedule")]
    pub full_listing_schedule: String,
    /// Poll period for adaptors that support incremental listings.
    #[serde(default = "d_900000")]
    pub incremental_poll_period_millis: u64,
    /// Directory the built-in filesystem adaptor serves.
    #[serde(default = "d_content_root")]
    pub content_root: PathBuf,
}

impl Default for AdaptorConfig {
    fn default() -> Self {
        Self {
            full_listing_schedule: d_schedule(),
            incremental_poll_period_millis: 900_000,
            content_root: d_content_root(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionsConfig {
    #[serde(default = "d_30")]
    pub lifetime_minutes: u64,
    #[serde(default = "d_5")]
    pub cleanup_period_minutes: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            lifetime_minutes: 30,
            cleanup_period_minutes: 5,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SAML
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SamlConfig {
    /// Our own SAML entity id.
    #[serde(default)]
    pub entity_id: Option<String>,
    /// The peer's entity id. Trusted as configured, never derived from
    /// metadata.
    #[serde(default)]
    pub peer_entity_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admin gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminConfig {
    #[serde(default = "d_admin")]
    pub username: String,
    /// Hex SHA-256 digest of the dashboard password. Unset disables the
    /// dashboard login entirely.
    #[serde(default)]
    pub password_sha256: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: d_admin(),
            password_sha256: None,
        }
    }
}

// ── serde default helpers ─────────────────────────────────────────────

fn d_5678() -> u16 {
    5678
}
fn d_doc_path() -> String {
    "/doc/".into()
}
fn d_key_alias() -> String {
    "adaptor".into()
}
fn d_10() -> u64 {
    10
}
fn d_utf8() -> String {
    "UTF-8".into()
}
fn d_feed_name() -> String {
    "testfeed".into()
}
fn d_5000() -> usize {
    5000
}
fn d_schedule() -> String {
    // Once a day, 3am.
    "0 3 * * *".into()
}
fn d_900000() -> u64 {
    900_000
}
fn d_content_root() -> PathBuf {
    PathBuf::from("./content")
}
fn d_30() -> u64 {
    30
}
fn d_5() -> u64 {
    5
}
fn d_admin() -> String {
    "admin".into()
}
