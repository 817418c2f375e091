//! SAML black-box interfaces.
//!
//! The wire library producing and consuming SAML messages is external; the
//! gateway only depends on these traits. The peer entity id is
//! configuration-bound; nothing here establishes peer identity
//! cryptographically.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::authz::AuthzStatus;
use crate::error::{Error, Result};

/// A prepared AuthnRequest: where to send the user agent.
#[derive(Debug, Clone)]
pub struct AuthnRequest {
    /// Signed request rendered into a redirect location on the identity
    /// provider.
    pub redirect_location: Url,
}

/// Outcome of consuming an assertion at the consumer endpoint.
#[derive(Debug, Clone)]
pub enum AuthnVerdict {
    Success {
        principal: String,
        groups: BTreeSet<String>,
        /// Absent means the assertion carries no explicit lifetime.
        expires_at: Option<DateTime<Utc>>,
    },
    Failure {
        reason: String,
    },
}

/// Produces AuthnRequests and validates assertion responses.
#[async_trait]
pub trait SamlIdentityProvider: Send + Sync + 'static {
    /// Build a signed AuthnRequest for a user agent that asked for
    /// `original_uri`, returning the redirect to send it to.
    fn begin_authn(&self, original_uri: &str) -> Result<AuthnRequest>;

    /// Consume the artifact-binding response query string and validate the
    /// assertion it resolves to.
    async fn consume_assertion(&self, raw_query: &str) -> Result<AuthnVerdict>;
}

/// One authorization query lifted out of the multi-query SOAP envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzQuery {
    /// Request id echoed back in the matching response.
    pub id: String,
    pub subject: String,
    /// The resource URL the indexer asks about, verbatim.
    pub resource: String,
}

/// One decision, paired with the query it answers.
#[derive(Debug, Clone)]
pub struct AuthzDecision {
    pub query: AuthzQuery,
    pub status: AuthzStatus,
}

/// Parses batched AuthzDecisionQuery envelopes and renders the parallel
/// response envelope of AuthzDecisionStatements.
pub trait SamlAuthzCodec: Send + Sync + 'static {
    fn parse_queries(&self, body: &str) -> Result<Vec<AuthzQuery>>;

    fn render_decisions(&self, decisions: &[AuthzDecision]) -> Result<String>;
}

/// Placeholder wired in when no SAML stack is configured; every operation
/// fails with a configuration error.
pub struct UnconfiguredSaml;

#[async_trait]
impl SamlIdentityProvider for UnconfiguredSaml {
    fn begin_authn(&self, _original_uri: &str) -> Result<AuthnRequest> {
        Err(Error::Saml("no SAML identity provider configured".into()))
    }

    async fn consume_assertion(&self, _raw_query: &str) -> Result<AuthnVerdict> {
        Err(Error::Saml("no SAML identity provider configured".into()))
    }
}

impl SamlAuthzCodec for UnconfiguredSaml {
    fn parse_queries(&self, _body: &str) -> Result<Vec<AuthzQuery>> {
        Err(Error::Saml("no SAML authorization codec configured".into()))
    }

    fn render_decisions(&self, _decisions: &[AuthzDecision]) -> Result<String> {
        Err(Error::Saml("no SAML authorization codec configured".into()))
    }
}
