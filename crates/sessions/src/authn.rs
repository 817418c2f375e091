//! Per-session authentication state machine.
//!
//! `None → Pending(original_uri) → Authenticated(principal, groups,
//! expires_at)`, falling back to `None` on a failed assertion or on expiry.
//! Transitions happen under the session store's lock; this type itself is
//! just the machine.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use sb_domain::authz::UserIdentity;
use sb_domain::saml::AuthnVerdict;

#[derive(Debug, Clone, Default)]
pub enum AuthnState {
    #[default]
    None,
    Pending {
        /// Where to send the user agent once the assertion lands.
        original_uri: String,
    },
    Authenticated {
        principal: String,
        groups: BTreeSet<String>,
        expires_at: Option<DateTime<Utc>>,
    },
}

/// What the assertion-consumer endpoint should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionOutcome {
    /// Assertion accepted; redirect the user agent back to where it started.
    Redirect { original_uri: String },
    /// Assertion invalid, unsuccessful, or arrived with no pending flow.
    Rejected,
}

impl AuthnState {
    /// First authenticated request: remember where the user agent was
    /// headed and move to `Pending`.
    pub fn start(&mut self, original_uri: impl Into<String>) {
        *self = AuthnState::Pending {
            original_uri: original_uri.into(),
        };
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, AuthnState::Pending { .. })
    }

    /// Abort whatever flow is in progress.
    pub fn fail(&mut self) {
        *self = AuthnState::None;
    }

    /// Consume an assertion verdict. Only a successful assertion on a
    /// pending flow authenticates; everything else resets to `None`.
    pub fn consume(&mut self, verdict: AuthnVerdict) -> AssertionOutcome {
        let previous = std::mem::take(self);
        match (previous, verdict) {
            (
                AuthnState::Pending { original_uri },
                AuthnVerdict::Success {
                    principal,
                    groups,
                    expires_at,
                },
            ) => {
                *self = AuthnState::Authenticated {
                    principal,
                    groups,
                    expires_at,
                };
                AssertionOutcome::Redirect { original_uri }
            }
            _ => AssertionOutcome::Rejected,
        }
    }

    /// The authenticated identity, if any. Expiry is checked on access and
    /// collapses the state back to `None`.
    pub fn identity(&mut self, now: DateTime<Utc>) -> Option<UserIdentity> {
        match self {
            AuthnState::Authenticated {
                principal,
                groups,
                expires_at,
            } => {
                if expires_at.map(|t| now > t).unwrap_or(false) {
                    *self = AuthnState::None;
                    return None;
                }
                Some(UserIdentity {
                    user: principal.clone(),
                    groups: groups.clone(),
                })
            }
            _ => None,
        }
    }
}
