//! Authorization primitives shared between the ACL evaluator, the adaptor
//! contract, and the batch authorization responder.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Outcome of an authorization decision for one user on one docid.
///
/// `Indeterminate` means the evaluated policy carries no opinion; callers
/// that must produce a final verdict treat it as deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthzStatus {
    Permit,
    Deny,
    Indeterminate,
}

impl AuthzStatus {
    pub fn is_determinate(self) -> bool {
        !matches!(self, AuthzStatus::Indeterminate)
    }
}

impl std::fmt::Display for AuthzStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthzStatus::Permit => "PERMIT",
            AuthzStatus::Deny => "DENY",
            AuthzStatus::Indeterminate => "INDETERMINATE",
        };
        f.write_str(s)
    }
}

/// The authenticated principal an authorization question is asked about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user: String,
    pub groups: BTreeSet<String>,
}

impl UserIdentity {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            groups: BTreeSet::new(),
        }
    }

    pub fn with_groups<I, S>(user: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user: user.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}
