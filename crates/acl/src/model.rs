//! The ACL tuple and its construction-time validation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use sb_domain::authz::{AuthzStatus, UserIdentity};
use sb_domain::docid::DocId;

/// How an ACL combines with its *child* during chain evaluation. The leaf's
/// own type is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InheritanceType {
    ChildOverrides,
    ParentOverrides,
    AndBothPermit,
    LeafNode,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AclError {
    #[error("ACL principal must be non-empty")]
    EmptyPrincipal,

    #[error("ACL principal {0:?} has leading or trailing whitespace")]
    UntrimmedPrincipal(String),
}

/// Immutable authorization tuple for one docid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    permit_users: BTreeSet<String>,
    deny_users: BTreeSet<String>,
    permit_groups: BTreeSet<String>,
    deny_groups: BTreeSet<String>,
    inherit_from: Option<DocId>,
    inheritance: InheritanceType,
}

impl Acl {
    pub fn builder() -> AclBuilder {
        AclBuilder::default()
    }

    /// The ACL substituted for parents that do not exist: no rules, no
    /// further inheritance.
    pub fn empty_leaf() -> Self {
        Self {
            permit_users: BTreeSet::new(),
            deny_users: BTreeSet::new(),
            permit_groups: BTreeSet::new(),
            deny_groups: BTreeSet::new(),
            inherit_from: None,
            inheritance: InheritanceType::LeafNode,
        }
    }

    pub fn inherit_from(&self) -> Option<&DocId> {
        self.inherit_from.as_ref()
    }

    pub fn inheritance(&self) -> InheritanceType {
        self.inheritance
    }

    pub fn permit_users(&self) -> &BTreeSet<String> {
        &self.permit_users
    }

    pub fn deny_users(&self) -> &BTreeSet<String> {
        &self.deny_users
    }

    pub fn permit_groups(&self) -> &BTreeSet<String> {
        &self.permit_groups
    }

    pub fn deny_groups(&self) -> &BTreeSet<String> {
        &self.deny_groups
    }

    /// True when every permit/deny set is empty.
    pub fn has_no_rules(&self) -> bool {
        self.permit_users.is_empty()
            && self.deny_users.is_empty()
            && self.permit_groups.is_empty()
            && self.deny_groups.is_empty()
    }

    /// The decision this ACL makes on its own, ignoring inheritance.
    /// Deny trumps permit; no match at all is indeterminate.
    pub fn local_decision(&self, identity: &UserIdentity) -> AuthzStatus {
        let in_groups = |set: &BTreeSet<String>| identity.groups.iter().any(|g| set.contains(g));

        if self.deny_users.contains(&identity.user) || in_groups(&self.deny_groups) {
            return AuthzStatus::Deny;
        }
        if self.permit_users.contains(&identity.user) || in_groups(&self.permit_groups) {
            return AuthzStatus::Permit;
        }
        AuthzStatus::Indeterminate
    }
}

/// Builder for [`Acl`]. Principals are validated in [`AclBuilder::build`]:
/// non-empty and free of leading/trailing whitespace.
#[derive(Debug, Clone, Default)]
pub struct AclBuilder {
    permit_users: BTreeSet<String>,
    deny_users: BTreeSet<String>,
    permit_groups: BTreeSet<String>,
    deny_groups: BTreeSet<String>,
    inherit_from: Option<DocId>,
    inheritance: Option<InheritanceType>,
}

impl AclBuilder {
    pub fn permit_user(mut self, user: impl Into<String>) -> Self {
        self.permit_users.insert(user.into());
        self
    }

    pub fn permit_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permit_users.extend(users.into_iter().map(Into::into));
        self
    }

    pub fn deny_user(mut self, user: impl Into<String>) -> Self {
        self.deny_users.insert(user.into());
        self
    }

    pub fn deny_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny_users.extend(users.into_iter().map(Into::into));
        self
    }

    pub fn permit_group(mut self, group: impl Into<String>) -> Self {
        self.permit_groups.insert(group.into());
        self
    }

    pub fn deny_group(mut self, group: impl Into<String>) -> Self {
        self.deny_groups.insert(group.into());
        self
    }

    pub fn inherit_from(mut self, parent: impl Into<DocId>) -> Self {
        self.inherit_from = Some(parent.into());
        self
    }

    pub fn inheritance(mut self, inheritance: InheritanceType) -> Self {
        self.inheritance = Some(inheritance);
        self
    }

    pub fn build(self) -> Result<Acl, AclError> {
        for set in [
            &self.permit_users,
            &self.deny_users,
            &self.permit_groups,
            &self.deny_groups,
        ] {
            for principal in set {
                if principal.is_empty() {
                    return Err(AclError::EmptyPrincipal);
                }
                if principal.trim() != principal {
                    return Err(AclError::UntrimmedPrincipal(principal.clone()));
                }
            }
        }
        Ok(Acl {
            permit_users: self.permit_users,
            deny_users: self.deny_users,
            permit_groups: self.permit_groups,
            deny_groups: self.deny_groups,
            inherit_from: self.inherit_from,
            inheritance: self.inheritance.unwrap_or(InheritanceType::LeafNode),
        })
    }
}
