//! Chain evaluation: lazy inheritance combinators over a root-to-leaf chain.

use sb_domain::authz::{AuthzStatus, UserIdentity};

use crate::model::{Acl, InheritanceType};

impl InheritanceType {
    /// Combine the child's decision with the parent's local decision. The
    /// thunks are only invoked when the combinator actually needs them.
    pub fn combine(
        self,
        child: impl FnOnce() -> AuthzStatus,
        parent: impl FnOnce() -> AuthzStatus,
    ) -> AuthzStatus {
        match self {
            InheritanceType::ChildOverrides => {
                let c = child();
                if c.is_determinate() {
                    c
                } else {
                    parent()
                }
            }
            InheritanceType::ParentOverrides => {
                let p = parent();
                if p.is_determinate() {
                    p
                } else {
                    child()
                }
            }
            InheritanceType::AndBothPermit => {
                if child() == AuthzStatus::Permit && parent() == AuthzStatus::Permit {
                    AuthzStatus::Permit
                } else {
                    AuthzStatus::Deny
                }
            }
            InheritanceType::LeafNode => {
                // A leaf has no business being somebody's parent.
                tracing::warn!("LEAF_NODE ACL used as a parent; denying");
                AuthzStatus::Deny
            }
        }
    }
}

/// Decide a full inheritance chain, root at index 0, target docid last.
///
/// A chain whose ACLs carry no rules at all is indeterminate; any other
/// chain yields a definite permit or deny (no permit by default).
pub fn evaluate_chain(chain: &[Acl], identity: &UserIdentity) -> AuthzStatus {
    let refs: Vec<&Acl> = chain.iter().collect();
    evaluate_chain_refs(&refs, identity)
}

pub(crate) fn evaluate_chain_refs(chain: &[&Acl], identity: &UserIdentity) -> AuthzStatus {
    if chain.iter().all(|acl| acl.has_no_rules()) {
        return AuthzStatus::Indeterminate;
    }
    match non_local_decision(chain, 0, identity) {
        AuthzStatus::Indeterminate => AuthzStatus::Deny,
        determinate => determinate,
    }
}

fn non_local_decision(chain: &[&Acl], idx: usize, identity: &UserIdentity) -> AuthzStatus {
    let acl = chain[idx];
    if idx + 1 == chain.len() {
        // The leaf's non-local decision is its local decision; its
        // inheritance type is ignored.
        return acl.local_decision(identity);
    }
    acl.inheritance().combine(
        || non_local_decision(chain, idx + 1, identity),
        || acl.local_decision(identity),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InheritanceType::*;

    fn user(name: &str) -> UserIdentity {
        UserIdentity::new(name)
    }

    #[test]
    fn single_acl_collapses_to_local_decision() {
        let chain = vec![Acl::builder().permit_user("alice").build().unwrap()];
        assert_eq!(evaluate_chain(&chain, &user("alice")), AuthzStatus::Permit);
        // No-permit-by-default: the indeterminate local decision becomes deny.
        assert_eq!(evaluate_chain(&chain, &user("bob")), AuthzStatus::Deny);
    }

    #[test]
    fn all_empty_chain_is_indeterminate() {
        let chain = vec![
            Acl::builder().inheritance(ParentOverrides).build().unwrap(),
            Acl::empty_leaf(),
        ];
        assert_eq!(
            evaluate_chain(&chain, &user("alice")),
            AuthzStatus::Indeterminate
        );
        assert_eq!(evaluate_chain(&[], &user("alice")), AuthzStatus::Indeterminate);
    }

    #[test]
    fn parent_overrides_falls_through_to_child() {
        // Parent carries no rules; the child leaf permits alice.
        let chain = vec![
            Acl::builder().inheritance(ParentOverrides).build().unwrap(),
            Acl::builder().permit_user("alice").build().unwrap(),
        ];
        assert_eq!(evaluate_chain(&chain, &user("alice")), AuthzStatus::Permit);
    }

    #[test]
    fn child_overrides_lets_the_leaf_deny() {
        let chain = vec![
            Acl::builder()
                .permit_user("alice")
                .inheritance(ChildOverrides)
                .build()
                .unwrap(),
            Acl::builder().deny_user("alice").build().unwrap(),
        ];
        assert_eq!(evaluate_chain(&chain, &user("alice")), AuthzStatus::Deny);
    }

    #[test]
    fn and_both_permit_requires_both() {
        let permit = |t| {
            Acl::builder()
                .permit_user("alice")
                .inheritance(t)
                .build()
                .unwrap()
        };
        let chain = vec![permit(AndBothPermit), permit(LeafNode)];
        assert_eq!(evaluate_chain(&chain, &user("alice")), AuthzStatus::Permit);

        let chain = vec![
            permit(AndBothPermit),
            Acl::builder().permit_user("bob").build().unwrap(),
        ];
        assert_eq!(evaluate_chain(&chain, &user("alice")), AuthzStatus::Deny);
    }

    #[test]
    fn leaf_node_as_parent_denies() {
        // Misconfigured: the parent says it is a leaf yet has a child.
        let chain = vec![
            Acl::builder().permit_user("alice").build().unwrap(),
            Acl::builder().permit_user("alice").build().unwrap(),
        ];
        assert_eq!(evaluate_chain(&chain, &user("alice")), AuthzStatus::Deny);
    }

    #[test]
    fn combinators_are_lazy() {
        use std::cell::Cell;
        let called = Cell::new(false);
        let status = ChildOverrides.combine(
            || AuthzStatus::Permit,
            || {
                called.set(true);
                AuthzStatus::Deny
            },
        );
        assert_eq!(status, AuthzStatus::Permit);
        assert!(!called.get(), "parent thunk must not run when child decides");

        let called = Cell::new(false);
        let status = ParentOverrides.combine(
            || {
                called.set(true);
                AuthzStatus::Permit
            },
            || AuthzStatus::Deny,
        );
        assert_eq!(status, AuthzStatus::Deny);
        assert!(!called.get(), "child thunk must not run when parent decides");
    }

    #[test]
    fn never_indeterminate_with_rules_present() {
        // Any chain carrying at least one rule decides permit or deny.
        let chains = vec![
            vec![
                Acl::builder()
                    .permit_user("carol")
                    .inheritance(ChildOverrides)
                    .build()
                    .unwrap(),
                Acl::empty_leaf(),
            ],
            vec![
                Acl::builder().inheritance(AndBothPermit).build().unwrap(),
                Acl::builder().deny_group("sales").build().unwrap(),
            ],
        ];
        for chain in chains {
            let status = evaluate_chain(&chain, &user("alice"));
            assert!(
                status.is_determinate(),
                "expected a determinate status, got {status:?}"
            );
        }
    }
}
