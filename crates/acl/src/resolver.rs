//! Batch resolution: docids → final authorization decisions, walking
//! inheritance through an [`AclRetriever`] until closure.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use sb_domain::authz::{AuthzStatus, UserIdentity};
use sb_domain::docid::DocId;

use crate::evaluate::evaluate_chain_refs;
use crate::model::Acl;

/// Maps a set of docids to their ACLs. Docids missing from the reply denote
/// "no ACL exists for this docid".
#[async_trait]
pub trait AclRetriever: Send + Sync {
    async fn retrieve_acls(&self, ids: &[DocId]) -> sb_domain::Result<HashMap<DocId, Acl>>;
}

/// Resolve every docid in `ids` to a decision for `identity`.
///
/// Inheritance parents are fetched in follow-up retrievals; no docid is ever
/// requested twice within one batch. A missing parent acts as the empty leaf
/// ACL. An inheritance cycle makes the affected root indeterminate without
/// disturbing the other roots.
pub async fn resolve_batch(
    retriever: &dyn AclRetriever,
    identity: &UserIdentity,
    ids: &[DocId],
) -> sb_domain::Result<HashMap<DocId, AuthzStatus>> {
    // Phase 1: fetch ACLs to closure over the inheritance links.
    let mut requested: HashSet<DocId> = HashSet::new();
    let mut known: HashMap<DocId, Acl> = HashMap::new();

    let mut wave: Vec<DocId> = Vec::new();
    for id in ids {
        if requested.insert(id.clone()) {
            wave.push(id.clone());
        }
    }

    while !wave.is_empty() {
        let reply = retriever.retrieve_acls(&wave).await?;
        let mut next: Vec<DocId> = Vec::new();
        for (id, acl) in reply {
            if let Some(parent) = acl.inherit_from() {
                if requested.insert(parent.clone()) {
                    next.push(parent.clone());
                }
            }
            known.insert(id, acl);
        }
        wave = next;
    }

    // Phase 2: walk each root's chain and evaluate it.
    let empty = Acl::empty_leaf();
    let mut results = HashMap::with_capacity(ids.len());
    for id in ids {
        let status = match build_chain(id, &known, &empty) {
            Some(chain) => evaluate_chain_refs(&chain, identity),
            None => {
                tracing::warn!(doc_id = %id, "ACL inheritance cycle");
                AuthzStatus::Indeterminate
            }
        };
        results.insert(id.clone(), status);
    }
    Ok(results)
}

/// Build the root-first chain ending at `leaf`. Returns `None` on a cycle.
///
/// Within one batch every docid resolves to exactly one retrieved ACL, so
/// revisiting a docid along the walk is the same as revisiting an ACL
/// identity.
fn build_chain<'a>(
    leaf: &DocId,
    known: &'a HashMap<DocId, Acl>,
    empty: &'a Acl,
) -> Option<Vec<&'a Acl>> {
    let mut chain: Vec<&'a Acl> = Vec::new();
    let mut walked: HashSet<&DocId> = HashSet::new();
    let mut cursor = leaf;
    loop {
        if !walked.insert(cursor) {
            return None;
        }
        let acl = known.get(cursor).unwrap_or(empty);
        chain.push(acl);
        match acl.inherit_from() {
            Some(parent) => cursor = parent,
            None => break,
        }
    }
    chain.reverse();
    Some(chain)
}
