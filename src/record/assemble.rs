//! Joins local metadata with remote changes into [BranchRecord]s.

use super::{BranchRecord, Lookup, RemoteChangeItem, ReviewTrackingConfig};
use crate::git::LocalMetadata;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A source of remote changes, keyed by issue identifier.
#[async_trait]
pub trait RemoteChanges: Send + Sync {
    /// Resolves `issue_ids` against the review server at `server_url`.
    ///
    /// Must return exactly the given identifiers as keys, mapping unresolved ones to [None].
    async fn fetch(
        &self,
        server_url: &str,
        issue_ids: &[String],
    ) -> HashMap<String, Option<RemoteChangeItem>>;
}

/// The distinct issue identifiers of each review server.
pub(crate) type IssueIndex = BTreeMap<String, BTreeSet<String>>;

/// Builds the [IssueIndex] for the given tracking configs. Untracked branches are left out.
pub(crate) fn index_issues(tracking: &HashMap<String, ReviewTrackingConfig>) -> IssueIndex {
    let mut index = IssueIndex::new();
    for (issue, server) in tracking.values().filter_map(ReviewTrackingConfig::target) {
        index
            .entry(normalize_server(server).to_string())
            .or_default()
            .insert(issue.to_string());
    }
    index
}

fn normalize_server(server: &str) -> &str {
    server.trim_end_matches('/')
}

/// Assembles [BranchRecord]s, consulting a [RemoteChanges] source unless running local-only.
pub struct Assembler<'a> {
    remote: Option<&'a dyn RemoteChanges>,
}

impl<'a> Assembler<'a> {
    /// Creates an [Assembler] that resolves tracked branches through `remote`.
    pub fn new(remote: &'a dyn RemoteChanges) -> Self {
        Self {
            remote: Some(remote),
        }
    }

    /// Creates an [Assembler] that never contacts a review server.
    pub fn local_only() -> Self {
        Self { remote: None }
    }

    /// Joins `metadata` with the remote state of every tracked branch.
    ///
    /// ## Takes
    /// - `metadata` - The local metadata of the repository.
    ///
    /// ## Returns
    /// One record per listed branch with commit facts, in branch-list order.
    pub async fn assemble(&self, mut metadata: LocalMetadata) -> Vec<BranchRecord> {
        let resolved = match self.remote {
            Some(remote) => Self::resolve(remote, &index_issues(&metadata.tracking)).await,
            None => HashMap::new(),
        };

        metadata
            .branches
            .iter()
            .filter_map(|name| {
                let local = metadata.commits.remove(name)?;
                let tracking = metadata.tracking.remove(name).unwrap_or_default();

                let lookup = match (self.remote, tracking.target()) {
                    (None, _) => Lookup::Skipped,
                    (Some(_), Some((issue, server))) => {
                        let key = (normalize_server(server).to_string(), issue.to_string());
                        Lookup::Resolved(resolved.get(&key).cloned().flatten())
                    }
                    (Some(_), None) => {
                        if tracking.issue_id.is_some() {
                            tracing::warn!(branch = %name, "tracked branch has no review server");
                        }
                        Lookup::Resolved(None)
                    }
                };

                Some(BranchRecord::new(name.clone(), local, tracking, lookup))
            })
            .collect()
    }

    /// Queries every server in `index` concurrently.
    async fn resolve(
        remote: &dyn RemoteChanges,
        index: &IssueIndex,
    ) -> HashMap<(String, String), Option<RemoteChangeItem>> {
        let lookups = index.iter().map(|(server, issues)| async move {
            let ids = issues.iter().cloned().collect::<Vec<_>>();
            tracing::info!(%server, issues = ids.len(), "resolving changes");
            let found = remote.fetch(server, &ids).await;
            found
                .into_iter()
                .map(|(issue, item)| ((server.clone(), issue), item))
                .collect::<Vec<_>>()
        });

        join_all(lookups).await.into_iter().flatten().collect()
    }
}
