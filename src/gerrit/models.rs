//! Response bodies of the review server's REST API.

use crate::record::{ChangeState, RemoteChangeItem, VoteTally};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// The label whose votes make up a change's [VoteTally].
const REVIEW_LABEL: &str = "Code-Review";

/// Timestamp format used throughout the API. Timestamps are always UTC.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// The body of a batched `GET /changes/` query.
///
/// With several `q` terms the server answers with one array per term. With a single term it
/// answers with the bare array of matches.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ChangeQueryResponse {
    PerQuery(Vec<Vec<ChangeInfo>>),
    Single(Vec<ChangeInfo>),
}

impl ChangeQueryResponse {
    /// Flattens the response into its matches, discarding which query term produced each one.
    pub(crate) fn into_matches(self) -> Vec<ChangeInfo> {
        match self {
            Self::PerQuery(groups) => groups.into_iter().flatten().collect(),
            Self::Single(matches) => matches,
        }
    }
}

/// A single change in a query response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChangeInfo {
    /// The change number, i.e. the issue identifier.
    #[serde(rename = "_number")]
    pub(crate) number: u64,
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) work_in_progress: bool,
    #[serde(default)]
    pub(crate) updated: Option<String>,
    #[serde(default)]
    pub(crate) current_revision: Option<String>,
    #[serde(default)]
    pub(crate) labels: HashMap<String, LabelInfo>,
    #[serde(default)]
    pub(crate) pending_reviewers: HashMap<String, Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct LabelInfo {
    #[serde(default)]
    pub(crate) approved: Option<Value>,
    #[serde(default)]
    pub(crate) all: Vec<ApprovalInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApprovalInfo {
    #[serde(default)]
    pub(crate) value: Option<i32>,
}

/// The body of `GET /changes/{id}/revisions/current/mergeable`.
#[derive(Debug, Deserialize)]
pub(crate) struct MergeableInfo {
    pub(crate) mergeable: bool,
}

impl ChangeInfo {
    /// Converts the change into a [RemoteChangeItem], given the result of its mergeability query.
    pub(crate) fn into_item(self, mergeable: bool) -> RemoteChangeItem {
        let votes = self
            .labels
            .get(REVIEW_LABEL)
            .map(|label| VoteTally {
                approved: label.approved.is_some(),
                positive: label.all.iter().filter(|a| a.value.unwrap_or(0) > 0).count() as u32,
                negative: label.all.iter().filter(|a| a.value.unwrap_or(0) < 0).count() as u32,
            })
            .unwrap_or_default();
        let updated_at = self.updated.as_deref().and_then(parse_timestamp);

        RemoteChangeItem {
            status: ChangeState::from(self.status.as_str()),
            work_in_progress: self.work_in_progress,
            mergeable,
            updated_at,
            current_revision: self.current_revision,
            votes,
            has_pending_reviewers: self.pending_reviewers.values().any(|r| !r.is_empty()),
        }
    }
}

/// Parses an API timestamp such as `2024-01-15 10:20:30.000000000`.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
