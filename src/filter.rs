//! Filtering of assembled [BranchRecord]s.
//!
//! Categories (status, date range, divergence) combine with AND. Multiple values within a
//! category combine with OR, and an empty category accepts everything.

use crate::record::{BranchRecord, BranchStatus, ChangeStatus};
use chrono::{DateTime, Utc};
use clap::ValueEnum;

/// A status a record may be filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusFilter {
    Active,
    Wip,
    Conflict,
    Merged,
    Abandoned,
    /// Any branch with an issue recorded, whatever its remote status.
    Tracked,
    /// Only branches without an issue recorded.
    Untracked,
}

impl StatusFilter {
    /// Returns `true` if `record` falls under this status. Never needs the review server.
    pub fn matches(&self, record: &BranchRecord) -> bool {
        let tracked = record.tracking().issue_id.is_some();
        match self {
            Self::Tracked => tracked,
            Self::Untracked => !tracked,
            Self::Active => matches!(
                record.status(),
                BranchStatus::Change(ChangeStatus::Active(_))
            ),
            Self::Wip => matches!(record.status(), BranchStatus::Change(ChangeStatus::Wip)),
            Self::Conflict => matches!(
                record.status(),
                BranchStatus::Change(ChangeStatus::Conflict(_))
            ),
            Self::Merged => matches!(record.status(), BranchStatus::Change(ChangeStatus::Merged)),
            Self::Abandoned => matches!(
                record.status(),
                BranchStatus::Change(ChangeStatus::Abandoned)
            ),
        }
    }
}

/// A direction of divergence a record may be filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DivergenceFilter {
    /// Local commits not yet uploaded.
    Unpushed,
    /// Remote patchsets not yet pulled.
    Unpulled,
    /// Either of the above.
    Any,
}

impl DivergenceFilter {
    pub fn matches(&self, record: &BranchRecord) -> bool {
        match self {
            Self::Unpushed => record.has_unpushed_local_work(),
            Self::Unpulled => record.has_unpulled_remote_work(),
            Self::Any => record.divergence().diverged(),
        }
    }
}

/// The criteria a set of records is filtered by.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    pub statuses: Vec<StatusFilter>,
    /// Inclusive lower bound on the local commit time.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the local commit time.
    pub until: Option<DateTime<Utc>>,
    pub divergence: Vec<DivergenceFilter>,
}

impl FilterCriteria {
    /// Returns `true` if `record` satisfies every category.
    pub fn accepts(&self, record: &BranchRecord) -> bool {
        let status = self.statuses.is_empty() || self.statuses.iter().any(|s| s.matches(record));
        let divergence =
            self.divergence.is_empty() || self.divergence.iter().any(|d| d.matches(record));

        status && divergence && self.in_range(record)
    }

    /// Date range check. Records without a parseable commit time are always kept.
    fn in_range(&self, record: &BranchRecord) -> bool {
        let Some(committed) = record.local().timestamp else {
            return true;
        };
        self.since.map_or(true, |since| committed >= since)
            && self.until.map_or(true, |until| committed < until)
    }
}

/// Keeps the records accepted by `criteria`, preserving their order.
pub fn filter(records: Vec<BranchRecord>, criteria: &FilterCriteria) -> Vec<BranchRecord> {
    records
        .into_iter()
        .filter(|record| criteria.accepts(record))
        .collect()
}
