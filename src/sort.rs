//! Ordering of assembled [BranchRecord]s.
//!
//! Sorting is stable, so records with equal keys keep their input order. Records missing an
//! optional key (an unparseable commit time, an unknown update time) always sort last, whichever
//! direction is requested.

use crate::record::{BranchRecord, BranchStatus, ChangeStatus};
use clap::ValueEnum;
use itertools::Itertools;
use serde::Deserialize;
use std::cmp::Ordering;

/// The key records are sorted by.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortField {
    /// Branch name, lexicographically.
    #[default]
    Name,
    /// Local commit time.
    Local,
    /// Time the change was last updated on the review server.
    Updated,
    /// Status, from most to least in need of attention.
    Status,
    /// Number of diverged directions.
    Divergence,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Rank of a status when sorting. Independent of the order statuses are classified in.
pub(crate) fn status_rank(status: &BranchStatus) -> u8 {
    match status {
        BranchStatus::Change(ChangeStatus::Conflict(_)) => 0,
        BranchStatus::Change(ChangeStatus::Wip) => 1,
        BranchStatus::Change(ChangeStatus::Active(_)) => 2,
        BranchStatus::Change(ChangeStatus::Merged) => 3,
        BranchStatus::Change(ChangeStatus::Abandoned) => 4,
        BranchStatus::Change(ChangeStatus::Other(_)) => 5,
        BranchStatus::Pending => 6,
        BranchStatus::NotFound => 7,
        BranchStatus::Untracked => 8,
    }
}

/// Compares two optional keys, applying `direction` to present keys and placing absent keys last.
fn compare_optional<T: Ord>(a: Option<T>, b: Option<T>, direction: Direction) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(a.cmp(&b), direction),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn directed(ordering: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Ascending => ordering,
        Direction::Descending => ordering.reverse(),
    }
}

/// Compares two records by `field` in the given `direction`.
pub fn compare(
    a: &BranchRecord,
    b: &BranchRecord,
    field: SortField,
    direction: Direction,
) -> Ordering {
    match field {
        SortField::Name => directed(a.name().cmp(b.name()), direction),
        SortField::Local => compare_optional(a.local().timestamp, b.local().timestamp, direction),
        SortField::Updated => compare_optional(
            a.remote().and_then(|r| r.updated_at),
            b.remote().and_then(|r| r.updated_at),
            direction,
        ),
        SortField::Status => directed(
            status_rank(&a.status()).cmp(&status_rank(&b.status())),
            direction,
        ),
        SortField::Divergence => directed(
            a.divergence().score().cmp(&b.divergence().score()),
            direction,
        ),
    }
}

/// Sorts `records` by `field` in the given `direction`, keeping ties in input order.
pub fn sort(
    records: Vec<BranchRecord>,
    field: SortField,
    direction: Direction,
) -> Vec<BranchRecord> {
    records
        .into_iter()
        .sorted_by(|a, b| compare(a, b, field, direction))
        .collect()
}

#[cfg(test)]
mod test {
    use super::{sort, Direction, SortField};
    use crate::record::{
        test::{change, local, tracked},
        BranchRecord, LocalCommitFacts, Lookup, RemoteChangeItem, ReviewTrackingConfig,
    };
    use chrono::{TimeZone, Utc};

    fn names(records: &[BranchRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name()).collect()
    }

    fn with_status(name: &str, item: Option<RemoteChangeItem>) -> BranchRecord {
        match item {
            Some(item) => {
                BranchRecord::new(name, local("h"), tracked("1"), Lookup::Resolved(Some(item)))
            }
            None => BranchRecord::new(
                name,
                local("h"),
                ReviewTrackingConfig::default(),
                Lookup::Skipped,
            ),
        }
    }

    /// A record whose divergence score is `score`.
    fn diverged(name: &str, score: u8) -> BranchRecord {
        let mut tracking = tracked("1");
        tracking.last_upload_hash = Some(if score >= 1 { "old" } else { "h" }.to_string());
        tracking.squash_hash = Some("squash".to_string());
        let mut item = change("NEW");
        item.current_revision = Some(if score == 2 { "newer" } else { "squash" }.to_string());
        BranchRecord::new(name, local("h"), tracking, Lookup::Resolved(Some(item)))
    }

    #[test]
    fn divergence_descending_keeps_tie_order() {
        let records = vec![
            diverged("none", 0),
            diverged("B", 1),
            diverged("both", 2),
            diverged("A", 1),
        ];
        let sorted = sort(records, SortField::Divergence, Direction::Descending);
        assert_eq!(names(&sorted), vec!["both", "B", "A", "none"]);
    }

    #[test]
    fn status_sort_is_stable_over_name_order() {
        let mut wip = change("NEW");
        wip.work_in_progress = true;
        let mut conflict = change("NEW");
        conflict.mergeable = false;

        let records = vec![
            with_status("a", Some(change("NEW"))),
            with_status("b", None),
            with_status("c", Some(wip.clone())),
            with_status("d", Some(change("MERGED"))),
            with_status("e", Some(change("NEW"))),
            with_status("f", Some(conflict)),
            with_status("g", Some(wip)),
        ];
        let records = sort(records, SortField::Name, Direction::Ascending);
        let sorted = sort(records, SortField::Status, Direction::Ascending);
        assert_eq!(names(&sorted), vec!["f", "c", "g", "a", "e", "d", "b"]);
    }

    #[test]
    fn missing_keys_sort_last_in_both_directions() {
        let dated = |name: &str, timestamp: &str| {
            BranchRecord::new(
                name,
                LocalCommitFacts::new("h", timestamp),
                Default::default(),
                Lookup::Skipped,
            )
        };
        let records = vec![
            dated("undated", "?"),
            dated("old", "2023-01-01T00:00:00Z"),
            dated("new", "2024-01-01T00:00:00Z"),
        ];

        let ascending = sort(records.clone(), SortField::Local, Direction::Ascending);
        assert_eq!(names(&ascending), vec!["old", "new", "undated"]);
        let descending = sort(records, SortField::Local, Direction::Descending);
        assert_eq!(names(&descending), vec!["new", "old", "undated"]);
    }

    #[test]
    fn updated_time_sorts_untracked_last() {
        let mut recent = change("NEW");
        recent.updated_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        let mut older = change("NEW");
        older.updated_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let records = vec![
            with_status("untracked", None),
            with_status("older", Some(older)),
            with_status("recent", Some(recent)),
        ];
        let sorted = sort(records, SortField::Updated, Direction::Descending);
        assert_eq!(names(&sorted), vec!["recent", "older", "untracked"]);
    }

    #[test]
    fn names_sort_lexicographically() {
        let records = ["b", "a/x", "C", "a"]
            .into_iter()
            .map(|n| with_status(n, None))
            .collect();
        let sorted = sort(records, SortField::Name, Direction::Descending);
        assert_eq!(names(&sorted), vec!["b", "a/x", "a", "C"]);
    }
}
