//! The unified per-branch record, joining local commit facts, review tracking config, and the
//! remote change state.

use chrono::{DateTime, Utc};

mod assemble;
pub(crate) use assemble::{Assembler, RemoteChanges};

mod fmt;

/// The head commit of a local branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCommitFacts {
    /// The full commit hash.
    pub hash: String,
    /// The committer timestamp, as printed by `git`.
    pub raw_timestamp: String,
    /// The parsed committer timestamp. [None] if `raw_timestamp` could not be parsed.
    pub timestamp: Option<DateTime<Utc>>,
}

impl LocalCommitFacts {
    /// Creates a new [LocalCommitFacts], parsing `raw_timestamp` as a strict ISO-8601 instant.
    pub fn new(hash: impl Into<String>, raw_timestamp: impl Into<String>) -> Self {
        let raw_timestamp = raw_timestamp.into();
        let timestamp = DateTime::parse_from_rfc3339(raw_timestamp.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc));
        Self {
            hash: hash.into(),
            raw_timestamp,
            timestamp,
        }
    }
}

/// Review tracking metadata recorded in `branch.<name>.*` when a branch is uploaded.
///
/// Every field is independently optional. An absent field is never equivalent to an empty one.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ReviewTrackingConfig {
    /// The change number on the review server (`gerritissue`).
    pub issue_id: Option<String>,
    /// The review server's base URL (`gerritserver`).
    pub server_url: Option<String>,
    /// The last uploaded patchset (`gerritpatchset`).
    pub patchset: Option<u32>,
    /// The squashed commit as it was uploaded for review (`gerritsquashhash`).
    pub squash_hash: Option<String>,
    /// The local head at the time of the last upload (`last-upload-hash`).
    pub last_upload_hash: Option<String>,
}

impl ReviewTrackingConfig {
    /// Returns the `(issue, server)` pair if the branch is tracked against a review server.
    pub fn target(&self) -> Option<(&str, &str)> {
        Some((self.issue_id.as_deref()?, self.server_url.as_deref()?))
    }

    /// Returns the browsable URL of the change, `{server}/c/{issue}`.
    pub fn change_url(&self) -> Option<String> {
        let (issue, server) = self.target()?;
        Some(format!("{}/c/{}", server.trim_end_matches('/'), issue))
    }
}

/// The lifecycle state of a change, as reported by the review server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeState {
    New,
    Merged,
    Abandoned,
    /// Any status string this tool does not recognize, kept verbatim.
    Other(String),
}

impl From<&str> for ChangeState {
    fn from(raw: &str) -> Self {
        match raw {
            "NEW" => Self::New,
            "MERGED" => Self::Merged,
            "ABANDONED" => Self::Abandoned,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A summary of the `Code-Review` votes on a change.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    /// Whether the change carries an approving vote.
    pub approved: bool,
    /// Number of positive votes.
    pub positive: u32,
    /// Number of negative votes.
    pub negative: u32,
}

/// A change on the review server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChangeItem {
    pub status: ChangeState,
    pub work_in_progress: bool,
    /// Whether the change merges cleanly. `true` when the server could not tell us.
    pub mergeable: bool,
    pub updated_at: Option<DateTime<Utc>>,
    /// The current patchset's commit hash.
    pub current_revision: Option<String>,
    pub votes: VoteTally,
    /// Whether reviewers were added while the change was WIP and not yet notified.
    pub has_pending_reviewers: bool,
}

impl RemoteChangeItem {
    /// Classifies the change into a [ChangeStatus].
    ///
    /// Rules are evaluated in priority order and the first match wins: terminal states
    /// (merged, abandoned) are never masked by a conflict or a WIP flag.
    pub fn classify(&self) -> ChangeStatus {
        let notes = StatusNotes {
            wip: self.work_in_progress,
            approved: self.votes.approved,
            pending_reviewers: self.has_pending_reviewers,
        };

        match &self.status {
            ChangeState::Merged => ChangeStatus::Merged,
            ChangeState::Abandoned => ChangeStatus::Abandoned,
            _ if !self.mergeable => ChangeStatus::Conflict(notes),
            _ if self.work_in_progress => ChangeStatus::Wip,
            ChangeState::New => ChangeStatus::Active(notes),
            ChangeState::Other(raw) => ChangeStatus::Other(raw.clone()),
        }
    }
}

/// Display-only sub-states attached to a [ChangeStatus]. They never affect classification order.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusNotes {
    pub wip: bool,
    pub approved: bool,
    pub pending_reviewers: bool,
}

/// The user-facing category of a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeStatus {
    Merged,
    Abandoned,
    Conflict(StatusNotes),
    Wip,
    Active(StatusNotes),
    /// An unrecognized server status, verbatim.
    Other(String),
}

/// Where a branch stands with respect to the review server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    /// The branch has no issue recorded.
    Untracked,
    /// The branch is tracked, but the review server was not consulted.
    TrackedPending,
    /// The branch is tracked and its change was found.
    TrackedFound(RemoteChangeItem),
    /// The branch is tracked, but its change could not be resolved.
    TrackedNotFound,
}

/// The outcome of looking a tracked branch up on the review server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// No lookup was attempted.
    Skipped,
    /// A lookup was attempted; [None] if nothing was found or the lookup failed.
    Resolved(Option<RemoteChangeItem>),
}

/// The category a [BranchRecord] is reported and filtered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchStatus {
    Untracked,
    Pending,
    NotFound,
    Change(ChangeStatus),
}

/// The two independent ways a branch can be out of sync with its change.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivergenceState {
    /// Local commits that have not been uploaded.
    pub unpushed: bool,
    /// Newer patchsets on the server that are not present locally.
    pub unpulled: bool,
}

impl DivergenceState {
    /// Returns `true` if either direction has diverged.
    pub fn diverged(&self) -> bool {
        self.unpushed || self.unpulled
    }

    /// Returns `2` if both directions diverged, `1` if exactly one did, and `0` otherwise.
    pub fn score(&self) -> u8 {
        u8::from(self.unpushed) + u8::from(self.unpulled)
    }
}

/// A local branch, joined with its review tracking config and remote change.
///
/// Constructed once per run and never mutated. Derived quantities are computed on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    name: String,
    local: LocalCommitFacts,
    tracking: ReviewTrackingConfig,
    remote: RemoteState,
}

impl BranchRecord {
    /// Creates a new [BranchRecord].
    ///
    /// The [RemoteState] is derived from `tracking` and `lookup`, so a record can never carry a
    /// remote change without an issue to match it against.
    ///
    /// ## Takes
    /// - `name` - The branch name.
    /// - `local` - The branch's head commit.
    /// - `tracking` - The branch's tracking config, all-[None] if untracked.
    /// - `lookup` - The outcome of resolving the branch's issue on the review server.
    pub fn new(
        name: impl Into<String>,
        local: LocalCommitFacts,
        tracking: ReviewTrackingConfig,
        lookup: Lookup,
    ) -> Self {
        let remote = match (&tracking.issue_id, lookup) {
            (None, _) => RemoteState::Untracked,
            (Some(_), Lookup::Skipped) => RemoteState::TrackedPending,
            (Some(_), Lookup::Resolved(Some(item))) => RemoteState::TrackedFound(item),
            (Some(_), Lookup::Resolved(None)) => RemoteState::TrackedNotFound,
        };

        Self {
            name: name.into(),
            local,
            tracking,
            remote,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local(&self) -> &LocalCommitFacts {
        &self.local
    }

    pub fn tracking(&self) -> &ReviewTrackingConfig {
        &self.tracking
    }

    pub fn remote_state(&self) -> &RemoteState {
        &self.remote
    }

    /// Returns the remote change, if one was found.
    pub fn remote(&self) -> Option<&RemoteChangeItem> {
        match self.remote_state() {
            RemoteState::TrackedFound(item) => Some(item),
            _ => None,
        }
    }

    /// Returns the category this record is reported under.
    pub fn status(&self) -> BranchStatus {
        match self.remote_state() {
            RemoteState::Untracked => BranchStatus::Untracked,
            RemoteState::TrackedPending => BranchStatus::Pending,
            RemoteState::TrackedNotFound => BranchStatus::NotFound,
            RemoteState::TrackedFound(item) => BranchStatus::Change(item.classify()),
        }
    }

    /// Whether the local head has moved since the last upload.
    ///
    /// Compared against the recorded upload hash rather than the server's revision, since the
    /// server holds the squashed form of the branch. [false] if either the issue or the upload
    /// hash is unknown.
    pub fn has_unpushed_local_work(&self) -> bool {
        match (&self.tracking.issue_id, &self.tracking.last_upload_hash) {
            (Some(_), Some(uploaded)) => self.local.hash != *uploaded,
            _ => false,
        }
    }

    /// Whether the server's current revision differs from the squashed hash recorded locally.
    ///
    /// [false] unless the remote change, the squash hash, and the current revision are all known.
    pub fn has_unpulled_remote_work(&self) -> bool {
        let Some(remote) = self.remote() else {
            return false;
        };
        match (&self.tracking.squash_hash, &remote.current_revision) {
            (Some(squashed), Some(current)) => squashed != current,
            _ => false,
        }
    }

    /// Returns both divergence predicates.
    pub fn divergence(&self) -> DivergenceState {
        DivergenceState {
            unpushed: self.has_unpushed_local_work(),
            unpulled: self.has_unpulled_remote_work(),
        }
    }
}
