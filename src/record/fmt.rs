//! Contains the formatting logic for [BranchRecord]s and their statuses.

use super::{BranchRecord, BranchStatus, ChangeStatus, StatusNotes, VoteTally};
use crate::constants::{BRANCH_COLOR, UNPULLED_MARKER, UNPUSHED_MARKER, URL_COLOR};
use itertools::Itertools;
use nu_ansi_term::Color;
use std::fmt::{self, Display, Write};

impl StatusNotes {
    /// Renders the notes as a parenthesized suffix, or an empty string if there are none.
    fn suffix(&self) -> String {
        let notes = [
            self.wip.then_some("WIP"),
            self.approved.then_some("LGTM"),
            self.pending_reviewers.then_some("unsent reviewers"),
        ];
        let rendered = notes.into_iter().flatten().join(", ");
        if rendered.is_empty() {
            rendered
        } else {
            format!(" ({rendered})")
        }
    }
}

impl Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged => write!(f, "Merged"),
            Self::Abandoned => write!(f, "Abandoned"),
            Self::Conflict(notes) => write!(f, "Merge conflict{}", notes.suffix()),
            Self::Wip => write!(f, "WIP"),
            Self::Active(notes) => write!(f, "Active{}", notes.suffix()),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

impl Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untracked => write!(f, "untracked"),
            Self::Pending => write!(f, "tracked"),
            Self::NotFound => write!(f, "not found"),
            Self::Change(status) => Display::fmt(status, f),
        }
    }
}

impl BranchStatus {
    /// The color a status is rendered in.
    pub fn color(&self) -> Color {
        match self {
            Self::Untracked | Self::Pending => Color::DarkGray,
            Self::NotFound => Color::LightRed,
            Self::Change(ChangeStatus::Conflict(_)) => Color::Red,
            Self::Change(ChangeStatus::Wip) => Color::Yellow,
            Self::Change(ChangeStatus::Active(_)) => Color::Green,
            Self::Change(ChangeStatus::Merged) => Color::Purple,
            Self::Change(ChangeStatus::Abandoned) => Color::DarkGray,
            Self::Change(ChangeStatus::Other(_)) => Color::White,
        }
    }
}

impl VoteTally {
    /// Renders the vote counts as `+P/-N`, or [None] if nobody voted.
    fn counts(&self) -> Option<String> {
        (self.positive > 0 || self.negative > 0)
            .then(|| format!("+{}/-{}", self.positive, self.negative))
    }
}

impl BranchRecord {
    /// The uploaded patchset and the votes on the change, e.g. `ps3 +2/-1`.
    fn review_summary(&self) -> Option<String> {
        let patchset = self.tracking.patchset.map(|p| format!("ps{p}"));
        let votes = self.remote().and_then(|remote| remote.votes.counts());
        let summary = [patchset, votes].into_iter().flatten().join(" ");
        (!summary.is_empty()).then_some(summary)
    }

    /// Writes a single, colored log-line for the record to the given [Write]r.
    ///
    /// The line holds the divergence markers, the branch name, its status, the uploaded patchset
    /// and vote counts if known, the local commit time, and the change URL if the branch is
    /// tracked.
    pub fn write_line<W: Write>(&self, w: &mut W) -> fmt::Result {
        let divergence = self.divergence();
        let markers = format!(
            "{}{}",
            if divergence.unpushed { UNPUSHED_MARKER } else { ' ' },
            if divergence.unpulled { UNPULLED_MARKER } else { ' ' },
        );
        let status = self.status();
        let committed = self
            .local
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| self.local.raw_timestamp.clone());

        write!(
            w,
            "{} {} {}",
            markers,
            BRANCH_COLOR.paint(&self.name),
            status.color().paint(status.to_string()),
        )?;
        if let Some(summary) = self.review_summary() {
            write!(w, " {}", Color::Cyan.paint(summary))?;
        }
        write!(w, " {}", Color::DarkGray.paint(committed))?;
        if let Some(url) = self.tracking.change_url() {
            write!(w, " {}", URL_COLOR.italic().paint(url))?;
        }
        writeln!(w)
    }
}
