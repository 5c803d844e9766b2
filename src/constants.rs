//! Constants for the `bst` application.

use nu_ansi_term::Color;

/// Name of the read-only configuration file, resolved relative to the repository's git directory.
pub(crate) const BST_CONFIG_FILE_NAME: &str = "bst.toml";

/// Maximum number of change queries the review server accepts in a single request.
pub(crate) const MAX_BATCH_SIZE: usize = 10;

/// Anti-XSSI marker the review server prepends to every JSON body.
pub(crate) const XSSI_PREFIX: &str = ")]}'";

/// Default bound on simultaneously open HTTP requests.
pub(crate) const DEFAULT_MAX_IN_FLIGHT: usize = 32;

/// Tracking keys written into `branch.<name>.<field>` when a branch is uploaded for review.
pub(crate) const TRACKING_FIELDS: [&str; 5] = [
    "gerritissue",
    "gerritserver",
    "gerritpatchset",
    "gerritsquashhash",
    "last-upload-hash",
];

pub(crate) const BRANCH_COLOR: Color = Color::Green;
pub(crate) const URL_COLOR: Color = Color::Cyan;

pub(crate) const UNPUSHED_MARKER: char = '↑';
pub(crate) const UNPULLED_MARKER: char = '↓';
