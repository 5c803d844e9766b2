//! Read-only configuration for `bst`, stored next to the repository's git metadata.

use crate::{
    constants::{BST_CONFIG_FILE_NAME, DEFAULT_MAX_IN_FLIGHT},
    errors::BstResult,
    sort::{Direction, SortField},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The configuration for a repository. Every key is optional.
#[derive(Default, Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// How records are ordered when no flags say otherwise.
    pub display: DisplayConfig,
    /// How the review server is queried.
    pub remote: RemoteConfig,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DisplayConfig {
    pub sort: SortField,
    pub descending: bool,
}

impl DisplayConfig {
    pub fn direction(&self) -> Direction {
        if self.descending {
            Direction::Descending
        } else {
            Direction::Ascending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RemoteConfig {
    /// Upper bound on simultaneously open HTTP requests.
    pub max_in_flight: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Returns the path to the [Config] for the repository whose git directory is `git_dir`.
pub fn config_path(git_dir: &Path) -> PathBuf {
    git_dir.join(BST_CONFIG_FILE_NAME)
}

impl Config {
    /// Loads the [Config] at `path`, falling back to the defaults if the file does not exist.
    ///
    /// ## Returns
    /// - `Ok(config)` - The loaded or default configuration.
    /// - `Err(_)` - If the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> BstResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }

        let config: Self = toml::from_str(&std::fs::read_to_string(path)?)?;
        Ok(config)
    }
}
