//! Bulk retrieval of branch, commit, and review tracking metadata from the local repository.
//!
//! Every query covers all branches at once, so the number of `git` processes spawned per run is
//! constant no matter how many branches the repository has.

use super::{CommandCache, GitExec, GitOutput};
use crate::{
    constants::TRACKING_FIELDS,
    errors::{BstError, BstResult},
    record::{LocalCommitFacts, ReviewTrackingConfig},
};
use std::{collections::HashMap, sync::Arc};

const BRANCH_LIST_FORMAT: &str = "--format=%(refname:lstrip=2)";
const COMMIT_FACTS_FORMAT: &str =
    "--format=%(refname:lstrip=2)|%(objectname)|%(committerdate:iso-strict)";
const LOCAL_BRANCHES: &str = "refs/heads/";

/// Everything the local repository knows about its branches.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct LocalMetadata {
    /// Local branch names, in the order `git` lists them.
    pub branches: Vec<String>,
    /// The head commit of each branch whose `for-each-ref` line parsed.
    pub commits: HashMap<String, LocalCommitFacts>,
    /// The tracking config of every listed branch. Untracked branches map to an all-[None] config.
    pub tracking: HashMap<String, ReviewTrackingConfig>,
}

/// Reads [LocalMetadata] through a [GitExec], memoizing each distinct invocation.
///
/// The cache belongs to the reader, so independent readers never share results.
pub struct LocalMetadataReader {
    exec: Arc<dyn GitExec>,
    cache: CommandCache,
}

impl LocalMetadataReader {
    /// Creates a new [LocalMetadataReader] with an empty cache.
    pub fn new(exec: Arc<dyn GitExec>) -> Self {
        Self {
            exec,
            cache: CommandCache::new(),
        }
    }

    /// Reads the branch list, then the commit facts and tracking config concurrently.
    ///
    /// ## Returns
    /// - `Ok(metadata)` - The local metadata.
    /// - `Err(_)` - If the branch list or the commit facts could not be queried. Nothing remote
    ///              should be attempted in that case.
    pub async fn read(&self) -> BstResult<LocalMetadata> {
        let branches = self.branch_names().await?;
        let (commits, tracking) =
            tokio::join!(self.commit_facts(), self.tracking_configs(&branches));
        let commits = commits?;

        for branch in branches.iter().filter(|b| !commits.contains_key(*b)) {
            tracing::warn!(%branch, "no commit facts for branch; skipping");
        }

        Ok(LocalMetadata {
            branches,
            commits,
            tracking,
        })
    }

    /// Lists the names of all local branches.
    pub async fn branch_names(&self) -> BstResult<Vec<String>> {
        let args = ["for-each-ref", BRANCH_LIST_FORMAT, LOCAL_BRANCHES];
        let output = self.run_checked(&args).await?;

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect())
    }

    /// Fetches the head commit hash and committer timestamp of every local branch.
    pub async fn commit_facts(&self) -> BstResult<HashMap<String, LocalCommitFacts>> {
        let args = ["for-each-ref", COMMIT_FACTS_FORMAT, LOCAL_BRANCHES];
        let output = self.run_checked(&args).await?;
        Ok(parse_commit_facts(&output.stdout))
    }

    /// Fetches the review tracking config of the given branches.
    ///
    /// Never fails: if `git config` errors or finds nothing, every branch is untracked.
    pub async fn tracking_configs(
        &self,
        branches: &[String],
    ) -> HashMap<String, ReviewTrackingConfig> {
        let pattern = format!(r"^branch\..*\.({})$", TRACKING_FIELDS.join("|"));
        let args = ["config", "--get-regexp", pattern.as_str()];

        let mut parsed = match self.cache.get_or_run(self.exec.as_ref(), &args).await {
            Ok(output) if output.success => parse_tracking_config(&output.stdout),
            Ok(output) => {
                // `git config --get-regexp` exits with 1 when nothing matches.
                if output.code != Some(1) {
                    tracing::warn!(stderr = %output.stderr.trim(), "tracking config query failed");
                }
                HashMap::new()
            }
            Err(err) => {
                tracing::warn!(%err, "tracking config query failed");
                HashMap::new()
            }
        };

        branches
            .iter()
            .map(|branch| {
                let config = parsed.remove(branch).unwrap_or_default();
                (branch.clone(), config)
            })
            .collect()
    }

    /// Runs `args` through the cache, turning an unsuccessful exit into a
    /// [BstError::RepositoryError].
    async fn run_checked(&self, args: &[&str]) -> BstResult<Arc<GitOutput>> {
        let output = self.cache.get_or_run(self.exec.as_ref(), args).await?;
        if !output.success {
            return Err(BstError::RepositoryError {
                command: args.join(" "),
                stderr: output.stderr.clone(),
            });
        }
        Ok(output)
    }
}

/// Parses `name|hash|timestamp` lines. Lines without exactly three non-empty fields are skipped.
pub(crate) fn parse_commit_facts(stdout: &str) -> HashMap<String, LocalCommitFacts> {
    stdout
        .lines()
        .filter_map(|line| {
            let fields = line.trim_end().split('|').collect::<Vec<_>>();
            match fields.as_slice() {
                [name, hash, timestamp]
                    if !name.is_empty() && !hash.is_empty() && !timestamp.is_empty() =>
                {
                    Some((name.to_string(), LocalCommitFacts::new(*hash, *timestamp)))
                }
                _ => {
                    tracing::debug!(%line, "skipping malformed commit facts line");
                    None
                }
            }
        })
        .collect()
}

/// Parses `branch.<name>.<field> <value>` lines into per-branch tracking configs.
///
/// Branch names may themselves contain dots, so the field is split off the right-hand side.
/// Unknown fields and malformed keys are skipped.
pub(crate) fn parse_tracking_config(stdout: &str) -> HashMap<String, ReviewTrackingConfig> {
    let mut configs = HashMap::<String, ReviewTrackingConfig>::new();

    for line in stdout.lines() {
        let Some((key, value)) = line.split_once(' ') else {
            tracing::debug!(%line, "skipping config line without a value");
            continue;
        };
        let Some((branch, field)) = key
            .strip_prefix("branch.")
            .and_then(|rest| rest.rsplit_once('.'))
            .filter(|(branch, _)| !branch.is_empty())
        else {
            tracing::debug!(%key, "skipping malformed tracking key");
            continue;
        };

        let value = value.trim_end().to_string();
        let config = configs.entry(branch.to_string()).or_default();
        match field {
            "gerritissue" => config.issue_id = Some(value),
            "gerritserver" => config.server_url = Some(value),
            "gerritpatchset" => match value.parse() {
                Ok(patchset) => config.patchset = Some(patchset),
                Err(_) => tracing::warn!(%branch, %value, "ignoring non-numeric patchset"),
            },
            "gerritsquashhash" => config.squash_hash = Some(value),
            "last-upload-hash" => config.last_upload_hash = Some(value),
            _ => tracing::debug!(%key, "skipping unrecognized tracking field"),
        }
    }

    configs
}
