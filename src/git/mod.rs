//! Utilities for interacting with `git` repositories for the `bst` application.

use crate::errors::{BstError, BstResult};
use async_trait::async_trait;
use git2::Repository;
use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::Command;

mod cache;
pub(crate) use cache::CommandCache;

mod reader;
pub(crate) use reader::{LocalMetadata, LocalMetadataReader};

/// Returns the repository for the current working directory, and [None] if
/// the current working directory is not within a git repository or an error
/// occurs.
pub fn active_repository() -> Option<Repository> {
    Repository::discover(env::current_dir().ok()?).ok()
}

/// Resolves the directory that bulk `git` queries should run in, along with the repository's
/// `.git` directory.
///
/// ## Takes
/// - `repository` - The discovered repository.
///
/// ## Returns
/// - `(workdir, git_dir)` - For bare repositories, both paths are the git directory.
pub fn repository_paths(repository: &Repository) -> (PathBuf, PathBuf) {
    let git_dir = repository.path().to_path_buf();
    let workdir = repository
        .workdir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| git_dir.clone());
    (workdir, git_dir)
}

/// The captured result of a single `git` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// The process's exit code, if it exited normally.
    pub code: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

/// An executor for `git` subcommands.
///
/// The reader only ever talks to `git` through this trait so that tests can count invocations
/// and substitute canned output.
#[async_trait]
pub trait GitExec: Send + Sync {
    /// Runs `git` with the given arguments and captures its output.
    async fn run(&self, args: &[&str]) -> BstResult<GitOutput>;
}

/// Runs the system `git` binary inside a fixed working directory.
#[derive(Debug, Clone)]
pub struct SystemGit {
    workdir: PathBuf,
}

impl SystemGit {
    /// Creates a new [SystemGit] rooted at `workdir`.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl GitExec for SystemGit {
    async fn run(&self, args: &[&str]) -> BstResult<GitOutput> {
        tracing::debug!(?args, workdir = %self.workdir.display(), "spawning git");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(BstError::Io)?;

        Ok(GitOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
