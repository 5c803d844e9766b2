//! Errors that abort a `bst` run.
//!
//! Only fatal failures are represented here. Recoverable failures (a failed remote batch, an
//! unparseable line of `git` output, a missing tracking key) are absorbed where they happen and
//! logged, so that one failing unit of work never discards the results of its siblings.

use nu_ansi_term::Color;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BstError {
    /// The working directory is not inside a git repository.
    #[error("Not in a git repository.")]
    NotARepository,
    /// A bulk `git` query that the run depends on exited unsuccessfully.
    #[error("`git {}` failed: {}", Color::Blue.paint(.command), .stderr.trim())]
    RepositoryError { command: String, stderr: String },
    /// Spawning a subprocess or reading a file failed.
    #[error("io error: {}", .0)]
    Io(#[from] std::io::Error),
    /// The configuration file could not be parsed.
    #[error("invalid configuration: {}", .0)]
    Config(#[from] toml::de::Error),
}

pub type BstResult<T> = Result<T, BstError>;

/// A failed request to the review server.
///
/// Never escapes the remote client: it is logged and the affected identifiers resolve to nothing.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The request could not be sent or its body could not be read.
    #[error("request failed: {}", .0)]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-2xx status.
    #[error("server returned {}", .0)]
    Status(reqwest::StatusCode),
    /// The body was not the expected JSON.
    #[error("malformed response: {}", .0)]
    Json(#[from] serde_json::Error),
}
