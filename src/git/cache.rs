//! Per-run memoization of `git` invocations.

use super::{GitExec, GitOutput};
use crate::errors::BstResult;
use dashmap::DashMap;
use std::sync::Arc;

/// The key under which a `git` invocation is memoized.
///
/// Arguments are joined with a NUL byte, which cannot appear inside a process argument, so two
/// distinct argument lists never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the [CacheKey] for the given argument list.
    pub fn new(args: &[&str]) -> Self {
        Self(args.join("\0"))
    }
}

/// A write-once-per-key store of `git` outputs.
///
/// The repository is assumed static for the duration of a run, so entries are never invalidated.
/// Two callers racing on the same key may both spawn `git`; the outputs are identical and the
/// last write wins.
#[derive(Debug, Default)]
pub struct CommandCache {
    entries: DashMap<CacheKey, Arc<GitOutput>>,
}

impl CommandCache {
    /// Creates an empty [CommandCache].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized output for `args`, running `git` through `exec` on a miss.
    ///
    /// ## Takes
    /// - `exec` - The executor to run `git` with on a cache miss.
    /// - `args` - The arguments to pass to `git`.
    ///
    /// ## Returns
    /// - `Ok(output)` - The captured output, successful or not.
    /// - `Err(_)` - If the process could not be spawned. Spawn failures are not cached.
    pub async fn get_or_run(&self, exec: &dyn GitExec, args: &[&str]) -> BstResult<Arc<GitOutput>> {
        let key = CacheKey::new(args);
        if let Some(hit) = self.entries.get(&key) {
            tracing::trace!(?args, "git cache hit");
            return Ok(Arc::clone(hit.value()));
        }

        let output = Arc::new(exec.run(args).await?);
        self.entries.insert(key, Arc::clone(&output));
        Ok(output)
    }

    /// Returns the number of memoized invocations.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
