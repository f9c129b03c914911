//! Scoped working trees and the branch/commit/push plumbing.

use std::path::Path;

use git2::Repository;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::errors::AgentError;

/// Clones the target repo into a scoped temp dir. The directory is deleted
/// when the returned `TempDir` drops, whatever the exit path was.
pub fn materialise(cfg: &AgentConfig) -> Result<(TempDir, Repository), AgentError> {
    let workdir = match &cfg.scratch_root {
        Some(root) => TempDir::new_in(root)?,
        None => TempDir::new()?,
    };

    // A warm local cache becomes the clone source; origin is re-pointed at
    // the real remote so pushes land where they must.
    let (source, from_cache) = match &cfg.cache_ref {
        Some(cache) if cache.exists() => {
            info!(cache = %cache.display(), "cloning from local reference cache");
            (cache.to_string_lossy().into_owned(), true)
        }
        _ => (cfg.remote_repo.clone(), false),
    };

    let mut builder = git2::build::RepoBuilder::new();
    builder.branch(&cfg.remote_branch);
    if let Some(depth) = cfg.clone_depth {
        let mut fetch = git2::FetchOptions::new();
        fetch.depth(depth);
        builder.fetch_options(fetch);
    }
    let repo = builder.clone(&source, workdir.path())?;

    if from_cache {
        repo.remote_set_url("origin", &cfg.remote_repo)?;
    }

    debug!(workdir = %workdir.path().display(), "working tree materialised");
    Ok((workdir, repo))
}

/// Creates `branch_name` at HEAD, stages everything, and commits.
/// Returns the new commit SHA.
pub fn commit_all(repo: &Repository, branch_name: &str, message: &str) -> Result<String, AgentError> {
    let head = repo.head()?.peel_to_commit()?;
    // force: a retry after a failed push re-targets the same branch
    repo.branch(branch_name, &head, true)?;
    repo.set_head(&format!("refs/heads/{branch_name}"))?;

    let mut index = repo.index()?;
    index.add_all(["*"], git2::IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree = repo.find_tree(index.write_tree()?)?;

    let sig = git2::Signature::now("forge-agent", "agent@forge-pipeline")?;
    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&head])?;
    info!(branch = branch_name, sha = %oid, "committed");
    Ok(oid.to_string())
}

/// Pushes `branch_name` to origin.
pub fn push_branch(repo: &Repository, branch_name: &str) -> Result<(), AgentError> {
    let mut remote = repo.find_remote("origin")?;
    let refspec = format!("refs/heads/{branch_name}:refs/heads/{branch_name}");
    remote.push(&[refspec.as_str()], None).map_err(|e| {
        warn!(branch = branch_name, error = %e, "push failed");
        AgentError::Git(e)
    })?;
    Ok(())
}

/// Truncates `text` to at most `cap` characters on a char boundary.
pub fn cap_chars(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_respects_char_boundaries() {
        assert_eq!(cap_chars("hello", 3), "hel");
        assert_eq!(cap_chars("héllo", 2), "hé");
        assert_eq!(cap_chars("short", 100), "short");
    }
}
