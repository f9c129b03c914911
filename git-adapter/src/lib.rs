//! Git adapter: repository access over a local bare-mirror cache.
//!
//! Every operation runs against a bare mirror kept under the cache
//! directory, keyed by `md5(url)[:12]`. The first touch of a URL creates
//! the mirror; later calls reuse it. `checkout` materialises a scoped
//! worktree whose directory is removed when the handle drops.

use std::path::{Path, PathBuf};

use git2::{ObjectType, Repository};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum GitAdapterError {
    /// Missing path, non-file object, or unknown ref target.
    #[error("not found: {0}")]
    NotFound(String),

    /// Ref or revision spec the repository cannot resolve.
    #[error("invalid ref: {0}")]
    InvalidRef(String),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for adapter operations.
pub type Result<T> = std::result::Result<T, GitAdapterError>;

/// A materialised checkout. The working directory lives only as long as
/// this handle.
#[derive(Debug)]
pub struct Checkout {
    workdir: TempDir,
    pub commit_sha: String,
}

impl Checkout {
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }
}

/// Health snapshot of the adapter.
#[derive(Clone, Debug)]
pub struct AdapterHealth {
    pub cache_dir: PathBuf,
    pub mirrors: usize,
}

pub struct GitAdapter {
    cache_dir: PathBuf,
}

impl GitAdapter {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Builds the adapter from `GIT_CACHE` (default `/var/git-cache`).
    pub fn from_env() -> Self {
        let dir = std::env::var("GIT_CACHE").unwrap_or_else(|_| "/var/git-cache".to_string());
        Self::new(dir)
    }

    fn mirror_path(&self, url: &str) -> PathBuf {
        let digest = format!("{:x}", md5::compute(url.as_bytes()));
        self.cache_dir.join(format!("{}.git", &digest[..12]))
    }

    /// Opens the mirror for `url`, creating the bare clone on first use.
    /// Existing mirrors are refreshed so recently pushed branches resolve.
    fn ensure_mirror(&self, url: &str) -> Result<Repository> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let path = self.mirror_path(url);
        if !path.exists() {
            info!(url, path = %path.display(), "mirroring repository");
            let mut builder = git2::build::RepoBuilder::new();
            builder.bare(true);
            builder.clone(url, &path)?;
            return Ok(Repository::open(&path)?);
        }

        let repo = Repository::open(&path)?;
        {
            let mut remote = repo.find_remote("origin")?;
            if let Err(e) = remote.fetch(
                &["+refs/heads/*:refs/heads/*"] as &[&str],
                None,
                None,
            ) {
                warn!(url, error = %e, "mirror refresh failed, using cached state");
            }
        }
        Ok(repo)
    }

    /// Materialises `ref` into a fresh scoped worktree.
    #[instrument(skip(self))]
    pub fn checkout(&self, url: &str, reference: &str) -> Result<Checkout> {
        let mirror = self.ensure_mirror(url)?;
        let commit = mirror
            .revparse_single(reference)
            .map_err(|_| GitAdapterError::InvalidRef(reference.to_string()))?
            .peel_to_commit()
            .map_err(|_| GitAdapterError::InvalidRef(reference.to_string()))?;
        let sha = commit.id().to_string();

        let workdir = TempDir::new()?;
        let mirror_url = mirror
            .path()
            .to_str()
            .ok_or_else(|| GitAdapterError::NotFound("mirror path not utf-8".to_string()))?
            .to_string();
        let clone = Repository::clone(&mirror_url, workdir.path())?;
        let oid = git2::Oid::from_str(&sha)?;
        clone.set_head_detached(oid)?;
        clone.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;

        debug!(sha = %sha, "checkout materialised");
        Ok(Checkout {
            workdir,
            commit_sha: sha,
        })
    }

    /// Reads one file at `ref`. `NotFound` for missing paths and non-file
    /// objects, matching the RPC surface's 404 semantics.
    pub fn read_file(&self, url: &str, reference: &str, path: &str) -> Result<Vec<u8>> {
        let mirror = self.ensure_mirror(url)?;
        let spec = format!("{reference}:{path}");
        let object = mirror
            .revparse_single(&spec)
            .map_err(|_| GitAdapterError::NotFound(format!("{path} not found at {reference}")))?;
        match object.kind() {
            Some(ObjectType::Blob) => {
                let blob = object
                    .peel_to_blob()
                    .map_err(|_| GitAdapterError::NotFound(format!("{path} is not a file")))?;
                Ok(blob.content().to_vec())
            }
            _ => Err(GitAdapterError::NotFound(format!("{path} is not a file"))),
        }
    }

    /// Unified diff between two revisions.
    pub fn diff(&self, url: &str, base: &str, head: &str) -> Result<String> {
        let mirror = self.ensure_mirror(url)?;
        let base_tree = mirror
            .revparse_single(base)
            .map_err(|_| GitAdapterError::InvalidRef(base.to_string()))?
            .peel_to_commit()?
            .tree()?;
        let head_tree = mirror
            .revparse_single(head)
            .map_err(|_| GitAdapterError::InvalidRef(head.to_string()))?
            .peel_to_commit()?
            .tree()?;

        let diff = mirror.diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)?;
        let mut out = Vec::new();
        diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
            match line.origin() {
                '+' | '-' | ' ' => out.push(line.origin() as u8),
                _ => {}
            }
            out.extend_from_slice(line.content());
            true
        })?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Blame: the final commit SHA for every line of `path` at `ref`.
    pub fn blame(&self, url: &str, reference: &str, path: &str) -> Result<Vec<String>> {
        let mirror = self.ensure_mirror(url)?;
        let commit = mirror
            .revparse_single(reference)
            .map_err(|_| GitAdapterError::InvalidRef(reference.to_string()))?
            .peel_to_commit()?;

        let mut opts = git2::BlameOptions::new();
        opts.newest_commit(commit.id());
        let blame = mirror
            .blame_file(Path::new(path), Some(&mut opts))
            .map_err(|_| GitAdapterError::NotFound(format!("{path} not found at {reference}")))?;

        let mut shas = Vec::new();
        for hunk in blame.iter() {
            let sha = hunk.final_commit_id().to_string();
            for _ in 0..hunk.lines_in_hunk() {
                shas.push(sha.clone());
            }
        }
        Ok(shas)
    }

    /// Liveness probe reporting the cache directory and mirror count.
    pub fn health(&self) -> Result<AdapterHealth> {
        let mirrors = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().map(|x| x == "git").unwrap_or(false))
                .count(),
            Err(_) => 0,
        };
        Ok(AdapterHealth {
            cache_dir: self.cache_dir.clone(),
            mirrors,
        })
    }
}
