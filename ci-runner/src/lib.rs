//! CI runner: one `BuildReport` per successful commit.
//!
//! For each `CommitResult{SUCCESS}` the runner clones the repo at the
//! result's branch, checks out the exact SHA, installs dependencies from
//! the project's manifest, collects formatter and linter output, runs the
//! marked test subset with a JSON coverage report, and tars the tree into
//! `<artefact_root>/<sha>.tar.gz`. A report is `PASSED` iff formatter,
//! linter, and tests all ran and exited zero; a verification tool missing
//! from PATH fails the report with a note, since a pass must carry real
//! evidence. A missing coverage file reads as 0.0.

mod config;
mod subprocess;

pub use config::CiConfig;

use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use git_adapter::GitAdapter;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use event_bus::{Subscription, TypedPublisher, decode_or_skip};
use pipeline_contracts::{BuildReport, BuildStatus, CommitResult, CommitStatus, topics};
use subprocess::{run_collect, tool_on_path};

#[derive(Debug, Error)]
pub enum CiError {
    #[error("git error: {0}")]
    Git(#[from] git_adapter::GitAdapterError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bus error: {0}")]
    Bus(#[from] event_bus::BusError),
}

pub struct CiRunner {
    cfg: CiConfig,
    git: GitAdapter,
    publisher: TypedPublisher,
}

impl CiRunner {
    pub fn new(cfg: CiConfig, git: GitAdapter, publisher: TypedPublisher) -> Self {
        Self { cfg, git, publisher }
    }

    /// Consumes `commit.result.out` until the subscription is cancelled.
    /// Non-successful results are ignored.
    pub async fn run(&self, mut sub: Subscription) {
        info!("ci runner started");
        while let Some(msg) = sub.next().await {
            let Some(result) =
                decode_or_skip::<CommitResult>(self.publisher.registry(), &msg.topic, &msg.payload)
            else {
                continue;
            };
            if result.status != CommitStatus::Success {
                info!(task_id = %result.task_id, "skipping non-successful commit");
                continue;
            }

            match self.build(&result.commit_sha, &result.branch_name).await {
                Ok(report) => {
                    info!(
                        sha = %report.commit_sha,
                        status = ?report.status,
                        coverage = report.line_coverage,
                        "build finished"
                    );
                    if let Err(e) = self
                        .publisher
                        .send(topics::BUILD_REPORT_OUT, &report, msg.key.as_deref())
                        .await
                    {
                        warn!(error = %e, "report publish failed");
                    }
                }
                Err(e) => warn!(sha = %result.commit_sha, error = %e, "build errored"),
            }
        }
        info!("ci runner stopped");
    }

    /// Checks out, verifies, and archives one commit. Materialisation goes
    /// through the mirror-cached git adapter.
    #[instrument(skip(self))]
    pub async fn build(&self, commit_sha: &str, branch: &str) -> Result<BuildReport, CiError> {
        info!(branch, "materialising commit");
        let checkout = self.git.checkout(&self.cfg.remote_repo, commit_sha)?;
        let repo_dir = checkout.workdir().to_path_buf();

        self.install_dependencies(&repo_dir).await;

        // Formatting + linting: output collected, not fail-fast. A tool
        // missing from PATH is a failed check, not a skipped one: "not run"
        // cannot count as "exited zero".
        let mut lint_errors = Vec::new();
        for (program, args) in [
            ("black", ["--check", "."].as_slice()),
            ("ruff", ["check", "."].as_slice()),
        ] {
            match run_collect(&repo_dir, program, args).await {
                Some(out) if !out.success => lint_errors.push(out.combined),
                Some(_) => {}
                None => {
                    warn!(program, "verification tool not on PATH, failing the report");
                    lint_errors.push(format!("{program}: not on PATH, check not run"));
                }
            }
        }

        // Marked test subset with JSON coverage.
        let mark = format!("-m{}", self.cfg.pytest_mark);
        let mut failed_tests = Vec::new();
        let mut tests_passed = false;
        match run_collect(
            &repo_dir,
            "pytest",
            &["-q", &mark, "--cov", "--cov-report=json:cov.json"],
        )
        .await
        {
            Some(out) => {
                tests_passed = out.success;
                if !out.success {
                    failed_tests = out
                        .combined
                        .lines()
                        .filter(|l| l.contains("FAILED"))
                        .map(|l| l.to_string())
                        .collect();
                    if failed_tests.is_empty() {
                        failed_tests.push("test run exited non-zero".to_string());
                    }
                }
            }
            None => {
                warn!("pytest not on PATH, failing the report");
                failed_tests.push("pytest: not on PATH, tests not run".to_string());
            }
        }

        let line_coverage = read_coverage(&repo_dir.join("cov.json"));
        let artefact_url = self.archive(&repo_dir, commit_sha)?;

        let status = if lint_errors.is_empty() && failed_tests.is_empty() && tests_passed {
            BuildStatus::Passed
        } else {
            BuildStatus::Failed
        };

        Ok(BuildReport {
            commit_sha: commit_sha.to_string(),
            status,
            failed_tests,
            lint_errors,
            line_coverage,
            artefact_url,
        })
    }

    /// Installs dependencies from whatever manifest the project carries:
    /// `requirements.txt` via pip, else `pyproject.toml` via poetry
    /// (bootstrapped through pip when absent). Failures are logged; the
    /// build proceeds and the tests will tell.
    async fn install_dependencies(&self, repo_dir: &Path) {
        if repo_dir.join("requirements.txt").exists() {
            if !tool_on_path("pip") {
                debug!("pip not on PATH, skipping dependency install");
                return;
            }
            if let Some(out) =
                run_collect(repo_dir, "pip", &["install", "-r", "requirements.txt"]).await
            {
                if !out.success {
                    warn!("dependency install failed");
                }
            }
        } else if repo_dir.join("pyproject.toml").exists() {
            if !tool_on_path("poetry") && tool_on_path("pip") {
                if let Some(out) = run_collect(repo_dir, "pip", &["install", "poetry"]).await {
                    if !out.success {
                        warn!("poetry bootstrap failed");
                    }
                }
            }
            if !tool_on_path("poetry") {
                debug!("poetry not on PATH, skipping dependency install");
                return;
            }
            if let Some(out) = run_collect(repo_dir, "poetry", &["install", "--with", "ci"]).await
            {
                if !out.success {
                    warn!("dependency install failed");
                }
            }
        }
    }

    /// Tars the checked-out tree into `<artefact_root>/<sha>.tar.gz`.
    fn archive(&self, repo_dir: &Path, commit_sha: &str) -> Result<String, CiError> {
        std::fs::create_dir_all(&self.cfg.artefact_root)?;
        let artefact = self.cfg.artefact_root.join(format!("{commit_sha}.tar.gz"));
        let file = std::fs::File::create(&artefact)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut tar = tar::Builder::new(encoder);
        tar.append_dir_all("repo", repo_dir)?;
        tar.into_inner()?.finish()?;
        Ok(artefact.to_string_lossy().into_owned())
    }
}

/// `totals.percent_covered` from a pytest-cov JSON report; 0.0 when the
/// report is missing or unreadable.
fn read_coverage(path: &Path) -> f32 {
    let Ok(bytes) = std::fs::read(path) else {
        return 0.0;
    };
    serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|v| v["totals"]["percent_covered"].as_f64())
        .map(|f| f as f32)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::InMemoryBroker;
    use git2::Repository;
    use std::sync::Arc;

    fn fixture_remote(root: &Path) -> (String, String) {
        let work = root.join("work");
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(&work, &opts).unwrap();
        std::fs::write(work.join("README.md"), "# Demo\n").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("Test User", "test@example.com").unwrap();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();
        (work.to_str().unwrap().to_string(), oid.to_string())
    }

    fn runner(remote: &str, artefacts: &Path, mirror_cache: &Path) -> CiRunner {
        let cfg = CiConfig {
            remote_repo: remote.to_string(),
            pytest_mark: "fast".to_string(),
            artefact_root: artefacts.to_path_buf(),
        };
        let publisher = TypedPublisher::new(
            Arc::new(InMemoryBroker::new()),
            Arc::new(topics::codec_registry()),
            event_bus::BusConfig::default(),
        );
        CiRunner::new(cfg, GitAdapter::new(mirror_cache), publisher)
    }

    #[tokio::test]
    async fn build_produces_report_and_artefact() {
        let root = tempfile::tempdir().unwrap();
        let (remote, sha) = fixture_remote(root.path());
        let artefacts = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let runner = runner(&remote, artefacts.path(), cache.path());

        let report = runner.build(&sha, "main").await.unwrap();
        assert_eq!(report.commit_sha, sha);
        assert!(report.artefact_url.ends_with(&format!("{sha}.tar.gz")));
        assert!(Path::new(&report.artefact_url).exists());

        // the passed invariant: no failures recorded on a PASSED report
        if report.status == BuildStatus::Passed {
            assert!(report.failed_tests.is_empty());
            assert!(report.lint_errors.is_empty());
        }

        // a pass needs evidence: every missing verification tool must show
        // up as a recorded failure, never as a silent pass
        for (tool, bucket) in [
            ("black", &report.lint_errors),
            ("ruff", &report.lint_errors),
            ("pytest", &report.failed_tests),
        ] {
            if !tool_on_path(tool) {
                assert_eq!(report.status, BuildStatus::Failed);
                assert!(
                    bucket.iter().any(|n| n.contains(tool) && n.contains("not on PATH")),
                    "missing {tool} must be recorded in the report"
                );
            }
        }
    }

    #[tokio::test]
    async fn missing_coverage_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_coverage(&dir.path().join("cov.json")), 0.0);

        std::fs::write(
            dir.path().join("cov.json"),
            r#"{"totals": {"percent_covered": 87.5}}"#,
        )
        .unwrap();
        assert_eq!(read_coverage(&dir.path().join("cov.json")), 87.5);
    }
}
