//! Self-check battery: formatter → lint → fast tests, fail-fast.
//!
//! A sub-check whose tool is missing from PATH is skipped. When the tree
//! holds no source files of the relevant kind, the battery vacuously
//! passes.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Default ceiling for any single subprocess.
const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(600);

/// Whether `name` resolves to an executable on PATH.
pub fn tool_on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(name);
        candidate.is_file()
    })
}

fn has_python_sources(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| e.path().extension().map(|x| x == "py").unwrap_or(false))
}

/// One sub-check: `None` when skipped, `Some((ok, output))` otherwise.
async fn run_check(dir: &Path, program: &str, args: &[&str]) -> Option<(bool, String)> {
    if !tool_on_path(program) {
        debug!(program, "tool not on PATH, sub-check skipped");
        return None;
    }
    let mut command = Command::new(program);
    command.args(args).current_dir(dir).kill_on_drop(true);
    match tokio::time::timeout(SUBPROCESS_TIMEOUT, command.output()).await {
        Ok(Ok(out)) => {
            let combined = format!(
                "{} {}: {}\n{}",
                program,
                args.join(" "),
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            );
            Some((out.status.success(), combined))
        }
        Ok(Err(e)) => Some((false, format!("{program}: spawn failed: {e}"))),
        Err(_) => Some((false, format!("{program}: timed out"))),
    }
}

/// Runs the battery in order, stopping at the first failure.
/// Returns `(passed, notes)`; notes carry the failing output.
pub async fn run_battery(dir: &Path, pytest_mark: &str) -> (bool, Vec<String>) {
    if !has_python_sources(dir) {
        info!("no python sources, battery vacuously passes");
        return (true, Vec::new());
    }

    let mut notes = Vec::new();

    if let Some((ok, out)) = run_check(dir, "black", &["--check", "."]).await {
        if !ok {
            warn!("formatter check failed");
            notes.push(out);
            return (false, notes);
        }
    }

    if let Some((ok, out)) = run_check(dir, "ruff", &["check", "."]).await {
        if !ok {
            warn!("lint check failed");
            notes.push(out);
            return (false, notes);
        }
    }

    let has_pytest_config =
        dir.join("pytest.ini").exists() || dir.join("pyproject.toml").exists();
    if has_pytest_config {
        if let Some((ok, out)) =
            run_check(dir, "pytest", &["-q", "-m", pytest_mark, "--tb=short"]).await
        {
            if !ok {
                warn!("fast test subset failed");
                notes.push(out);
                return (false, notes);
            }
        }
    }

    (true, notes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_tools_resolve_and_garbage_does_not() {
        // `sh` exists on any unix PATH worth the name
        assert!(tool_on_path("sh"));
        assert!(!tool_on_path("definitely-not-a-real-tool-name"));
    }

    #[tokio::test]
    async fn battery_vacuously_passes_without_python_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "# hi\n").unwrap();
        let (ok, notes) = run_battery(dir.path(), "fast").await;
        assert!(ok);
        assert!(notes.is_empty());
    }
}
