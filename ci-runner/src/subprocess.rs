//! Subprocess helpers for build steps.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(600);

pub struct CheckOutput {
    pub success: bool,
    pub combined: String,
}

/// Whether `name` resolves to an executable on PATH.
pub fn tool_on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(name).is_file())
}

/// Runs a tool and collects its output. `None` when the tool is not on
/// PATH; the caller decides whether that skips the step or fails the
/// report.
pub async fn run_collect(dir: &Path, program: &str, args: &[&str]) -> Option<CheckOutput> {
    if !tool_on_path(program) {
        debug!(program, "tool not on PATH");
        return None;
    }
    let mut command = Command::new(program);
    command.args(args).current_dir(dir).kill_on_drop(true);
    match tokio::time::timeout(SUBPROCESS_TIMEOUT, command.output()).await {
        Ok(Ok(out)) => Some(CheckOutput {
            success: out.status.success(),
            combined: format!(
                "{}{}",
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            ),
        }),
        Ok(Err(e)) => Some(CheckOutput {
            success: false,
            combined: format!("{program}: spawn failed: {e}"),
        }),
        Err(_) => Some(CheckOutput {
            success: false,
            combined: format!("{program}: timed out"),
        }),
    }
}
