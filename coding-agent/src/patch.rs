//! Unified-diff validation and application.
//!
//! The outcome of a patch attempt is a tagged value, never an exception
//! path: the retry loop matches on it. Validation happens in-process before
//! the tree is touched; application goes through `git apply`.

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Result of one patch attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The text is not a well-formed unified diff.
    InvalidDiff(String),
    /// Structurally fine, but the working tree rejected it.
    RejectedByTree(String),
    /// `git` is not on PATH.
    ToolMissing,
}

fn hunk_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^@@ -\d+(,\d+)? \+\d+(,\d+)? @@").expect("valid literal pattern")
    })
}

/// Structural well-formedness check for a unified diff.
pub fn validate_diff(diff: &str) -> Result<(), String> {
    if diff.trim().is_empty() {
        return Err("empty diff".to_string());
    }
    let has_old = diff.lines().any(|l| l.starts_with("--- "));
    let has_new = diff.lines().any(|l| l.starts_with("+++ "));
    if !has_old || !has_new {
        return Err("missing ---/+++ file headers".to_string());
    }
    if !hunk_header().is_match(diff) {
        return Err("no parseable @@ hunk header".to_string());
    }

    // Hunk bodies may only carry context, additions, removals, or the
    // no-newline marker.
    let mut in_hunk = false;
    for line in diff.lines() {
        if hunk_header().is_match(line) {
            in_hunk = true;
            continue;
        }
        if line.starts_with("--- ") || line.starts_with("+++ ") || line.starts_with("diff ") {
            in_hunk = false;
            continue;
        }
        if in_hunk
            && !line.is_empty()
            && !matches!(line.as_bytes()[0], b' ' | b'+' | b'-' | b'\\')
        {
            return Err(format!("unexpected hunk line: {line:.60}"));
        }
    }
    Ok(())
}

/// Validates and applies a diff to the working tree at `workdir`.
pub async fn apply_patch(workdir: &Path, diff: &str) -> ApplyOutcome {
    if let Err(reason) = validate_diff(diff) {
        warn!(reason = %reason, "patch rejected before apply");
        return ApplyOutcome::InvalidDiff(reason);
    }

    let mut payload = diff.to_string();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }

    let spawned = Command::new("git")
        .args(["apply", "--whitespace=nowarn", "-"])
        .current_dir(workdir)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ApplyOutcome::ToolMissing,
        Err(e) => return ApplyOutcome::RejectedByTree(e.to_string()),
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(payload.as_bytes()).await {
            return ApplyOutcome::RejectedByTree(format!("stdin write failed: {e}"));
        }
    }

    match child.wait_with_output().await {
        Ok(out) if out.status.success() => {
            debug!("patch applied");
            ApplyOutcome::Applied
        }
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            warn!(stderr = %stderr, "patch rejected by tree");
            ApplyOutcome::RejectedByTree(stderr)
        }
        Err(e) => ApplyOutcome::RejectedByTree(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selfcheck::tool_on_path;

    const VALID: &str = "--- a/test.txt\n+++ b/test.txt\n@@ -1 +1,2 @@\n Hello\n+World\n";

    #[test]
    fn well_formed_diff_validates() {
        assert!(validate_diff(VALID).is_ok());
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(validate_diff("not a diff").is_err());
        assert!(validate_diff("").is_err());
        assert!(validate_diff("--- a/x\n+++ b/x\nno hunks here\n").is_err());
    }

    #[tokio::test]
    async fn invalid_diff_never_reaches_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = apply_patch(dir.path(), "not a diff").await;
        assert!(matches!(outcome, ApplyOutcome::InvalidDiff(_)));
    }

    #[tokio::test]
    async fn applies_to_a_matching_tree() {
        if !tool_on_path("git") {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.txt"), "Hello\n").unwrap();

        let outcome = apply_patch(dir.path(), VALID).await;
        assert_eq!(outcome, ApplyOutcome::Applied);
        let content = std::fs::read_to_string(dir.path().join("test.txt")).unwrap();
        assert_eq!(content, "Hello\nWorld\n");
    }

    #[tokio::test]
    async fn mismatched_context_is_rejected_by_tree() {
        if !tool_on_path("git") {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.txt"), "entirely different\n").unwrap();

        let outcome = apply_patch(dir.path(), VALID).await;
        assert!(matches!(outcome, ApplyOutcome::RejectedByTree(_)));
    }
}
