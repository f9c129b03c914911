//! Coding agent: `CodingTask` → patched, committed, pushed branch.
//!
//! Each task gets a scoped working tree (deleted on every exit path), a
//! read-only context assembled from retrieval snippets (hard-capped at
//! 3000 chars), and up to `MAX_RETRIES + 1` attempts. An attempt asks the
//! LLM for `{diff, reasoning}` in JSON mode, validates and applies the
//! diff as a tagged outcome, runs the self-check battery, and on success
//! commits to `agt/<task.id>` and pushes. Failure notes feed the next
//! attempt's context so the model can correct itself.
//!
//! Outcome mapping: pass → `SUCCESS` (leases claimed, claim errors
//! swallowed with a log line); retries exhausted → `SOFT_FAIL` with the
//! last self-check output; anything escaping the loop → `HARD_FAIL`.

mod config;
mod errors;
pub mod patch;
mod prompt;
pub mod selfcheck;
mod workspace;

pub use config::AgentConfig;
pub use errors::AgentError;
pub use patch::ApplyOutcome;

use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use ai_llm_service::{ChatMessage, ChatOptions, LlmGateway};
use event_bus::{Subscription, TypedPublisher, decode_or_skip};
use pipeline_contracts::{CodingTask, CommitResult, TaskBundle, topics};
use rag_store::RagStore;
use symbol_registry::SymbolRegistry;

/// Shape the LLM must return in JSON mode.
#[derive(Debug, Deserialize)]
struct PatchDraft {
    #[serde(default)]
    diff: String,
    #[serde(default)]
    reasoning: String,
}

pub struct CodingAgent {
    cfg: AgentConfig,
    llm: Arc<LlmGateway>,
    rag: Arc<RagStore>,
    registry: Arc<SymbolRegistry>,
    publisher: TypedPublisher,
}

impl CodingAgent {
    pub fn new(
        cfg: AgentConfig,
        llm: Arc<LlmGateway>,
        rag: Arc<RagStore>,
        registry: Arc<SymbolRegistry>,
        publisher: TypedPublisher,
    ) -> Self {
        Self {
            cfg,
            llm,
            rag,
            registry,
            publisher,
        }
    }

    /// Consumes `task.bundle.out` until the subscription is cancelled.
    /// Tasks of one bundle run concurrently; every task yields exactly one
    /// `CommitResult`.
    pub async fn run(&self, mut sub: Subscription) {
        info!("coding agent started");
        while let Some(msg) = sub.next().await {
            let Some(bundle) =
                decode_or_skip::<TaskBundle>(self.publisher.registry(), &msg.topic, &msg.payload)
            else {
                continue;
            };
            info!(
                plan_id = %bundle.plan_id,
                tasks = bundle.tasks.len(),
                "received task bundle"
            );

            let results =
                futures::future::join_all(bundle.tasks.iter().map(|t| self.process_task(t))).await;

            for result in results {
                if let Err(e) = self
                    .publisher
                    .send(topics::COMMIT_RESULT_OUT, &result, msg.key.as_deref())
                    .await
                {
                    warn!(task_id = %result.task_id, error = %e, "result publish failed");
                }
            }
        }
        info!("coding agent stopped");
    }

    /// Processes one task. Never errors: failures fold into the result
    /// status. The scoped working tree is removed on all exit paths.
    #[instrument(skip_all, fields(task_id = %task.id))]
    pub async fn process_task(&self, task: &CodingTask) -> CommitResult {
        match self.attempt_task(task).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "task hard-failed");
                CommitResult::hard_fail(&task.id, e.to_string())
            }
        }
    }

    async fn attempt_task(&self, task: &CodingTask) -> Result<CommitResult, AgentError> {
        let (workdir, repo) = workspace::materialise(&self.cfg)?;

        let mut context = if task.blob_ids.is_empty() {
            String::new()
        } else {
            let snippets: Vec<String> = self.rag.snippet_stream(&task.blob_ids, 30).collect().await;
            workspace::cap_chars(&snippets.join("\n\n"), self.cfg.context_cap)
        };

        let mut last_notes: Vec<String> = Vec::new();
        for attempt in 0..=self.cfg.max_retries {
            info!(attempt, "requesting patch");
            let messages = [
                ChatMessage::system(prompt::SYSTEM),
                ChatMessage::user(prompt::build_user(task, &context)),
            ];
            let response = match self
                .llm
                .chat(&messages, &ChatOptions::json(&self.cfg.model))
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "llm call failed");
                    last_notes = vec![format!("llm call failed: {e}")];
                    continue;
                }
            };

            let draft: PatchDraft = match serde_json::from_str(&response.content) {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "invalid patch response");
                    last_notes = vec![format!("invalid patch response: {e}")];
                    continue;
                }
            };
            debug!(reasoning = %draft.reasoning, "patch drafted");
            if draft.diff.is_empty() {
                warn!("empty diff generated");
                last_notes = vec!["empty diff generated".to_string()];
                continue;
            }

            let apply_note = match patch::apply_patch(workdir.path(), &draft.diff).await {
                ApplyOutcome::Applied => None,
                ApplyOutcome::InvalidDiff(r) => Some(format!("invalid: {r}")),
                ApplyOutcome::RejectedByTree(r) => Some(format!("rejected by tree: {r}")),
                ApplyOutcome::ToolMissing => Some("git not on PATH".to_string()),
            };
            if let Some(note) = apply_note {
                last_notes = vec![note.clone()];
                context.push_str("\n\n# SELF-CHECK FAILURES\n");
                context.push_str(&note);
                continue;
            }

            let (ok, notes) = selfcheck::run_battery(workdir.path(), &self.cfg.pytest_mark).await;
            if !ok {
                last_notes = notes.clone();
                context.push_str("\n\n# SELF-CHECK FAILURES\n");
                context.push_str(&notes.join("\n"));
                continue;
            }

            let branch_name = format!("agt/{}", task.id);
            let message = format!(
                "{}: {}\n\n[agent:{}]",
                task.kind.as_lowercase(),
                task.goal,
                task.id
            );
            let commit_sha = workspace::commit_all(&repo, &branch_name, &message)?;

            if let Err(e) = workspace::push_branch(&repo, &branch_name) {
                // push failure is non-terminal; retry with the note attached
                last_notes = vec![format!("push failed: {e}")];
                context.push_str("\n\n# SELF-CHECK FAILURES\npush failed");
                continue;
            }

            self.claim_leases(task, &commit_sha).await;
            info!(branch = %branch_name, sha = %commit_sha, "task succeeded");
            return Ok(CommitResult::success(&task.id, &commit_sha, &branch_name));
        }

        info!("retries exhausted, soft fail");
        Ok(CommitResult::soft_fail(&task.id, last_notes))
    }

    /// Claims every lease the task carries. Individual claim errors are
    /// logged and swallowed: a lost claim never un-lands a commit.
    async fn claim_leases(&self, task: &CodingTask, commit_sha: &str) {
        for lease_id in &task.reserved_lease_ids {
            if let Err(e) = self.registry.claim(*lease_id, commit_sha).await {
                warn!(lease_id, error = %e, "lease claim failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use event_bus::InMemoryBroker;
    use git2::Repository;
    use pipeline_contracts::{Complexity, StepKind};
    use rag_store::{MemoryDenseIndex, RagConfig, embed::hash::HashEmbedder};
    use std::path::Path;
    use symbol_registry::{MemoryStore, ReserveRequest};

    use ai_llm_service::{ChatProvider, LlmError, LlmResponse};

    #[derive(Debug)]
    struct ScriptedProvider {
        body: String,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _opts: &ChatOptions,
        ) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse::content_only(self.body.clone()))
        }
    }

    /// Seeds a work repo with one commit on `main` and publishes it as a
    /// bare "remote" the agent can clone from and push to.
    fn fixture_remote(root: &Path) -> String {
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
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();

        let bare = root.join("remote.git");
        let mut builder = git2::build::RepoBuilder::new();
        builder.bare(true);
        builder.clone(work.to_str().unwrap(), &bare).unwrap();
        bare.to_str().unwrap().to_string()
    }

    fn agent_with(body: &str, remote: &str, scratch: &Path) -> (CodingAgent, Arc<SymbolRegistry>) {
        let cfg = AgentConfig {
            remote_repo: remote.to_string(),
            remote_branch: "main".to_string(),
            cache_ref: None,
            max_retries: 2,
            model: "gpt-4o-mini".to_string(),
            pytest_mark: "fast".to_string(),
            clone_depth: None,
            scratch_root: Some(scratch.to_path_buf()),
            context_cap: 3000,
        };
        let llm = Arc::new(LlmGateway::with_provider(
            Arc::new(ScriptedProvider {
                body: body.to_string(),
            }),
            None,
        ));
        let rag = Arc::new(RagStore::new(
            RagConfig::for_tests(),
            Arc::new(MemoryDenseIndex::new()),
            Arc::new(HashEmbedder::new(768)),
        ));
        let registry = Arc::new(SymbolRegistry::new(Arc::new(MemoryStore::new())));
        let publisher = TypedPublisher::new(
            Arc::new(InMemoryBroker::new()),
            Arc::new(topics::codec_registry()),
            event_bus::BusConfig::default(),
        );
        (
            CodingAgent::new(cfg, llm, rag, registry.clone(), publisher),
            registry,
        )
    }

    fn task(id: &str, leases: Vec<i64>) -> CodingTask {
        CodingTask {
            id: id.to_string(),
            parent_plan_id: "plan-1".to_string(),
            step_number: 1,
            goal: "add a hello note".to_string(),
            path: Some("README.md".to_string()),
            kind: StepKind::Add,
            blob_ids: vec![],
            complexity: Complexity::Trivial,
            reserved_lease_ids: leases,
        }
    }

    const GOOD_PATCH: &str = r#"{"diff":"--- a/README.md\n+++ b/README.md\n@@ -1 +1,2 @@\n # Demo\n+Hello from the agent\n","reasoning":"append a note"}"#;

    #[tokio::test]
    async fn successful_task_commits_pushes_and_claims() {
        if !selfcheck::tool_on_path("git") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let remote = fixture_remote(root.path());
        let scratch = tempfile::tempdir().unwrap();
        let (agent, registry) = agent_with(GOOD_PATCH, &remote, scratch.path());

        // a lease for the symbol this task lands
        let lease = registry
            .reserve(&ReserveRequest {
                repo: "demo".into(),
                branch: "main".into(),
                fq_name: "hello".into(),
                kind: "function".into(),
                file_path: "README.md".into(),
                plan_id: "plan-1".into(),
                ttl_sec: 600,
            })
            .await
            .unwrap();

        let task = task("task-1", vec![lease.lease_id]);
        let result = agent.process_task(&task).await;

        assert_eq!(result.status, pipeline_contracts::CommitStatus::Success);
        assert_eq!(result.branch_name, "agt/task-1");
        assert!(!result.commit_sha.is_empty());

        // the branch reached the remote
        let bare = Repository::open(&remote).unwrap();
        let branch_ref = bare.find_reference("refs/heads/agt/task-1").unwrap();
        assert_eq!(
            branch_ref.target().unwrap().to_string(),
            result.commit_sha
        );

        // the lease got claimed with the commit sha
        let rec = registry.lookup("demo", "main", "hello").await.unwrap();
        assert_eq!(rec.commit_sha.as_deref(), Some(result.commit_sha.as_str()));

        // scoped working tree is gone
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unusable_diff_soft_fails_after_retries() {
        let root = tempfile::tempdir().unwrap();
        let remote = fixture_remote(root.path());
        let scratch = tempfile::tempdir().unwrap();
        let (agent, _registry) =
            agent_with(r#"{"diff":"not a diff","reasoning":"nope"}"#, &remote, scratch.path());

        let result = agent.process_task(&task("task-2", vec![])).await;

        assert_eq!(result.status, pipeline_contracts::CommitStatus::SoftFail);
        assert_eq!(result.commit_sha, "");
        assert_eq!(result.branch_name, "");
        assert!(!result.notes.is_empty());
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unreachable_remote_hard_fails() {
        let scratch = tempfile::tempdir().unwrap();
        let (agent, _registry) = agent_with(GOOD_PATCH, "/nonexistent/remote.git", scratch.path());

        let result = agent.process_task(&task("task-3", vec![])).await;

        assert_eq!(result.status, pipeline_contracts::CommitStatus::HardFail);
        assert!(!result.notes.is_empty());
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
