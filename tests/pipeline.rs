//! Cross-component flow over the in-memory bus: a change request is
//! planned, expanded into tasks, coded against a local fixture remote, and
//! observed by the orchestrator up to the first build gate.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ai_llm_service::{ChatMessage, ChatOptions, ChatProvider, LlmError, LlmGateway, LlmResponse};
use code_planner::CodePlanner;
use coding_agent::{AgentConfig, CodingAgent};
use event_bus::{BusConfig, EventBus, InMemoryBroker, TypedPublisher};
use orchestrator::{Orchestrator, Stage};
use pipeline_contracts::{ChangeRequest, CommitResult, CommitStatus, topics};
use rag_store::{MemoryDenseIndex, RagConfig, RagStore, embed::hash::HashEmbedder};
use request_planner::RequestPlanner;
use symbol_registry::{MemoryStore, SymbolRegistry};

/// Answers the planner with a one-step plan and the agent with a patch
/// that applies to the fixture's README.
#[derive(Debug)]
struct ScriptedProvider;

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _opts: &ChatOptions,
    ) -> Result<LlmResponse, LlmError> {
        let system = &messages[0].content;
        if system.contains("Request-Planner") {
            Ok(LlmResponse::content_only(
                r#"{"steps":[{"goal":"add greet()","kind":"ADD","path":"README.md"}],"rationale":["needed"]}"#,
            ))
        } else {
            Ok(LlmResponse::content_only(
                r#"{"diff":"--- a/README.md\n+++ b/README.md\n@@ -1 +1,2 @@\n # Demo\n+greet() lives here now\n","reasoning":"note the new symbol"}"#,
            ))
        }
    }
}

fn fixture_remote(root: &Path) -> String {
    let work = root.join("work");
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = git2::Repository::init_opts(&work, &opts).unwrap();
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

fn git_available() -> bool {
    coding_agent::selfcheck::tool_on_path("git")
}

#[tokio::test]
async fn change_request_flows_to_a_successful_commit() {
    if !git_available() {
        return;
    }

    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let remote = fixture_remote(root.path());

    let broker: Arc<dyn EventBus> = Arc::new(InMemoryBroker::new());
    let codecs = Arc::new(topics::codec_registry());
    let publisher =
        || TypedPublisher::new(broker.clone(), codecs.clone(), BusConfig::default());

    let llm = Arc::new(LlmGateway::with_provider(Arc::new(ScriptedProvider), None));
    let rag = Arc::new(RagStore::new(
        RagConfig::for_tests(),
        Arc::new(MemoryDenseIndex::new()),
        Arc::new(HashEmbedder::new(768)),
    ));
    let symbols = Arc::new(SymbolRegistry::new(Arc::new(MemoryStore::new())));

    let request_planner =
        RequestPlanner::new(rag.clone(), llm.clone(), symbols.clone(), publisher());
    let code_planner = CodePlanner::new(rag.clone(), publisher());
    let agent_cfg = AgentConfig {
        remote_repo: remote.clone(),
        remote_branch: "main".into(),
        cache_ref: None,
        max_retries: 2,
        model: "gpt-4o-mini".into(),
        pytest_mark: "fast".into(),
        clone_depth: None,
        scratch_root: Some(scratch.path().to_path_buf()),
        context_cap: 3000,
    };
    let agent = CodingAgent::new(agent_cfg, llm, rag, symbols.clone(), publisher());

    let rp_sub = broker
        .subscribe("request-planner", &[topics::CHANGE_REQUEST_IN])
        .await
        .unwrap();
    let cp_sub = broker
        .subscribe("code-planner", &[topics::PLAN_OUT])
        .await
        .unwrap();
    let agent_sub = broker
        .subscribe("coding-agent", &[topics::TASK_BUNDLE_OUT])
        .await
        .unwrap();
    let orch_sub = broker
        .subscribe(orchestrator::GROUP, &topics::ALL_OBSERVED)
        .await
        .unwrap();
    let mut observer = broker
        .subscribe("test-observer", &[topics::COMMIT_RESULT_OUT])
        .await
        .unwrap();

    tokio::spawn(async move { request_planner.run(rp_sub).await });
    tokio::spawn(async move { code_planner.run(cp_sub).await });
    tokio::spawn(async move { agent.run(agent_sub).await });

    let orch_cancel = orch_sub.cancel_handle();
    let mut orch = Orchestrator::new(publisher());
    let orch_task = tokio::spawn(async move {
        orch.run(orch_sub).await;
        orch
    });

    // kick off the pipeline
    let cr = ChangeRequest {
        id: "r-1".into(),
        requester: "dev".into(),
        repo: "demo".into(),
        branch: "main".into(),
        description: "add greet() to the readme".into(),
    };
    publisher()
        .send(topics::CHANGE_REQUEST_IN, &cr, Some(&cr.id))
        .await
        .unwrap();

    // the agent's result is the end of the line in this wiring (no CI)
    let msg = tokio::time::timeout(Duration::from_secs(60), observer.next())
        .await
        .expect("pipeline stalled")
        .expect("bus closed");
    let result: CommitResult = event_bus::decode(&codecs, topics::COMMIT_RESULT_OUT, &msg.payload).unwrap();
    assert_eq!(result.status, CommitStatus::Success);
    assert!(result.branch_name.starts_with("agt/"));

    // the reservation for greet() was claimed with the landed commit
    let record = symbols.lookup("demo", "main", "greet").await.unwrap();
    assert_eq!(record.commit_sha.as_deref(), Some(result.commit_sha.as_str()));

    // let the orchestrator drain its copies, then inspect its view
    tokio::time::sleep(Duration::from_millis(500)).await;
    orch_cancel.cancel();
    let orch = orch_task.await.unwrap();
    assert_eq!(orch.stage_of("r-1"), Some(Stage::Build1));

    // every scoped working tree was cleaned up
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}
