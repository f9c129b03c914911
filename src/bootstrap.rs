//! Process bootstrap: construct every service once, wire the workers over
//! the bus, and supervise until shutdown.
//!
//! All collaborators are explicit objects built here at init (provider
//! registries, stores, indices), never lazily materialised globals. Store
//! backends are chosen by configuration: `DATABASE_URL` selects Postgres
//! for the symbol registry, `QDRANT_URL` selects Qdrant for the dense
//! index; absent either, the in-memory backends serve a single-process
//! deployment.

use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tracing::info;

use ai_llm_service::LlmGateway;
use ci_runner::{CiConfig, CiRunner};
use code_planner::CodePlanner;
use coding_agent::{AgentConfig, CodingAgent};
use event_bus::{BusConfig, EventBus, InMemoryBroker, TypedPublisher};
use git_adapter::GitAdapter;
use orchestrator::Orchestrator;
use pipeline_contracts::topics;
use rag_store::{DenseIndex, MemoryDenseIndex, QdrantDenseIndex, RagConfig, RagStore};
use request_planner::RequestPlanner;
use symbol_registry::{MemoryStore, PgStore, SymbolRegistry, SymbolStore};

pub async fn start() -> anyhow::Result<()> {
    let bus_cfg = BusConfig::from_env();
    let broker: Arc<dyn EventBus> = Arc::new(InMemoryBroker::new());
    let registry = Arc::new(topics::codec_registry());
    let publisher = || TypedPublisher::new(broker.clone(), registry.clone(), bus_cfg.clone());

    println!("{}", "forge-ai-backend starting".bold().green());
    info!(bootstrap = %bus_cfg.bootstrap, "bus configured");

    // LLM gateway
    let llm = Arc::new(LlmGateway::from_env().context("llm gateway init")?);

    // Retrieval engine
    let rag_cfg = RagConfig::from_env().context("rag config")?;
    let dense: Arc<dyn DenseIndex> = match &rag_cfg.qdrant_url {
        Some(url) => Arc::new(
            QdrantDenseIndex::new(url, rag_cfg.qdrant_api_key.as_deref(), &rag_cfg.collection)
                .context("qdrant init")?,
        ),
        None => Arc::new(MemoryDenseIndex::new()),
    };
    let embedder = rag_store::build_embedder(&rag_cfg).context("embedder init")?;
    let rag = Arc::new(RagStore::new(rag_cfg, dense, embedder));

    // Symbol registry
    let store: Arc<dyn SymbolStore> = match std::env::var("DATABASE_URL") {
        Ok(_) => Arc::new(PgStore::from_env().await.context("symbol store init")?),
        Err(_) => Arc::new(MemoryStore::new()),
    };
    let symbols = Arc::new(SymbolRegistry::new(store));

    // Git adapter (mirror cache shared with the CI runner)
    let git = GitAdapter::from_env();
    let health = git.health().context("git cache")?;
    info!(cache_dir = %health.cache_dir.display(), mirrors = health.mirrors, "git adapter ready");

    // Workers
    let request_planner = RequestPlanner::new(rag.clone(), llm.clone(), symbols.clone(), publisher());
    let code_planner = CodePlanner::new(rag.clone(), publisher());
    let agent = CodingAgent::new(
        AgentConfig::from_env(),
        llm.clone(),
        rag.clone(),
        symbols.clone(),
        publisher(),
    );
    let ci = CiRunner::new(CiConfig::from_env(), git, publisher());
    let mut orchestrator = Orchestrator::new(publisher());

    let rp_sub = broker
        .subscribe("request-planner", &[topics::CHANGE_REQUEST_IN])
        .await?;
    let cp_sub = broker.subscribe("code-planner", &[topics::PLAN_OUT]).await?;
    let agent_sub = broker
        .subscribe("coding-agent", &[topics::TASK_BUNDLE_OUT])
        .await?;
    let ci_sub = broker
        .subscribe("ci-runner", &[topics::COMMIT_RESULT_OUT])
        .await?;
    let orch_sub = broker
        .subscribe(orchestrator::GROUP, &topics::ALL_OBSERVED)
        .await?;

    let cancels = [
        rp_sub.cancel_handle(),
        cp_sub.cancel_handle(),
        agent_sub.cancel_handle(),
        ci_sub.cancel_handle(),
        orch_sub.cancel_handle(),
    ];

    let mut workers = tokio::task::JoinSet::new();
    workers.spawn(async move { request_planner.run(rp_sub).await });
    workers.spawn(async move { code_planner.run(cp_sub).await });
    workers.spawn(async move { agent.run(agent_sub).await });
    workers.spawn(async move { ci.run(ci_sub).await });
    workers.spawn(async move { orchestrator.run(orch_sub).await });

    println!("{}", "pipeline online, waiting for change requests".cyan());

    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("shutdown signal received, draining workers");
    for cancel in &cancels {
        cancel.cancel();
    }
    while workers.join_next().await.is_some() {}
    println!("{}", "forge-ai-backend stopped".bold());
    Ok(())
}
