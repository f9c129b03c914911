//! Request planner: `ChangeRequest` → `Plan`.
//!
//! For each incoming request the planner retrieves context, asks the LLM
//! for an ordered step list in JSON mode, reserves candidate symbol names
//! in the registry, and publishes the plan. Symbol conflicts are logged and
//! skipped: the plan still emits and downstream resolves. Re-processing a
//! request cannot double-reserve, because the registry's uniqueness
//! constraint makes the second reserve fail harmlessly.

mod prompt;

pub use prompt::{SYSTEM, build_prompt};

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use ai_llm_service::{ChatMessage, ChatOptions, LlmGateway};
use event_bus::{Subscription, TypedPublisher, decode_or_skip};
use pipeline_contracts::{ChangeRequest, Plan, Step, StepKind, topics};
use rag_store::RagStore;
use symbol_registry::{RegistryError, ReserveRequest, SymbolRegistry};

const CONTEXT_K: usize = 8;
const CONTEXT_ALPHA: f32 = 0.3;
const RESERVE_TTL_SEC: i64 = 600;

/// Identifier immediately followed by `(`, anywhere in the description.
fn reserve_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z_0-9]*)\(").expect("valid literal pattern"))
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("retrieval error: {0}")]
    Retrieval(#[from] rag_store::RagError),

    #[error("llm error: {0}")]
    Llm(#[from] ai_llm_service::LlmError),

    #[error("invalid planner response: {0}")]
    InvalidResponse(String),

    #[error("bus error: {0}")]
    Bus(#[from] event_bus::BusError),
}

/// Shape the LLM must return in JSON mode.
#[derive(Debug, Deserialize)]
struct PlanDraft {
    steps: Vec<StepDraft>,
    #[serde(default)]
    rationale: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StepDraft {
    goal: String,
    kind: StepKind,
    #[serde(default)]
    path: Option<String>,
}

pub struct RequestPlanner {
    rag: Arc<RagStore>,
    llm: Arc<LlmGateway>,
    registry: Arc<SymbolRegistry>,
    publisher: TypedPublisher,
    model: String,
}

impl RequestPlanner {
    pub fn new(
        rag: Arc<RagStore>,
        llm: Arc<LlmGateway>,
        registry: Arc<SymbolRegistry>,
        publisher: TypedPublisher,
    ) -> Self {
        let model = std::env::var("PLANNER_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Self {
            rag,
            llm,
            registry,
            publisher,
            model,
        }
    }

    /// Consumes `change.request.in` until the subscription is cancelled.
    pub async fn run(&self, mut sub: Subscription) {
        info!("request planner started");
        while let Some(msg) = sub.next().await {
            let Some(cr) = decode_or_skip::<ChangeRequest>(
                self.publisher.registry(),
                &msg.topic,
                &msg.payload,
            ) else {
                continue;
            };
            if let Err(e) = self.process_change(&cr).await {
                warn!(request_id = %cr.id, error = %e, "change request failed");
            }
        }
        info!("request planner stopped");
    }

    /// Plans one change request and publishes the result.
    #[instrument(skip_all, fields(request_id = %cr.id))]
    pub async fn process_change(&self, cr: &ChangeRequest) -> Result<Plan, PlannerError> {
        let hits = self
            .rag
            .hybrid_search(&cr.description, CONTEXT_K, CONTEXT_ALPHA, None)
            .await?;
        let snippets: Vec<String> = hits.into_iter().map(|h| h.snippet).collect();

        let messages = [
            ChatMessage::system(SYSTEM),
            ChatMessage::user(build_prompt(cr, &snippets)),
        ];
        let response = self
            .llm
            .chat(&messages, &ChatOptions::json(&self.model))
            .await?;

        let draft: PlanDraft = serde_json::from_str(&response.content)
            .map_err(|e| PlannerError::InvalidResponse(e.to_string()))?;
        if draft.steps.is_empty() {
            return Err(PlannerError::InvalidResponse("plan has no steps".into()));
        }

        let mut plan = Plan {
            id: Uuid::new_v4().to_string(),
            parent_request_id: cr.id.clone(),
            rationale: draft.rationale,
            steps: draft
                .steps
                .into_iter()
                .enumerate()
                .map(|(i, s)| Step {
                    order: (i + 1) as u32,
                    goal: s.goal,
                    kind: s.kind,
                    path: s.path.filter(|p| !p.is_empty()),
                })
                .collect(),
            reserved_lease_ids: Vec::new(),
        };

        let file_path = plan
            .steps
            .iter()
            .find_map(|s| s.path.clone())
            .unwrap_or_default();
        for candidate in reserve_pattern().captures_iter(&cr.description) {
            let fq_name = candidate[1].to_string();
            let req = ReserveRequest {
                repo: cr.repo.clone(),
                branch: cr.branch.clone(),
                fq_name: fq_name.clone(),
                kind: "function".to_string(),
                file_path: file_path.clone(),
                plan_id: plan.id.clone(),
                ttl_sec: RESERVE_TTL_SEC,
            };
            match self.registry.reserve(&req).await {
                Ok(lease) => plan.reserved_lease_ids.push(lease.lease_id),
                Err(RegistryError::Conflict(name)) => {
                    warn!(fq_name = %name, "symbol conflict, continuing")
                }
                Err(e) => warn!(fq_name = %fq_name, error = %e, "reserve failed, continuing"),
            }
        }

        self.publisher
            .send(topics::PLAN_OUT, &plan, Some(&cr.id))
            .await?;
        info!(
            plan_id = %plan.id,
            steps = plan.steps.len(),
            leases = plan.reserved_lease_ids.len(),
            "plan published"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use event_bus::{EventBus, InMemoryBroker};
    use symbol_registry::MemoryStore;

    use ai_llm_service::{ChatProvider, LlmError, LlmResponse};

    /// Provider scripted to return a fixed JSON plan.
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

    fn rag() -> Arc<RagStore> {
        use rag_store::{MemoryDenseIndex, RagConfig};
        Arc::new(RagStore::new(
            RagConfig::for_tests(),
            Arc::new(MemoryDenseIndex::new()),
            Arc::new(rag_store::embed::hash::HashEmbedder::new(768)),
        ))
    }

    fn planner_with(
        body: &str,
        broker: Arc<InMemoryBroker>,
        registry: Arc<SymbolRegistry>,
    ) -> RequestPlanner {
        let publisher = TypedPublisher::new(
            broker,
            Arc::new(topics::codec_registry()),
            event_bus::BusConfig::default(),
        );
        let llm = Arc::new(LlmGateway::with_provider(
            Arc::new(ScriptedProvider {
                body: body.to_string(),
            }),
            None,
        ));
        RequestPlanner::new(rag(), llm, registry, publisher)
    }

    fn request(description: &str) -> ChangeRequest {
        ChangeRequest {
            id: "r-1".into(),
            requester: "dev".into(),
            repo: "demo".into(),
            branch: "main".into(),
            description: description.into(),
        }
    }

    #[tokio::test]
    async fn simple_add_produces_one_step_and_one_reservation() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut plan_sub = broker.subscribe("test", &[topics::PLAN_OUT]).await.unwrap();
        let registry = Arc::new(SymbolRegistry::new(Arc::new(MemoryStore::new())));

        let body = r#"{"steps":[{"goal":"add greet()","kind":"ADD","path":"src/app.py"}],"rationale":["needed"]}"#;
        let planner = planner_with(body, broker.clone(), registry.clone());

        let plan = planner.process_change(&request("add greet()")).await.unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].order, 1);
        assert!(plan.steps_densely_ordered());
        assert_eq!(plan.reserved_lease_ids.len(), 1);

        let rec = registry.lookup("demo", "main", "greet").await.unwrap();
        assert_eq!(rec.kind, "function");
        assert_eq!(rec.file_path, "src/app.py");
        assert_eq!(rec.plan_id.as_deref(), Some(plan.id.as_str()));

        // and the plan went out on the bus, keyed by the request
        let msg = plan_sub.next().await.unwrap();
        assert_eq!(msg.key.as_deref(), Some("r-1"));
        let published: Plan =
            event_bus::decode(&topics::codec_registry(), topics::PLAN_OUT, &msg.payload).unwrap();
        assert_eq!(published, plan);
    }

    #[tokio::test]
    async fn colliding_planners_both_emit_but_one_lease_wins() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut plan_sub = broker.subscribe("test", &[topics::PLAN_OUT]).await.unwrap();
        let registry = Arc::new(SymbolRegistry::new(Arc::new(MemoryStore::new())));

        let body = r#"{"steps":[{"goal":"introduce foo()","kind":"ADD","path":"src/foo.py"}],"rationale":[]}"#;
        let first = planner_with(body, broker.clone(), registry.clone());
        let second = planner_with(body, broker.clone(), registry.clone());

        let plan_a = first.process_change(&request("call foo( here")).await.unwrap();
        let plan_b = second.process_change(&request("call foo( here")).await.unwrap();

        let leases = plan_a.reserved_lease_ids.len() + plan_b.reserved_lease_ids.len();
        assert_eq!(leases, 1);

        assert!(plan_sub.next().await.is_some());
        assert!(plan_sub.next().await.is_some());
    }

    #[tokio::test]
    async fn malformed_llm_json_is_an_invalid_response() {
        let broker = Arc::new(InMemoryBroker::new());
        let registry = Arc::new(SymbolRegistry::new(Arc::new(MemoryStore::new())));
        let planner = planner_with("not json at all", broker, registry);

        let err = planner.process_change(&request("whatever")).await.unwrap_err();
        assert!(matches!(err, PlannerError::InvalidResponse(_)));
    }

    #[test]
    fn identifier_extraction_matches_call_sites_only() {
        let text = "please add greet() and fix parse_config( but not plain words";
        let names: Vec<&str> = reserve_pattern()
            .captures_iter(text)
            .map(|c| c.get(1).map(|m| m.as_str()).unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["greet", "parse_config"]);
    }
}
