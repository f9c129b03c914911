//! Code planner: `Plan` → `TaskBundle`.
//!
//! One coding task per step, with `blob_ids` hydrated from hybrid search
//! (k=6, alpha=0.25, path-filtered when the step names a path) and a
//! complexity label derived from the first context snippet. The plan's
//! reserved leases ride on the bundle's first task, so a single commit
//! claims them once it lands.

mod complexity;

pub use complexity::{cyclomatic, label};

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use event_bus::{Subscription, TypedPublisher, decode_or_skip};
use pipeline_contracts::{CodingTask, Plan, TaskBundle, topics};
use rag_store::{RagFilter, RagStore};

const CONTEXT_K: usize = 6;
const CONTEXT_ALPHA: f32 = 0.25;

#[derive(Debug, Error)]
pub enum CodePlannerError {
    #[error("retrieval error: {0}")]
    Retrieval(#[from] rag_store::RagError),

    #[error("bus error: {0}")]
    Bus(#[from] event_bus::BusError),
}

pub struct CodePlanner {
    rag: Arc<RagStore>,
    publisher: TypedPublisher,
}

impl CodePlanner {
    pub fn new(rag: Arc<RagStore>, publisher: TypedPublisher) -> Self {
        Self { rag, publisher }
    }

    /// Consumes `plan.out` until the subscription is cancelled.
    pub async fn run(&self, mut sub: Subscription) {
        info!("code planner started");
        while let Some(msg) = sub.next().await {
            let Some(plan) =
                decode_or_skip::<Plan>(self.publisher.registry(), &msg.topic, &msg.payload)
            else {
                continue;
            };
            match self.build_bundle(&plan).await {
                Ok(bundle) => {
                    let key = plan.parent_request_id.clone();
                    if let Err(e) = self
                        .publisher
                        .send(topics::TASK_BUNDLE_OUT, &bundle, Some(&key))
                        .await
                    {
                        warn!(plan_id = %plan.id, error = %e, "bundle publish failed");
                    } else {
                        info!(
                            plan_id = %plan.id,
                            tasks = bundle.tasks.len(),
                            "emitted task bundle"
                        );
                    }
                }
                Err(e) => warn!(plan_id = %plan.id, error = %e, "bundle build failed"),
            }
        }
        info!("code planner stopped");
    }

    /// Expands one plan into its task bundle.
    #[instrument(skip_all, fields(plan_id = %plan.id))]
    pub async fn build_bundle(&self, plan: &Plan) -> Result<TaskBundle, CodePlannerError> {
        let mut tasks = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            let filter = step.path.as_deref().map(RagFilter::path);
            let hits = self
                .rag
                .hybrid_search(&step.goal, CONTEXT_K, CONTEXT_ALPHA, filter.as_ref())
                .await?;

            let complexity = hits
                .first()
                .map(|h| complexity::label(&h.snippet))
                .unwrap_or(pipeline_contracts::Complexity::Moderate);

            tasks.push(CodingTask {
                id: Uuid::new_v4().to_string(),
                parent_plan_id: plan.id.clone(),
                step_number: step.order,
                goal: step.goal.clone(),
                path: step.path.clone(),
                kind: step.kind,
                blob_ids: hits.iter().map(|h| h.point_id).collect(),
                complexity,
                reserved_lease_ids: Vec::new(),
            });
        }

        if let Some(first) = tasks.first_mut() {
            first.reserved_lease_ids = plan.reserved_lease_ids.clone();
        }

        Ok(TaskBundle {
            plan_id: plan.id.clone(),
            tasks,
        })
    }
}
