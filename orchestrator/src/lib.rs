//! Orchestrator: observes every pipeline topic and advances one FSM per
//! change request.
//!
//! Progress bookkeeping lives beside the machines: per-request pending
//! task sets (drained by terminal commit results), index maps from plan,
//! task, and commit SHA back to the owning request, and regression hints
//! accumulated from hard failures. `code_ok` fires only when a request's
//! pending set drains after its bundle was seen. Entering regression
//! publishes a `RegressionSignal` and, once the publish is acknowledged,
//! resets the machine to idle.
//!
//! Cross-topic arrival order is not guaranteed even for one partition key,
//! so commit results that beat their bundle are parked and replayed when
//! the bundle shows up.

mod fsm;

pub use fsm::{OrchestratorFsm, PipelineEvent, Stage, TransitionError};

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use event_bus::{Subscription, TypedPublisher, decode_or_skip};
use pipeline_contracts::{
    BuildReport, BuildStatus, ChangeRequest, CommitResult, CommitStatus, GeneratedTests, Plan,
    RegressionSignal, TaskBundle, TestSpec, topics,
};

/// Consumer group the orchestrator joins on every observed topic.
pub const GROUP: &str = "orchestrator";

struct RequestProgress {
    fsm: OrchestratorFsm,
    pending_tasks: HashSet<String>,
    bundle_seen: bool,
    regression_hints: Vec<String>,
}

impl RequestProgress {
    fn new() -> Self {
        Self {
            fsm: OrchestratorFsm::new(),
            pending_tasks: HashSet::new(),
            bundle_seen: false,
            regression_hints: Vec::new(),
        }
    }
}

pub struct Orchestrator {
    publisher: TypedPublisher,
    requests: HashMap<String, RequestProgress>,
    plan_to_request: HashMap<String, String>,
    task_to_request: HashMap<String, String>,
    sha_to_request: HashMap<String, String>,
    /// Commit results that arrived before their bundle.
    parked_results: HashMap<String, CommitResult>,
}

impl Orchestrator {
    pub fn new(publisher: TypedPublisher) -> Self {
        Self {
            publisher,
            requests: HashMap::new(),
            plan_to_request: HashMap::new(),
            task_to_request: HashMap::new(),
            sha_to_request: HashMap::new(),
            parked_results: HashMap::new(),
        }
    }

    /// Current stage of a request, if the orchestrator has seen it.
    pub fn stage_of(&self, request_id: &str) -> Option<Stage> {
        self.requests.get(request_id).map(|p| p.fsm.state())
    }

    /// Consumes every observed topic until the subscription is cancelled.
    pub async fn run(&mut self, mut sub: Subscription) {
        info!("orchestrator started");
        while let Some(msg) = sub.next().await {
            let registry = self.publisher.registry().clone();
            match msg.topic.as_str() {
                topics::CHANGE_REQUEST_IN => {
                    if let Some(cr) =
                        decode_or_skip::<ChangeRequest>(&registry, &msg.topic, &msg.payload)
                    {
                        self.handle_change_request(&cr);
                    }
                }
                topics::PLAN_OUT => {
                    if let Some(plan) = decode_or_skip::<Plan>(&registry, &msg.topic, &msg.payload)
                    {
                        self.handle_plan(&plan);
                    }
                }
                topics::TASK_BUNDLE_OUT => {
                    if let Some(bundle) =
                        decode_or_skip::<TaskBundle>(&registry, &msg.topic, &msg.payload)
                    {
                        self.handle_bundle(&bundle);
                    }
                }
                topics::COMMIT_RESULT_OUT => {
                    if let Some(result) =
                        decode_or_skip::<CommitResult>(&registry, &msg.topic, &msg.payload)
                    {
                        self.handle_commit_result(result);
                    }
                }
                topics::BUILD_REPORT_OUT => {
                    if let Some(report) =
                        decode_or_skip::<BuildReport>(&registry, &msg.topic, &msg.payload)
                    {
                        self.handle_build_report(&report).await;
                    }
                }
                topics::TEST_SPEC_OUT => {
                    if let Some(spec) =
                        decode_or_skip::<TestSpec>(&registry, &msg.topic, &msg.payload)
                    {
                        self.handle_test_spec(&spec);
                    }
                }
                topics::GENERATED_TESTS_OUT => {
                    if let Some(generated) =
                        decode_or_skip::<GeneratedTests>(&registry, &msg.topic, &msg.payload)
                    {
                        self.handle_generated_tests(&generated).await;
                    }
                }
                other => debug!(topic = other, "unrouted topic"),
            }
        }
        info!("orchestrator stopped");
    }

    pub fn handle_change_request(&mut self, cr: &ChangeRequest) {
        let progress = self
            .requests
            .entry(cr.id.clone())
            .or_insert_with(RequestProgress::new);
        apply_logged(&cr.id, &mut progress.fsm, PipelineEvent::Crq);
        info!(request_id = %cr.id, "request accepted");
    }

    pub fn handle_plan(&mut self, plan: &Plan) {
        self.plan_to_request
            .insert(plan.id.clone(), plan.parent_request_id.clone());
        if let Some(progress) = self.requests.get_mut(&plan.parent_request_id) {
            apply_logged(&plan.parent_request_id, &mut progress.fsm, PipelineEvent::Plan);
        } else {
            warn!(plan_id = %plan.id, "plan for unknown request");
        }
    }

    pub fn handle_bundle(&mut self, bundle: &TaskBundle) {
        let Some(request_id) = self.plan_to_request.get(&bundle.plan_id).cloned() else {
            warn!(plan_id = %bundle.plan_id, "bundle for unknown plan");
            return;
        };
        let Some(progress) = self.requests.get_mut(&request_id) else {
            return;
        };
        progress.bundle_seen = true;
        for task in &bundle.tasks {
            progress.pending_tasks.insert(task.id.clone());
            self.task_to_request
                .insert(task.id.clone(), request_id.clone());
        }
        debug!(
            request_id = %request_id,
            pending = bundle.tasks.len(),
            "bundle registered"
        );

        // replay results that beat their bundle
        let parked: Vec<CommitResult> = bundle
            .tasks
            .iter()
            .filter_map(|t| self.parked_results.remove(&t.id))
            .collect();
        for result in parked {
            self.handle_commit_result(result);
        }
        self.maybe_code_ok(&request_id);
    }

    pub fn handle_commit_result(&mut self, result: CommitResult) {
        let Some(request_id) = self.task_to_request.get(&result.task_id).cloned() else {
            debug!(task_id = %result.task_id, "commit result before bundle, parking");
            self.parked_results.insert(result.task_id.clone(), result);
            return;
        };
        let Some(progress) = self.requests.get_mut(&request_id) else {
            return;
        };

        progress.pending_tasks.remove(&result.task_id);
        match result.status {
            CommitStatus::Success => {
                self.sha_to_request
                    .insert(result.commit_sha.clone(), request_id.clone());
            }
            CommitStatus::HardFail => {
                warn!(task_id = %result.task_id, "task hard-failed");
                progress
                    .regression_hints
                    .push(format!("task {} hard-failed", result.task_id));
            }
            CommitStatus::SoftFail => {
                debug!(task_id = %result.task_id, "task soft-failed");
            }
        }
        self.maybe_code_ok(&request_id);
    }

    fn maybe_code_ok(&mut self, request_id: &str) {
        let Some(progress) = self.requests.get_mut(request_id) else {
            return;
        };
        if progress.bundle_seen
            && progress.pending_tasks.is_empty()
            && progress.fsm.state() == Stage::Code
        {
            apply_logged(request_id, &mut progress.fsm, PipelineEvent::CodeOk);
        }
    }

    pub async fn handle_build_report(&mut self, report: &BuildReport) {
        let Some(request_id) = self.sha_to_request.get(&report.commit_sha).cloned() else {
            warn!(sha = %report.commit_sha, "report for unknown commit");
            return;
        };
        match report.status {
            BuildStatus::Passed => {
                let Some(progress) = self.requests.get_mut(&request_id) else {
                    return;
                };
                let event = match progress.fsm.state() {
                    Stage::Build1 => PipelineEvent::BuildOk,
                    Stage::Build2 => PipelineEvent::Build2Ok,
                    other => {
                        warn!(stage = other.as_str(), "unexpected passing report");
                        return;
                    }
                };
                apply_logged(&request_id, &mut progress.fsm, event);
                if progress.fsm.state() == Stage::Done {
                    info!(request_id = %request_id, "pipeline complete");
                    apply_logged(&request_id, &mut progress.fsm, PipelineEvent::Reset);
                }
            }
            BuildStatus::Failed => {
                let mut hints: Vec<String> = report.failed_tests.clone();
                hints.extend(report.lint_errors.clone());
                self.enter_regression(&request_id, PipelineEvent::BuildFail, hints)
                    .await;
            }
        }
    }

    pub fn handle_test_spec(&mut self, spec: &TestSpec) {
        let Some(request_id) = self.plan_to_request.get(&spec.plan_id).cloned() else {
            warn!(plan_id = %spec.plan_id, "test spec for unknown plan");
            return;
        };
        if let Some(progress) = self.requests.get_mut(&request_id) {
            apply_logged(&request_id, &mut progress.fsm, PipelineEvent::Tspec);
        }
    }

    pub async fn handle_generated_tests(&mut self, generated: &GeneratedTests) {
        let Some(request_id) = self.plan_to_request.get(&generated.plan_id).cloned() else {
            warn!(plan_id = %generated.plan_id, "generated tests for unknown plan");
            return;
        };
        match generated.precheck {
            BuildStatus::Passed => {
                if let Some(progress) = self.requests.get_mut(&request_id) {
                    apply_logged(&request_id, &mut progress.fsm, PipelineEvent::GtOk);
                }
            }
            BuildStatus::Failed => {
                self.enter_regression(
                    &request_id,
                    PipelineEvent::GtFail,
                    vec!["generated tests precheck failed".to_string()],
                )
                .await;
            }
        }
    }

    /// Applies the failure event, publishes the regression signal, and once
    /// the publish is acknowledged resets the machine to idle.
    async fn enter_regression(
        &mut self,
        request_id: &str,
        event: PipelineEvent,
        mut hints: Vec<String>,
    ) {
        let Some(progress) = self.requests.get_mut(request_id) else {
            return;
        };
        let stage_before = progress.fsm.state();
        if apply_logged(request_id, &mut progress.fsm, event).is_none() {
            return;
        }
        hints.extend(progress.regression_hints.drain(..));

        let signal = RegressionSignal {
            request_id: request_id.to_string(),
            stage: stage_before.as_str().to_string(),
            hints,
        };
        match self
            .publisher
            .send(topics::REGRESSION_OUT, &signal, Some(request_id))
            .await
        {
            Ok(()) => {
                if let Some(progress) = self.requests.get_mut(request_id) {
                    apply_logged(request_id, &mut progress.fsm, PipelineEvent::Reset);
                }
            }
            Err(e) => warn!(request_id, error = %e, "regression publish failed"),
        }
    }
}

fn apply_logged(request_id: &str, fsm: &mut OrchestratorFsm, event: PipelineEvent) -> Option<Stage> {
    match fsm.apply(event) {
        Ok(stage) => {
            info!(request_id, stage = stage.as_str(), ?event, "stage advanced");
            Some(stage)
        }
        Err(e) => {
            warn!(request_id, error = %e, "transition rejected");
            None
        }
    }
}
