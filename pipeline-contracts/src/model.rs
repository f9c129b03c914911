//! Pipeline entity records.

use serde::{Deserialize, Serialize};

/// User-submitted task description bound to a repo and branch.
/// Immutable once emitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: String,
    pub requester: String,
    pub repo: String,
    pub branch: String,
    pub description: String,
}

/// What a step does to the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    #[serde(rename = "ADD")]
    Add,
    #[serde(rename = "MODIFY")]
    Modify,
    #[serde(rename = "REMOVE")]
    Remove,
    #[serde(rename = "REFACTOR")]
    Refactor,
}

impl StepKind {
    /// Wire-format spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Add => "ADD",
            StepKind::Modify => "MODIFY",
            StepKind::Remove => "REMOVE",
            StepKind::Refactor => "REFACTOR",
        }
    }

    /// Lowercased form used as the commit message prefix.
    pub fn as_lowercase(&self) -> &'static str {
        match self {
            StepKind::Add => "add",
            StepKind::Modify => "modify",
            StepKind::Remove => "remove",
            StepKind::Refactor => "refactor",
        }
    }
}

/// One ordered unit of a plan. `order` is dense and starts at 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub order: u32,
    pub goal: String,
    pub kind: StepKind,
    #[serde(default)]
    pub path: Option<String>,
}

/// Ordered steps plus rationale produced by the request planner.
/// One per change request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub parent_request_id: String,
    pub rationale: Vec<String>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub reserved_lease_ids: Vec<i64>,
}

impl Plan {
    /// Whether `steps[i].order == i + 1` holds throughout.
    pub fn steps_densely_ordered(&self) -> bool {
        self.steps
            .iter()
            .enumerate()
            .all(|(i, s)| s.order as usize == i + 1)
    }
}

/// Coding-effort label attached by the code planner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    #[serde(rename = "trivial")]
    Trivial,
    #[serde(rename = "moderate")]
    Moderate,
    #[serde(rename = "complex")]
    Complex,
}

/// One actionable unit for the coding agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodingTask {
    pub id: String,
    pub parent_plan_id: String,
    pub step_number: u32,
    pub goal: String,
    #[serde(default)]
    pub path: Option<String>,
    pub kind: StepKind,
    #[serde(default)]
    pub blob_ids: Vec<u64>,
    pub complexity: Complexity,
    #[serde(default)]
    pub reserved_lease_ids: Vec<i64>,
}

/// All tasks of a plan, emitted atomically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskBundle {
    pub plan_id: String,
    pub tasks: Vec<CodingTask>,
}

/// Terminal outcome of one coding task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    /// Retries exhausted; the pipeline may continue without this task.
    #[serde(rename = "SOFT_FAIL")]
    SoftFail,
    /// Unhandled error; an operator is required.
    #[serde(rename = "HARD_FAIL")]
    HardFail,
}

/// Result of one coding task. `commit_sha` and `branch_name` are empty
/// unless the status is `SUCCESS`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitResult {
    pub task_id: String,
    pub commit_sha: String,
    pub status: CommitStatus,
    pub branch_name: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl CommitResult {
    pub fn success(task_id: &str, commit_sha: &str, branch_name: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            commit_sha: commit_sha.to_string(),
            status: CommitStatus::Success,
            branch_name: branch_name.to_string(),
            notes: Vec::new(),
        }
    }

    pub fn soft_fail(task_id: &str, notes: Vec<String>) -> Self {
        Self {
            task_id: task_id.to_string(),
            commit_sha: String::new(),
            status: CommitStatus::SoftFail,
            branch_name: String::new(),
            notes,
        }
    }

    pub fn hard_fail(task_id: &str, error: String) -> Self {
        Self {
            task_id: task_id.to_string(),
            commit_sha: String::new(),
            status: CommitStatus::HardFail,
            branch_name: String::new(),
            notes: vec![error],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    #[serde(rename = "PASSED")]
    Passed,
    #[serde(rename = "FAILED")]
    Failed,
}

/// CI verdict for one commit. `status == PASSED` implies `failed_tests`
/// and `lint_errors` are both empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub commit_sha: String,
    pub status: BuildStatus,
    #[serde(default)]
    pub failed_tests: Vec<String>,
    #[serde(default)]
    pub lint_errors: Vec<String>,
    pub line_coverage: f32,
    pub artefact_url: String,
}

/// Test plan emitted by the (external) test planner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    pub id: String,
    pub plan_id: String,
    #[serde(default)]
    pub cases: Vec<String>,
}

/// Result of the (external) test builder's generation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTests {
    pub plan_id: String,
    pub precheck: BuildStatus,
}

/// Escalation payload published when a request enters regression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionSignal {
    pub request_id: String,
    /// Stage the FSM was leaving when the failure was observed.
    pub stage: String,
    #[serde(default)]
    pub hints: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_match_the_wire_contract() {
        assert_eq!(
            serde_json::to_string(&CommitStatus::Success).unwrap(),
            "\"SUCCESS\""
        );
        assert_eq!(
            serde_json::to_string(&CommitStatus::SoftFail).unwrap(),
            "\"SOFT_FAIL\""
        );
        assert_eq!(
            serde_json::to_string(&BuildStatus::Passed).unwrap(),
            "\"PASSED\""
        );
        assert_eq!(
            serde_json::to_string(&Complexity::Moderate).unwrap(),
            "\"moderate\""
        );
        assert_eq!(serde_json::to_string(&StepKind::Add).unwrap(), "\"ADD\"");
    }

    #[test]
    fn dense_ordering_check() {
        let mut plan = Plan {
            id: "p".into(),
            parent_request_id: "r".into(),
            rationale: vec![],
            steps: vec![
                Step {
                    order: 1,
                    goal: "a".into(),
                    kind: StepKind::Add,
                    path: None,
                },
                Step {
                    order: 2,
                    goal: "b".into(),
                    kind: StepKind::Modify,
                    path: None,
                },
            ],
            reserved_lease_ids: vec![],
        };
        assert!(plan.steps_densely_ordered());
        plan.steps[1].order = 3;
        assert!(!plan.steps_densely_ordered());
    }

    #[test]
    fn build_report_roundtrip_keeps_failures() {
        let report = BuildReport {
            commit_sha: "def456".into(),
            status: BuildStatus::Failed,
            failed_tests: vec!["test_foo::test_bar FAILED".into()],
            lint_errors: vec!["E501 line too long".into()],
            line_coverage: 75.5,
            artefact_url: "/artefacts/def456.tar.gz".into(),
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: BuildReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.failed_tests.len(), 1);
    }
}
