//! The pipeline state machine, pure and synchronous.

use thiserror::Error;

/// Stages of one change request's run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Plan,
    Code,
    Build1,
    TestPlan,
    TestBuild,
    Build2,
    Done,
    Regress,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Plan => "plan_phase",
            Stage::Code => "code_phase",
            Stage::Build1 => "build1",
            Stage::TestPlan => "test_plan",
            Stage::TestBuild => "test_build",
            Stage::Build2 => "build2",
            Stage::Done => "done",
            Stage::Regress => "regress",
        }
    }
}

/// Events that drive the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    Crq,
    Plan,
    CodeOk,
    BuildOk,
    BuildFail,
    Tspec,
    GtOk,
    GtFail,
    Build2Ok,
    Reset,
}

#[derive(Debug, Error)]
#[error("no transition for {event:?} in stage {from:?}")]
pub struct TransitionError {
    pub from: Stage,
    pub event: PipelineEvent,
}

/// One change request's machine.
#[derive(Debug)]
pub struct OrchestratorFsm {
    state: Stage,
}

impl OrchestratorFsm {
    pub fn new() -> Self {
        Self { state: Stage::Idle }
    }

    pub fn state(&self) -> Stage {
        self.state
    }

    /// Applies one event; on an undefined pair the state is unchanged and
    /// the error names both sides.
    pub fn apply(&mut self, event: PipelineEvent) -> Result<Stage, TransitionError> {
        use PipelineEvent as E;
        use Stage as S;

        let next = match (self.state, event) {
            (S::Idle, E::Crq) => S::Plan,
            (S::Plan, E::Plan) => S::Code,
            (S::Code, E::CodeOk) => S::Build1,
            (S::Build1, E::BuildOk) => S::TestPlan,
            (S::TestPlan, E::Tspec) => S::TestBuild,
            (S::TestBuild, E::GtOk) => S::Build2,
            (S::TestBuild, E::GtFail) => S::Regress,
            (S::Build2, E::Build2Ok) => S::Done,
            // a failed build regresses from anywhere
            (_, E::BuildFail) => S::Regress,
            (S::Done, E::Reset) | (S::Regress, E::Reset) => S::Idle,
            (from, event) => return Err(TransitionError { from, event }),
        };
        self.state = next;
        Ok(next)
    }
}

impl Default for OrchestratorFsm {
    fn default() -> Self {
        Self::new()
    }
}
