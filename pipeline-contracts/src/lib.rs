//! Record types and topic names shared across the pipeline.
//!
//! Every entity that crosses the bus lives here, together with the topic
//! constants and the codec registry that binds each topic to its wire
//! format. Entities are flat and joined by foreign keys
//! (`parent_request_id`, `parent_plan_id`, `reserved_lease_ids`); downstream
//! components hold immutable copies only.

mod model;
pub mod topics;

pub use model::{
    BuildReport, BuildStatus, ChangeRequest, CodingTask, CommitResult, CommitStatus, Complexity,
    GeneratedTests, Plan, RegressionSignal, Step, StepKind, TaskBundle, TestSpec,
};
