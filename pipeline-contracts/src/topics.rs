//! Topic names and the per-topic codec mapping.
//!
//! All topics are partition-keyed by `ChangeRequest.id` so that one
//! request's plan, bundle, and commit results reach the orchestrator in
//! order. Contract records ride the binary frame; the regression signal is
//! self-describing JSON so escalation tooling can read it without the
//! schema.

use event_bus::{CodecRegistry, WireFormat};

pub const CHANGE_REQUEST_IN: &str = "change.request.in";
pub const PLAN_OUT: &str = "plan.out";
pub const TASK_BUNDLE_OUT: &str = "task.bundle.out";
pub const COMMIT_RESULT_OUT: &str = "commit.result.out";
pub const BUILD_REPORT_OUT: &str = "build.report.out";
pub const TEST_SPEC_OUT: &str = "test.spec.out";
pub const GENERATED_TESTS_OUT: &str = "generated.tests.out";
pub const REGRESSION_OUT: &str = "regression.out";

/// Every topic the orchestrator observes.
pub const ALL_OBSERVED: [&str; 7] = [
    CHANGE_REQUEST_IN,
    PLAN_OUT,
    TASK_BUNDLE_OUT,
    COMMIT_RESULT_OUT,
    BUILD_REPORT_OUT,
    TEST_SPEC_OUT,
    GENERATED_TESTS_OUT,
];

/// The codec mapping used by every component in the pipeline.
pub fn codec_registry() -> CodecRegistry {
    CodecRegistry::new()
        .with(CHANGE_REQUEST_IN, WireFormat::Binary)
        .with(PLAN_OUT, WireFormat::Binary)
        .with(TASK_BUNDLE_OUT, WireFormat::Binary)
        .with(COMMIT_RESULT_OUT, WireFormat::Binary)
        .with(BUILD_REPORT_OUT, WireFormat::Binary)
        .with(TEST_SPEC_OUT, WireFormat::Binary)
        .with(GENERATED_TESTS_OUT, WireFormat::Binary)
        .with(REGRESSION_OUT, WireFormat::Json)
}
