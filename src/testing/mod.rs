//! Testing utilities
//!
//! The distribution test harness and its progress tracker, plus mock handlers
//! and repositories for exercising the orchestrator without real agents.

pub mod harness;
pub mod mocks;
pub mod progress;

pub use harness::{
    DistributionTestHarness, TestOptions, TestOutcome, TestStatus, DEFAULT_TEST_CONTEXT,
    DEFAULT_TEST_OWNER,
};
pub use mocks::*;
pub use progress::{AgentRunResult, HarnessProgress, ReportingHandler};
