//! Task orchestration
//!
//! The orchestrator accepts tasks into a priority queue, drains it one task
//! at a time, fans each task out to the handler types the selector resolves
//! and keeps the shared system state and completion-rate metric.

pub mod mcp;
pub mod outcome;
pub mod queue;
pub mod state;

use crate::error::McpResult;
use crate::observability::TaskMonitor;
use crate::protocol::{HandlerType, Message, Task};
use async_trait::async_trait;

pub use mcp::{Orchestrator, OrchestratorBuilder, INITIALIZE_FOR_OWNER};
pub use outcome::{CompletionHandle, HandlerRun, HandlerRunOutcome, TaskOutcome};
pub use queue::PriorityTaskQueue;
pub use state::{SystemMetrics, SystemState, CURRENT_OWNER_KEY, OWNER_PROFILE_KEY};

/// Submission surface used by callers that only need to hand work over
///
/// The distribution test harness depends on this rather than the concrete
/// orchestrator so it can be driven against a stand-in.
#[async_trait]
pub trait TaskOrchestrator: Send + Sync {
    /// Queue a task; fails synchronously only when the task cannot be accepted
    fn submit(&self, task: Task) -> McpResult<CompletionHandle>;

    /// Deliver a message to handlers, returning how many accepted it
    async fn broadcast(&self, message: &Message, target_types: Option<&[HandlerType]>) -> usize;

    /// Record the active owner and queue their initial profiling task
    async fn initialize_for_owner(&self, owner_id: &str) -> McpResult<CompletionHandle>;

    fn system_state(&self) -> SystemState;

    fn monitor(&self) -> TaskMonitor;
}
