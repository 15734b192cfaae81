//! Learning MCP - task orchestration core
//!
//! Coordinates the specialized handlers of an adaptive learning assistant
//! (learner profiling, learning paths, assessments, content adaptation,
//! engagement, feedback, UI optimization, scheduling).
//!
//! # Overview
//!
//! - Protocol types: tasks, handler/task type tags, priorities, messages
//! - A priority task queue with stable FIFO order inside each priority
//! - A pure agent selector mapping tasks to handler types
//! - An orchestrator that drains the queue and fans tasks out to handlers
//! - A task monitor recording per-task lifecycles and aggregate stats
//! - A distribution test harness that follows test tasks to completion
//!
//! # Quick Start
//!
//! ```rust
//! use learning_mcp::orchestrator::PriorityTaskQueue;
//! use learning_mcp::protocol::{HandlerType, Priority, Task, TaskType};
//! use learning_mcp::routing::select_targets;
//!
//! let quiz = Task::new("learner-1", TaskType::MultiHandlerCoordination, "Weekly review")
//!     .with_priority(Priority::High)
//!     .with_context(["quiz", "schedule"]);
//!
//! assert_eq!(
//!     select_targets(&quiz),
//!     vec![HandlerType::Assessment, HandlerType::Scheduling]
//! );
//!
//! let mut queue = PriorityTaskQueue::new();
//! queue.add(Task::new("learner-1", TaskType::Feedback, "Later").with_priority(Priority::Low));
//! queue.add(quiz);
//! assert_eq!(queue.next().unwrap().effective_priority(), Priority::High);
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod profile;
pub mod protocol;
pub mod routing;
pub mod testing;

pub use agent::{AgentRegistry, Handler, SimulatedHandler};
pub use config::{ConfigError, McpConfig};
pub use error::{McpError, McpResult};
pub use observability::TaskMonitor;
pub use orchestrator::{CompletionHandle, Orchestrator, TaskOrchestrator, TaskOutcome};
pub use profile::{InMemoryProfileRepository, ProfileRepository};
pub use protocol::*;
