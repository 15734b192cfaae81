//! Routing
//!
//! Maps tasks to the handler types that should process them. Selection is a
//! pure function of the task; the orchestrator looks the resolved types up in
//! the agent registry separately.

pub mod agent_selector;

pub use agent_selector::{
    compose_team, handlers_for_task_type, select, select_targets, AgentSelection,
    SelectionSource, DEFAULT_TEAM,
};
