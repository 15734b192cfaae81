//! Process-wide system state owned by the orchestrator

use crate::protocol::HandlerType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Smoothing factor for the completion-rate moving average
pub const COMPLETION_RATE_SMOOTHING: f64 = 0.1;

/// Global state key holding the current owner id
pub const CURRENT_OWNER_KEY: &str = "current_owner_id";
/// Global state key holding the cached owner profile snapshot
pub const OWNER_PROFILE_KEY: &str = "owner_profile";

/// System-wide metrics record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Exponential moving average of task success, in [0, 1]
    pub task_completion_rate: f64,
    /// Reserved
    pub average_response_time: f64,
    /// Reserved
    pub user_satisfaction_score: f64,
    /// Additional numeric metrics
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl SystemMetrics {
    /// rate += (1 - rate) * smoothing
    pub fn record_success(&mut self) {
        let rate = self.task_completion_rate;
        self.task_completion_rate =
            (rate + (1.0 - rate) * COMPLETION_RATE_SMOOTHING).clamp(0.0, 1.0);
    }

    /// rate -= rate * smoothing
    pub fn record_failure(&mut self) {
        let rate = self.task_completion_rate;
        self.task_completion_rate = (rate - rate * COMPLETION_RATE_SMOOTHING).clamp(0.0, 1.0);
    }
}

/// Snapshot-able system state
///
/// Handed out by value from the orchestrator, so callers can never reach the
/// live copy through it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    /// Handler types registered with the orchestrator
    pub active_agents: BTreeSet<HandlerType>,
    pub metrics: SystemMetrics,
    /// Reserved
    pub priority_matrix: HashMap<String, f64>,
    /// Free-form global key/value bag
    pub global_state: HashMap<String, Value>,
}

impl SystemState {
    pub fn current_owner_id(&self) -> Option<&str> {
        self.global_state
            .get(CURRENT_OWNER_KEY)
            .and_then(Value::as_str)
    }
}
