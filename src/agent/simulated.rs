//! Simulated handlers
//!
//! Stand-ins for the real business-logic agents. They sleep for a configured
//! latency, echo a small summary, and fail on demand when the task payload
//! lists their type under `simulate_failure`.

use crate::agent::handler::Handler;
use crate::error::{McpError, McpResult};
use crate::protocol::{HandlerType, Message, Task};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Payload key listing handler types that should fail
pub const SIMULATE_FAILURE_KEY: &str = "simulate_failure";

#[derive(Debug)]
pub struct SimulatedHandler {
    handler_type: HandlerType,
    latency: Duration,
    processed: AtomicU64,
    messages: Mutex<Vec<Message>>,
}

impl SimulatedHandler {
    pub fn new(handler_type: HandlerType) -> Self {
        Self::with_latency(handler_type, Duration::ZERO)
    }

    pub fn with_latency(handler_type: HandlerType, latency: Duration) -> Self {
        Self {
            handler_type,
            latency,
            processed: AtomicU64::new(0),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Number of tasks processed, successful or not
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Messages received so far
    pub fn received_messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn should_fail(&self, task: &Task) -> bool {
        task.data
            .get(SIMULATE_FAILURE_KEY)
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|name| name.parse::<HandlerType>() == Ok(self.handler_type))
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl Handler for SimulatedHandler {
    fn handler_type(&self) -> HandlerType {
        self.handler_type
    }

    async fn process_task(&self, task: &Task) -> McpResult<Value> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.processed.fetch_add(1, Ordering::Relaxed);

        if self.should_fail(task) {
            return Err(McpError::handler_failure(
                self.handler_type,
                format!("simulated failure for task {}", task.id),
            ));
        }

        debug!(handler = %self.handler_type, task_id = %task.id, "Simulated task processed");
        Ok(json!({
            "handler": self.handler_type,
            "task_id": task.id,
            "owner_id": task.owner_id,
            "summary": format!("{} handled {}", self.handler_type, task.task_type),
        }))
    }

    async fn receive_message(&self, message: &Message) -> McpResult<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}
