//! Handler contract
//!
//! Every processing agent exposes the same two operations to the
//! orchestrator. What a handler does inside `process_task` is its own
//! business; the orchestrator only sees the outcome.

use crate::error::McpResult;
use crate::protocol::{HandlerType, Message, Task};
use async_trait::async_trait;
use serde_json::Value;

/// A named processing agent
///
/// Implementations must be safe to call concurrently: the orchestrator fans
/// one task out to several handlers at once, and broadcasts may arrive while
/// a task is in flight.
#[async_trait]
pub trait Handler: Send + Sync {
    /// The single type tag this handler is registered under
    fn handler_type(&self) -> HandlerType;

    /// Process a task and return its outcome
    async fn process_task(&self, task: &Task) -> McpResult<Value>;

    /// Receive a broadcast or point-to-point message; must not block indefinitely
    async fn receive_message(&self, message: &Message) -> McpResult<()>;
}
