//! Mock implementations for testing
//!
//! Provides mock handlers, profile repositories and a rejecting orchestrator
//! so dispatch, isolation and harness paths can be exercised in-process.

use crate::agent::Handler;
use crate::error::{McpError, McpResult};
use crate::observability::TaskMonitor;
use crate::orchestrator::{CompletionHandle, SystemState, TaskOrchestrator};
use crate::profile::ProfileRepository;
use crate::protocol::{HandlerType, Message, Task};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

/// What a mock handler does once it has a task
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed,
    Fail(String),
    Panic(String),
}

/// Mock handler for testing
///
/// Records every task id it is handed, in arrival order. A gated mock holds
/// each task until a permit is released, which lets tests queue work behind
/// a task that is still in flight.
#[derive(Debug)]
pub struct MockHandler {
    pub handler_type: HandlerType,
    pub behavior: MockBehavior,
    pub delay: Option<Duration>,
    pub reject_messages: bool,
    pub processed: Arc<Mutex<Vec<String>>>,
    pub messages: Arc<Mutex<Vec<Message>>>,
    gate: Option<Semaphore>,
}

impl MockHandler {
    pub fn new(handler_type: HandlerType) -> Self {
        Self {
            handler_type,
            behavior: MockBehavior::Succeed,
            delay: None,
            reject_messages: false,
            processed: Arc::new(Mutex::new(Vec::new())),
            messages: Arc::new(Mutex::new(Vec::new())),
            gate: None,
        }
    }

    pub fn failing(handler_type: HandlerType, message: impl Into<String>) -> Self {
        Self {
            behavior: MockBehavior::Fail(message.into()),
            ..Self::new(handler_type)
        }
    }

    pub fn panicking(handler_type: HandlerType, message: impl Into<String>) -> Self {
        Self {
            behavior: MockBehavior::Panic(message.into()),
            ..Self::new(handler_type)
        }
    }

    /// Mock that waits for [`MockHandler::release`] before each task
    pub fn gated(handler_type: HandlerType) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(handler_type)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn rejecting_messages(mut self) -> Self {
        self.reject_messages = true;
        self
    }

    /// Let `count` more tasks through the gate
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    pub async fn processed_ids(&self) -> Vec<String> {
        self.processed.lock().await.clone()
    }

    pub async fn processed_count(&self) -> usize {
        self.processed.lock().await.len()
    }

    pub async fn received_messages(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl Handler for MockHandler {
    fn handler_type(&self) -> HandlerType {
        self.handler_type
    }

    async fn process_task(&self, task: &Task) -> McpResult<Value> {
        self.processed.lock().await.push(task.id.clone());

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| McpError::internal_error("Mock gate closed"))?
                .forget();
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            MockBehavior::Succeed => Ok(json!({
                "handler": self.handler_type,
                "task_id": task.id,
            })),
            MockBehavior::Fail(message) => {
                Err(McpError::handler_failure(self.handler_type, message.clone()))
            }
            MockBehavior::Panic(message) => panic!("{}", message),
        }
    }

    async fn receive_message(&self, message: &Message) -> McpResult<()> {
        if self.reject_messages {
            return Err(McpError::internal_error("Mock message rejection"));
        }
        self.messages.lock().await.push(message.clone());
        Ok(())
    }
}

/// Profile repository whose lookups always fail
#[derive(Debug, Default)]
pub struct FailingProfileRepository;

#[async_trait]
impl ProfileRepository for FailingProfileRepository {
    async fn fetch_profile(&self, _owner_id: &str) -> McpResult<Option<Value>> {
        Err(McpError::profile_lookup("Mock profile store unavailable"))
    }
}

/// Orchestrator stand-in that refuses every submission
#[derive(Debug, Default)]
pub struct RejectingOrchestrator {
    pub monitor: TaskMonitor,
}

impl RejectingOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskOrchestrator for RejectingOrchestrator {
    fn submit(&self, _task: Task) -> McpResult<CompletionHandle> {
        Err(McpError::internal_error("Mock submission rejected"))
    }

    async fn broadcast(&self, _message: &Message, _target_types: Option<&[HandlerType]>) -> usize {
        0
    }

    async fn initialize_for_owner(&self, _owner_id: &str) -> McpResult<CompletionHandle> {
        Err(McpError::internal_error("Mock submission rejected"))
    }

    fn system_state(&self) -> SystemState {
        SystemState::default()
    }

    fn monitor(&self) -> TaskMonitor {
        self.monitor.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TaskType;

    #[tokio::test]
    async fn test_mock_handler_records_tasks() {
        let handler = MockHandler::new(HandlerType::Feedback);
        let task = Task::new("o", TaskType::Feedback, "mock").with_id("m1");

        let value = handler.process_task(&task).await.unwrap();

        assert_eq!(value["task_id"], json!("m1"));
        assert_eq!(handler.processed_ids().await, vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_mock_handler() {
        let handler = MockHandler::failing(HandlerType::Feedback, "nope");
        let task = Task::new("o", TaskType::Feedback, "mock");

        let err = handler.process_task(&task).await.unwrap_err();
        assert!(matches!(err, McpError::HandlerFailure { .. }));
        assert_eq!(handler.processed_count().await, 1);
    }

    #[tokio::test]
    async fn test_gated_mock_waits_for_release() {
        let handler = Arc::new(MockHandler::gated(HandlerType::UiUx));
        let task = Task::new("o", TaskType::UiOptimization, "gated");

        let worker = {
            let handler = handler.clone();
            tokio::spawn(async move { handler.process_task(&task).await })
        };

        tokio::task::yield_now().await;
        assert!(!worker.is_finished());

        handler.release(1);
        assert!(worker.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_rejecting_messages() {
        let handler = MockHandler::new(HandlerType::UiUx).rejecting_messages();
        let message = Message::system("ping", json!({}));

        assert!(handler.receive_message(&message).await.is_err());
        assert!(handler.received_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_failing_profile_repository() {
        let repository = FailingProfileRepository;
        assert!(matches!(
            repository.fetch_profile("anyone").await,
            Err(McpError::ProfileLookup { .. })
        ));
    }
}
