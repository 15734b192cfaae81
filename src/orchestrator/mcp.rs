//! Orchestrator: the dequeue / select / dispatch / record loop
//!
//! One drain loop runs at a time. It pops the highest-priority task, resolves
//! its handler set, fans the task out to every resolved handler concurrently
//! and waits for all of them before touching the next task. Handler errors,
//! panics and timeouts are contained per handler; none of them stop the loop.

use crate::agent::{AgentRegistry, Handler};
use crate::config::McpConfig;
use crate::error::{McpError, McpResult};
use crate::observability::TaskMonitor;
use crate::orchestrator::outcome::{
    runs_to_result, CompletionHandle, HandlerRun, HandlerRunOutcome, TaskOutcome,
};
use crate::orchestrator::queue::PriorityTaskQueue;
use crate::orchestrator::state::{SystemState, CURRENT_OWNER_KEY, OWNER_PROFILE_KEY};
use crate::orchestrator::TaskOrchestrator;
use crate::profile::ProfileRepository;
use crate::protocol::{HandlerType, Message, Priority, Task, TaskStatus, TaskType};
use crate::routing::agent_selector;
use crate::{dispatch_span, task_span};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn, Instrument};

pub const TARGETS_RESOLVED: &str = "TARGETS_RESOLVED";
pub const ROUTING_FAILED: &str = "ROUTING_FAILED";
pub const HANDLER_STARTED: &str = "HANDLER_STARTED";
pub const HANDLER_COMPLETED: &str = "HANDLER_COMPLETED";
pub const HANDLER_FAILED: &str = "HANDLER_FAILED";
pub const HANDLER_SKIPPED: &str = "HANDLER_SKIPPED";

/// Content of the system message broadcast by `initialize_for_owner`
pub const INITIALIZE_FOR_OWNER: &str = "INITIALIZE_FOR_OWNER";

const ORCHESTRATOR_SENDER_ID: &str = "orchestrator";

/// Queue plus everything that must change atomically with it
#[derive(Default)]
struct DispatchState {
    queue: PriorityTaskQueue,
    draining: bool,
    submitted_ids: HashSet<String>,
    waiters: HashMap<String, oneshot::Sender<TaskOutcome>>,
}

struct OrchestratorInner {
    registry: AgentRegistry,
    monitor: TaskMonitor,
    state: RwLock<SystemState>,
    dispatch: Mutex<DispatchState>,
    profiles: Option<Arc<dyn ProfileRepository>>,
    handler_timeout: Option<Duration>,
    max_records: usize,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    config: McpConfig,
    registry: AgentRegistry,
    monitor: TaskMonitor,
    profiles: Option<Arc<dyn ProfileRepository>>,
}

impl OrchestratorBuilder {
    pub fn registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn monitor(mut self, monitor: TaskMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn profile_repository(mut self, profiles: Arc<dyn ProfileRepository>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn build(self) -> Orchestrator {
        self.monitor.set_enabled(self.config.monitor.enabled);

        let state = SystemState {
            active_agents: self.registry.list_types(),
            ..Default::default()
        };

        Orchestrator {
            inner: Arc::new(OrchestratorInner {
                registry: self.registry,
                monitor: self.monitor,
                state: RwLock::new(state),
                dispatch: Mutex::new(DispatchState::default()),
                profiles: self.profiles,
                handler_timeout: self.config.orchestrator.handler_timeout(),
                max_records: self.config.monitor.max_records,
            }),
        }
    }
}

/// The coordinating component owning the queue, registry access and metrics
///
/// Cheap to clone; clones share one queue and one drain loop. Construct one
/// per composition root (or per test) and pass it where it is needed.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.inner.registry)
            .field("queue_len", &self.queue_len())
            .field("draining", &self.is_draining())
            .finish()
    }
}

impl Orchestrator {
    pub fn builder(config: McpConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            registry: AgentRegistry::new(),
            monitor: TaskMonitor::new(),
            profiles: None,
        }
    }

    /// Orchestrator with default configuration and an empty registry
    pub fn new() -> Self {
        Self::builder(McpConfig::default()).build()
    }

    fn dispatch_state(&self) -> MutexGuard<'_, DispatchState> {
        self.inner
            .dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn update_state<R>(&self, update: impl FnOnce(&mut SystemState) -> R) -> R {
        let mut state = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        update(&mut state)
    }

    /// Register a handler under its declared type and mark the type active
    pub fn register_handler(&self, handler: Arc<dyn Handler>) {
        let handler_type = handler.handler_type();
        self.inner.registry.register(handler_type, handler);
        self.update_state(|state| state.active_agents.insert(handler_type));
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.inner.registry
    }

    pub fn monitor(&self) -> &TaskMonitor {
        &self.inner.monitor
    }

    pub fn queue_len(&self) -> usize {
        self.dispatch_state().queue.size()
    }

    pub fn is_draining(&self) -> bool {
        self.dispatch_state().draining
    }

    /// Read-only snapshot of the system state
    pub fn system_state(&self) -> SystemState {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_global_state(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.update_state(|state| state.global_state.insert(key, value));
    }

    pub fn global_state(&self, key: &str) -> Option<Value> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .global_state
            .get(key)
            .cloned()
    }

    /// Nudge the completion rate toward 1
    pub fn record_task_success(&self) {
        self.update_state(|state| state.metrics.record_success());
    }

    /// Nudge the completion rate toward 0
    pub fn record_task_failure(&self) {
        self.update_state(|state| state.metrics.record_failure());
    }

    /// Queue a task and make sure the drain loop is running
    ///
    /// Fails without enqueueing when the id is empty or was already
    /// submitted, or when called outside a tokio runtime.
    pub fn submit(&self, task: Task) -> McpResult<CompletionHandle> {
        if task.id.trim().is_empty() {
            return Err(McpError::invalid_input("task id must not be empty"));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            McpError::internal_error("task submission requires a running tokio runtime")
        })?;

        let task_id = task.id.clone();
        let (sender, receiver) = oneshot::channel();

        let start_drain = {
            let mut dispatch = self.dispatch_state();
            if !dispatch.submitted_ids.insert(task_id.clone()) {
                return Err(McpError::DuplicateTaskId { task_id });
            }
            dispatch.waiters.insert(task_id.clone(), sender);
            dispatch.queue.add(task);

            let start_drain = !dispatch.draining;
            dispatch.draining = true;
            start_drain
        };

        debug!(task_id = %task_id, start_drain, "Task submitted");

        if start_drain {
            let orchestrator = self.clone();
            runtime.spawn(async move { orchestrator.drain().await });
        }

        Ok(CompletionHandle::new(task_id, receiver))
    }

    /// Pop the next task, or clear the draining flag when the queue is empty
    ///
    /// Both happen under the dispatch lock so a concurrent `submit` either
    /// sees the loop running or starts a new one.
    fn next_task(&self) -> Option<Task> {
        let mut dispatch = self.dispatch_state();
        let next = dispatch.queue.next();
        if next.is_none() {
            dispatch.draining = false;
        }
        next
    }

    async fn drain(self) {
        debug!("Drain loop started");
        while let Some(task) = self.next_task() {
            self.process_task(task).await;
        }
        debug!("Drain loop idle");
    }

    async fn process_task(&self, mut task: Task) {
        let span = task_span!(
            task_id = %task.id,
            task_type = %task.task_type,
            priority = %task.effective_priority()
        );

        async move {
            let monitor = &self.inner.monitor;
            task.status = Some(TaskStatus::Processing);
            monitor.record_start(&task);

            let selection = agent_selector::select(&task);
            monitor.record_targets(&task.id, &selection.targets);
            monitor.record_event(
                &task.id,
                TARGETS_RESOLVED,
                Some(json!({ "targets": selection.targets, "source": selection.source })),
            );

            if selection.is_empty() {
                let failure = McpError::routing_failure(&task.id);
                let reason = failure.failure_reason();
                warn!(reason = %reason, "Routing failure");

                monitor.record_event(
                    &task.id,
                    ROUTING_FAILED,
                    Some(json!({ "code": failure.code(), "reason": reason })),
                );
                self.record_task_failure();
                self.finish(task, TaskStatus::Failed, json!({ "error": reason }), Vec::new());
                return;
            }

            debug!(targets = ?selection.targets, source = ?selection.source, "Dispatching task");

            let runs = join_all(
                selection
                    .targets
                    .iter()
                    .map(|handler_type| self.dispatch_to(*handler_type, &task)),
            )
            .await;

            let status = if runs.iter().any(HandlerRun::is_failure) {
                self.record_task_failure();
                TaskStatus::Failed
            } else {
                if runs
                    .iter()
                    .all(|run| run.outcome == HandlerRunOutcome::Skipped)
                {
                    warn!("No resolved handler is registered; task completes without work");
                }
                self.record_task_success();
                TaskStatus::Completed
            };

            let result = runs_to_result(&runs);
            self.finish(task, status, result, runs);
        }
        .instrument(span)
        .await
    }

    async fn dispatch_to(&self, handler_type: HandlerType, task: &Task) -> HandlerRun {
        let monitor = &self.inner.monitor;

        let Some(handler) = self.inner.registry.get(handler_type) else {
            debug!(handler = %handler_type, "Handler not registered, skipping");
            monitor.record_event(
                &task.id,
                HANDLER_SKIPPED,
                Some(json!({ "handler": handler_type })),
            );
            return HandlerRun {
                handler_type,
                outcome: HandlerRunOutcome::Skipped,
            };
        };

        monitor.record_event(
            &task.id,
            HANDLER_STARTED,
            Some(json!({ "handler": handler_type })),
        );

        let outcome = match self
            .invoke(handler_type, handler.as_ref(), task)
            .instrument(dispatch_span!(handler = %handler_type))
            .await
        {
            Ok(value) => {
                debug!(handler = %handler_type, "Handler completed");
                monitor.record_event(
                    &task.id,
                    HANDLER_COMPLETED,
                    Some(json!({ "handler": handler_type })),
                );
                HandlerRunOutcome::Succeeded(value)
            }
            Err(failure) => {
                let reason = failure.failure_reason();
                error!(handler = %handler_type, code = failure.code(), reason = %reason, "Handler failed");
                monitor.record_event(
                    &task.id,
                    HANDLER_FAILED,
                    Some(json!({
                        "handler": handler_type,
                        "code": failure.code(),
                        "reason": reason,
                    })),
                );
                HandlerRunOutcome::Failed(reason)
            }
        };

        HandlerRun {
            handler_type,
            outcome,
        }
    }

    /// Run one handler, converting panics and deadline overruns into errors
    async fn invoke(
        &self,
        handler_type: HandlerType,
        handler: &dyn Handler,
        task: &Task,
    ) -> McpResult<Value> {
        let call = AssertUnwindSafe(handler.process_task(task)).catch_unwind();

        let result = match self.inner.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(McpError::HandlerTimeout {
                        handler: handler_type,
                        timeout_ms: limit.as_millis() as u64,
                    })
                }
            },
            None => call.await,
        };

        result.unwrap_or_else(|panic| {
            Err(McpError::handler_failure(
                handler_type,
                format!("handler panicked: {}", panic_message(panic.as_ref())),
            ))
        })
    }

    fn finish(&self, mut task: Task, status: TaskStatus, result: Value, runs: Vec<HandlerRun>) {
        let monitor = &self.inner.monitor;

        task.status = Some(status);
        task.completed_at = Some(Utc::now());
        task.result = Some(result.clone());

        monitor.record_completion(&task.id, status, Some(result));
        if monitor.len() > self.inner.max_records {
            monitor.evict_oldest(self.inner.max_records);
        }

        info!(%status, handlers = runs.len(), "Task finished");

        let waiter = self.dispatch_state().waiters.remove(&task.id);
        if let Some(sender) = waiter {
            // Receiver may be gone; submission is fire-and-forget for callers that drop it
            let _ = sender.send(TaskOutcome { task, runs });
        }
    }

    /// Deliver a message to the given handler types, or to every active type
    ///
    /// Returns how many handlers accepted the message. One handler failing or
    /// panicking does not stop delivery to the others.
    pub async fn broadcast(&self, message: &Message, target_types: Option<&[HandlerType]>) -> usize {
        let targets: Vec<HandlerType> = match target_types {
            Some(types) => types.to_vec(),
            None => self.system_state().active_agents.into_iter().collect(),
        };

        let deliveries = targets.into_iter().filter_map(|handler_type| {
            let handler = self.inner.registry.get(handler_type);
            if handler.is_none() {
                debug!(handler = %handler_type, "Broadcast target not registered");
            }
            handler.map(|handler| async move {
                let delivery = AssertUnwindSafe(handler.receive_message(message))
                    .catch_unwind()
                    .await;
                match delivery {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!(handler = %handler_type, error = %e, "Message delivery failed");
                        false
                    }
                    Err(panic) => {
                        warn!(
                            handler = %handler_type,
                            panic = %panic_message(panic.as_ref()),
                            "Handler panicked while receiving message"
                        );
                        false
                    }
                }
            })
        });

        let delivered = join_all(deliveries)
            .await
            .into_iter()
            .filter(|accepted| *accepted)
            .count();

        debug!(
            message_type = ?message.message_type,
            content = %message.content,
            delivered,
            "Broadcast complete"
        );
        delivered
    }

    /// Prepare the system for an owner and queue their initial profiling task
    ///
    /// A failed profile lookup is logged and initialization continues
    /// without a cached profile.
    pub async fn initialize_for_owner(&self, owner_id: &str) -> McpResult<CompletionHandle> {
        if owner_id.trim().is_empty() {
            return Err(McpError::invalid_input("owner id must not be empty"));
        }

        info!(owner_id, "Initializing for owner");
        self.set_global_state(CURRENT_OWNER_KEY, json!(owner_id));

        if let Some(profiles) = &self.inner.profiles {
            let profile = match profiles.fetch_profile(owner_id).await {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(owner_id, error = %e, "Profile lookup failed, continuing without profile");
                    None
                }
            };
            self.update_state(|state| match profile {
                Some(profile) => state
                    .global_state
                    .insert(OWNER_PROFILE_KEY.to_string(), profile),
                None => state.global_state.remove(OWNER_PROFILE_KEY),
            });
        }

        let message = Message::system(INITIALIZE_FOR_OWNER, json!({ "owner_id": owner_id }))
            .with_sender(ORCHESTRATOR_SENDER_ID);
        self.broadcast(&message, None).await;

        let task = Task::new(owner_id, TaskType::Profiling, "Initial learner profile setup")
            .with_priority(Priority::High)
            .with_context(["initial_setup", "user_profile"])
            .with_data("owner_id", json!(owner_id))
            .with_data("initial_setup", json!(true));

        self.submit(task)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl TaskOrchestrator for Orchestrator {
    fn submit(&self, task: Task) -> McpResult<CompletionHandle> {
        Orchestrator::submit(self, task)
    }

    async fn broadcast(&self, message: &Message, target_types: Option<&[HandlerType]>) -> usize {
        Orchestrator::broadcast(self, message, target_types).await
    }

    async fn initialize_for_owner(&self, owner_id: &str) -> McpResult<CompletionHandle> {
        Orchestrator::initialize_for_owner(self, owner_id).await
    }

    fn system_state(&self) -> SystemState {
        Orchestrator::system_state(self)
    }

    fn monitor(&self) -> TaskMonitor {
        Orchestrator::monitor(self).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::SimulatedHandler;

    #[test]
    fn test_submit_outside_runtime_fails() {
        let orchestrator = Orchestrator::new();
        let task = Task::new("o", TaskType::Profiling, "no runtime");

        let result = orchestrator.submit(task);

        assert!(matches!(result, Err(McpError::Internal { .. })));
        assert_eq!(orchestrator.queue_len(), 0);
        assert!(!orchestrator.is_draining());
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let orchestrator = Orchestrator::new();
        let task = Task::new("o", TaskType::Profiling, "").with_id("  ");

        assert!(matches!(
            orchestrator.submit(task),
            Err(McpError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let orchestrator = Orchestrator::new();
        orchestrator.register_handler(Arc::new(SimulatedHandler::new(HandlerType::Profiling)));

        let first = orchestrator
            .submit(Task::new("o", TaskType::Profiling, "").with_id("dup"))
            .unwrap();
        first.wait().await.unwrap();

        let second = orchestrator.submit(Task::new("o", TaskType::Profiling, "").with_id("dup"));
        assert!(matches!(second, Err(McpError::DuplicateTaskId { .. })));
    }

    #[tokio::test]
    async fn test_register_handler_marks_active() {
        let orchestrator = Orchestrator::new();
        orchestrator.register_handler(Arc::new(SimulatedHandler::new(HandlerType::Feedback)));

        let state = orchestrator.system_state();
        assert!(state.active_agents.contains(&HandlerType::Feedback));
        assert!(orchestrator.registry().contains(HandlerType::Feedback));
    }

    #[test]
    fn test_builder_seeds_active_agents_from_registry() {
        let registry = AgentRegistry::new();
        registry.register(
            HandlerType::UiUx,
            Arc::new(SimulatedHandler::new(HandlerType::UiUx)),
        );

        let orchestrator = Orchestrator::builder(McpConfig::default())
            .registry(registry)
            .build();

        assert!(orchestrator
            .system_state()
            .active_agents
            .contains(&HandlerType::UiUx));
    }

    #[test]
    fn test_builder_applies_monitor_enabled_flag() {
        let mut config = McpConfig::default();
        config.monitor.enabled = false;

        let orchestrator = Orchestrator::builder(config).build();
        assert!(!orchestrator.monitor().is_enabled());
    }

    #[test]
    fn test_system_state_is_a_snapshot() {
        let orchestrator = Orchestrator::new();
        let mut snapshot = orchestrator.system_state();
        snapshot
            .global_state
            .insert("injected".to_string(), json!(true));
        snapshot.metrics.task_completion_rate = 0.99;

        assert!(orchestrator.global_state("injected").is_none());
        assert_eq!(orchestrator.system_state().metrics.task_completion_rate, 0.0);
    }

    #[test]
    fn test_metrics_nudges() {
        let orchestrator = Orchestrator::new();
        orchestrator.record_task_success();
        orchestrator.record_task_success();
        orchestrator.record_task_failure();

        let rate = orchestrator.system_state().metrics.task_completion_rate;
        assert!((rate - 0.171).abs() < 1e-9);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
