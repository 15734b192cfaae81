//! Distribution test harness
//!
//! Submits a synthetic test task through the orchestrator and follows it by
//! polling the per-handler progress that [`ReportingHandler`]s feed into the
//! shared [`HarnessProgress`]. Unlike plain submission, this path reports the
//! result back to the caller as a structured outcome.
//!
//! [`ReportingHandler`]: crate::testing::ReportingHandler

use crate::config::HarnessSection;
use crate::error::McpError;
use crate::harness_span;
use crate::observability::TaskMonitor;
use crate::orchestrator::TaskOrchestrator;
use crate::protocol::{HandlerType, Priority, Task, TaskStatus, TaskType, TEST_FLAG_KEY, TEST_ID_KEY};
use crate::routing::select_targets;
use crate::testing::progress::{AgentRunResult, HarnessProgress};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

pub const DEFAULT_TEST_OWNER: &str = "test-user";
pub const DEFAULT_TEST_CONTEXT: &str = "distribution_test";

const NO_HANDLER_REASON: &str = "No suitable handler found";

/// Caller-supplied overrides for a test run; everything is optional
#[derive(Debug, Clone, Default)]
pub struct TestOptions {
    pub owner_id: Option<String>,
    pub task_type: Option<TaskType>,
    pub target_handlers: Option<Vec<HandlerType>>,
    pub priority: Option<Priority>,
    pub context: Option<Vec<String>>,
    pub payload: Option<Map<String, Value>>,
    pub timeout: Option<Duration>,
}

/// Terminal state of a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Completed,
    Failed,
    Timeout,
    SubmissionFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestOutcome {
    pub task_id: String,
    pub test_id: String,
    pub status: TestStatus,
    pub success: bool,
    pub processing_time_ms: u64,
    pub per_agent_results: BTreeMap<HandlerType, AgentRunResult>,
    pub error: Option<String>,
}

/// Runs synthetic tasks end to end through a [`TaskOrchestrator`]
pub struct DistributionTestHarness {
    orchestrator: Arc<dyn TaskOrchestrator>,
    progress: HarnessProgress,
    monitor: TaskMonitor,
    poll_interval: Duration,
    timeout: Duration,
}

impl DistributionTestHarness {
    pub fn new(
        orchestrator: Arc<dyn TaskOrchestrator>,
        progress: HarnessProgress,
        settings: &HarnessSection,
    ) -> Self {
        let monitor = orchestrator.monitor();
        Self {
            orchestrator,
            progress,
            monitor,
            poll_interval: settings.poll_interval(),
            timeout: settings.timeout(),
        }
    }

    pub fn progress(&self) -> &HarnessProgress {
        &self.progress
    }

    /// Build the synthetic task for a run along with its test id
    fn build_task(options: &TestOptions) -> (Task, String) {
        let test_id = Uuid::new_v4().to_string();
        let owner_id = options
            .owner_id
            .clone()
            .unwrap_or_else(|| DEFAULT_TEST_OWNER.to_string());
        let task_type = options.task_type.clone().unwrap_or(TaskType::Profiling);
        let context = options
            .context
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_TEST_CONTEXT.to_string()]);

        let mut task = Task::new(owner_id, task_type, format!("Distribution test {test_id}"))
            .with_priority(options.priority.unwrap_or_default())
            .with_context(context);

        if let Some(payload) = &options.payload {
            task.data
                .extend(payload.iter().map(|(key, value)| (key.clone(), value.clone())));
        }
        task.data.insert(TEST_FLAG_KEY.to_string(), json!(true));
        task.data.insert(TEST_ID_KEY.to_string(), json!(test_id));

        let targets = match &options.target_handlers {
            Some(explicit) if !explicit.is_empty() => explicit.clone(),
            _ => select_targets(&task),
        };
        task.target_handler_types = Some(targets);

        (task, test_id)
    }

    /// Run one test task and wait for it to settle
    pub async fn run_test(&self, options: TestOptions) -> TestOutcome {
        let (task, test_id) = Self::build_task(&options);
        let timeout = options.timeout.unwrap_or(self.timeout);
        let span = harness_span!(task_id = %task.id, test_id = %test_id);

        self.execute(task, test_id, timeout).instrument(span).await
    }

    async fn execute(&self, task: Task, test_id: String, timeout: Duration) -> TestOutcome {
        let started = Instant::now();
        let task_id = task.id.clone();
        let targets: BTreeSet<HandlerType> = task
            .target_handler_types
            .iter()
            .flatten()
            .copied()
            .collect();

        info!(targets = ?targets, "Starting distribution test");
        self.monitor.record_start(&task);

        let outcome = |status: TestStatus,
                       results: BTreeMap<HandlerType, AgentRunResult>,
                       error: Option<String>| TestOutcome {
            task_id: task_id.clone(),
            test_id: test_id.clone(),
            status,
            success: status == TestStatus::Completed,
            processing_time_ms: started.elapsed().as_millis() as u64,
            per_agent_results: results,
            error,
        };

        self.progress.track(&task_id);
        if let Err(e) = self.orchestrator.submit(task) {
            self.progress.forget(&task_id);
            let reason = e.failure_reason();
            warn!(reason = %reason, "Test task submission failed");
            self.monitor.record_completion(
                &task_id,
                TaskStatus::Failed,
                Some(json!({ "error": reason })),
            );
            return outcome(TestStatus::SubmissionFailed, BTreeMap::new(), Some(reason));
        }

        if targets.is_empty() {
            self.progress.forget(&task_id);
            warn!("No handlers resolved for test task");
            return outcome(
                TestStatus::Failed,
                BTreeMap::new(),
                Some(NO_HANDLER_REASON.to_string()),
            );
        }

        let deadline = started + timeout;
        loop {
            let results = self.progress.results(&task_id);
            if let Some(status) = settle(&targets, &results) {
                self.progress.forget(&task_id);
                info!(?status, "Distribution test settled");
                let error = (status == TestStatus::Failed)
                    .then(|| "One or more handlers reported failure".to_string());
                return outcome(status, results, error);
            }

            if Instant::now() >= deadline {
                let reason = McpError::HarnessTimeout {
                    task_id: task_id.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .failure_reason();
                warn!(reason = %reason, reported = results.len(), "Distribution test timed out");

                // A terminal status written by the orchestrator stays authoritative
                let closed = self
                    .monitor
                    .get_record(&task_id)
                    .is_some_and(|record| record.status.is_terminal());
                if !closed {
                    self.monitor.record_completion(
                        &task_id,
                        TaskStatus::Timeout,
                        Some(json!({ "error": reason })),
                    );
                }
                self.progress.forget(&task_id);
                return outcome(TestStatus::Timeout, results, Some(reason));
            }

            debug!(reported = results.len(), expected = targets.len(), "Waiting for handlers");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Terminal status once every target has reported completion
fn settle(
    targets: &BTreeSet<HandlerType>,
    results: &BTreeMap<HandlerType, AgentRunResult>,
) -> Option<TestStatus> {
    let mut all_succeeded = true;
    for target in targets {
        match results.get(target).and_then(|run| run.success) {
            Some(success) => all_succeeded &= success,
            None => return None,
        }
    }
    Some(if all_succeeded {
        TestStatus::Completed
    } else {
        TestStatus::Failed
    })
}
