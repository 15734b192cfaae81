//! Task monitor
//!
//! Keeps a processing record per task: lifecycle timestamps, the resolved
//! handler set and an ordered event log. Aggregate statistics are derived by
//! scanning retained records. History is bounded only when the owner calls
//! `evict_oldest`; the monitor never schedules eviction itself.

use crate::protocol::{HandlerType, Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub const TASK_STARTED: &str = "TASK_STARTED";
pub const TASK_COMPLETED: &str = "TASK_COMPLETED";

/// One entry in a record's event log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEvent {
    pub time: DateTime<Utc>,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Per-task lifecycle log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskProcessingRecord {
    pub task_id: String,
    pub task_type: String,
    pub owner_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub target_handlers: Vec<HandlerType>,
    pub events: Vec<TaskEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl TaskProcessingRecord {
    /// Elapsed processing time in milliseconds, once ended
    pub fn processing_time_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}

/// Aggregate statistics over retained records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStats {
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub processing: usize,
    /// completed / total, 0 when empty
    pub success_rate: f64,
    /// Mean of end - start over ended records, 0 when none ended
    pub average_processing_time_ms: f64,
}

#[derive(Debug)]
struct MonitorInner {
    enabled: AtomicBool,
    records: Mutex<HashMap<String, TaskProcessingRecord>>,
}

/// Shared handle to the processing-record store
#[derive(Debug, Clone)]
pub struct TaskMonitor {
    inner: Arc<MonitorInner>,
}

impl Default for TaskMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                enabled: AtomicBool::new(true),
                records: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, TaskProcessingRecord>> {
        self.inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Turn recording on or off; reads keep working either way
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Create (or overwrite) the record for a task
    pub fn record_start(&self, task: &Task) {
        if !self.is_enabled() {
            return;
        }

        let now = Utc::now();
        let record = TaskProcessingRecord {
            task_id: task.id.clone(),
            task_type: task.task_type.to_string(),
            owner_id: task.owner_id.clone(),
            start_time: now,
            end_time: None,
            status: task.effective_status(),
            target_handlers: task.target_handler_types.clone().unwrap_or_default(),
            events: vec![TaskEvent {
                time: now,
                event: TASK_STARTED.to_string(),
                details: None,
            }],
            result: None,
        };

        if self.records().insert(task.id.clone(), record).is_some() {
            debug!(task_id = %task.id, "Restarted tracking for task");
        }
    }

    /// Append an event to an existing record
    pub fn record_event(&self, task_id: &str, event: &str, details: Option<Value>) {
        if !self.is_enabled() {
            return;
        }

        match self.records().get_mut(task_id) {
            Some(record) => record.events.push(TaskEvent {
                time: Utc::now(),
                event: event.to_string(),
                details,
            }),
            None => warn!(task_id, event, "Event for untracked task ignored"),
        }
    }

    /// Set the resolved handler set on an existing record
    pub fn record_targets(&self, task_id: &str, targets: &[HandlerType]) {
        if !self.is_enabled() {
            return;
        }

        match self.records().get_mut(task_id) {
            Some(record) => record.target_handlers = targets.to_vec(),
            None => warn!(task_id, "Targets for untracked task ignored"),
        }
    }

    /// Close a record with a terminal status
    pub fn record_completion(&self, task_id: &str, status: TaskStatus, result: Option<Value>) {
        if !self.is_enabled() {
            return;
        }

        match self.records().get_mut(task_id) {
            Some(record) => {
                let now = Utc::now();
                record.end_time = Some(now);
                record.status = status;
                record.result = result;
                record.events.push(TaskEvent {
                    time: now,
                    event: TASK_COMPLETED.to_string(),
                    details: Some(serde_json::json!({ "status": status })),
                });
            }
            None => warn!(task_id, %status, "Completion for untracked task ignored"),
        }
    }

    /// Snapshot of one record
    pub fn get_record(&self, task_id: &str) -> Option<TaskProcessingRecord> {
        self.records().get(task_id).cloned()
    }

    /// Snapshot of all records, newest start first
    pub fn all_records(&self) -> Vec<TaskProcessingRecord> {
        let mut records: Vec<TaskProcessingRecord> = self.records().values().cloned().collect();
        records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        records
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn clear(&self) {
        self.records().clear();
    }

    /// Aggregate statistics over all retained records
    pub fn stats(&self) -> MonitorStats {
        let records = self.records();

        let total_tasks = records.len();
        let mut completed = 0;
        let mut failed = 0;
        let mut pending = 0;
        let mut processing = 0;
        let mut ended = 0usize;
        let mut total_time_ms = 0i64;

        for record in records.values() {
            match record.status {
                TaskStatus::Completed => completed += 1,
                TaskStatus::Failed => failed += 1,
                TaskStatus::Pending => pending += 1,
                TaskStatus::Processing => processing += 1,
                TaskStatus::Timeout => {}
            }
            if let Some(elapsed) = record.processing_time_ms() {
                ended += 1;
                total_time_ms += elapsed;
            }
        }

        let success_rate = if total_tasks == 0 {
            0.0
        } else {
            completed as f64 / total_tasks as f64
        };
        let average_processing_time_ms = if ended == 0 {
            0.0
        } else {
            total_time_ms as f64 / ended as f64
        };

        MonitorStats {
            total_tasks,
            completed,
            failed,
            pending,
            processing,
            success_rate,
            average_processing_time_ms,
        }
    }

    /// Keep the `max_records` most recently started records, drop the rest
    ///
    /// Returns the number of records discarded.
    pub fn evict_oldest(&self, max_records: usize) -> usize {
        let mut records = self.records();
        if records.len() <= max_records {
            return 0;
        }

        let mut by_start: Vec<(String, DateTime<Utc>)> = records
            .values()
            .map(|record| (record.task_id.clone(), record.start_time))
            .collect();
        by_start.sort_by(|a, b| b.1.cmp(&a.1));

        let evicted = by_start.len() - max_records;
        for (task_id, _) in by_start.into_iter().skip(max_records) {
            records.remove(&task_id);
        }

        debug!(evicted, retained = records.len(), "Evicted oldest task records");
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TaskType;
    use serde_json::json;

    fn task(id: &str) -> Task {
        Task::new("owner", TaskType::Profiling, "monitored").with_id(id)
    }

    #[test]
    fn test_record_start_creates_pending_record() {
        let monitor = TaskMonitor::new();
        monitor.record_start(&task("t1"));

        let record = monitor.get_record("t1").unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.owner_id, "owner");
        assert_eq!(record.task_type, "profiling");
        assert!(record.end_time.is_none());
        assert_eq!(record.events.len(), 1);
        assert_eq!(record.events[0].event, TASK_STARTED);
    }

    #[test]
    fn test_record_start_uses_task_status_and_targets() {
        let monitor = TaskMonitor::new();
        let mut started = task("t1").with_targets(vec![HandlerType::Feedback]);
        started.status = Some(TaskStatus::Processing);

        monitor.record_start(&started);

        let record = monitor.get_record("t1").unwrap();
        assert_eq!(record.status, TaskStatus::Processing);
        assert_eq!(record.target_handlers, vec![HandlerType::Feedback]);
    }

    #[test]
    fn test_restart_overwrites_record() {
        let monitor = TaskMonitor::new();
        monitor.record_start(&task("t1"));
        monitor.record_event("t1", "CUSTOM", None);
        monitor.record_start(&task("t1"));

        assert_eq!(monitor.len(), 1);
        assert_eq!(monitor.get_record("t1").unwrap().events.len(), 1);
    }

    #[test]
    fn test_record_event_appends_in_order() {
        let monitor = TaskMonitor::new();
        monitor.record_start(&task("t1"));
        monitor.record_event("t1", "HANDLER_STARTED", Some(json!({"handler": "profiling"})));
        monitor.record_event("t1", "HANDLER_COMPLETED", None);

        let events: Vec<String> = monitor
            .get_record("t1")
            .unwrap()
            .events
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert_eq!(events, vec![TASK_STARTED, "HANDLER_STARTED", "HANDLER_COMPLETED"]);
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let monitor = TaskMonitor::new();
        monitor.record_event("ghost", "ANYTHING", None);
        monitor.record_targets("ghost", &[HandlerType::UiUx]);
        monitor.record_completion("ghost", TaskStatus::Completed, None);

        assert!(monitor.is_empty());
    }

    #[test]
    fn test_completion_updates_stats() {
        let monitor = TaskMonitor::new();
        monitor.record_start(&task("t1"));
        monitor.record_start(&task("t2"));

        let before = monitor.stats();
        assert_eq!(before.completed, 0);
        assert_eq!(before.pending, 2);

        monitor.record_completion("t1", TaskStatus::Completed, Some(json!({"ok": true})));

        let after = monitor.stats();
        assert_eq!(after.completed, before.completed + 1);
        assert_eq!(after.total_tasks, 2);
        assert_eq!(after.pending, 1);
        assert!((after.success_rate - 0.5).abs() < f64::EPSILON);

        let record = monitor.get_record("t1").unwrap();
        assert!(record.end_time.is_some());
        assert_eq!(record.result, Some(json!({"ok": true})));
        assert_eq!(record.events.last().unwrap().event, TASK_COMPLETED);
    }

    #[test]
    fn test_stats_on_empty_monitor() {
        let stats = TaskMonitor::new().stats();
        assert_eq!(stats.total_tasks, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.average_processing_time_ms, 0.0);
    }

    #[test]
    fn test_stats_count_each_status() {
        let monitor = TaskMonitor::new();
        for id in ["a", "b", "c", "d", "e"] {
            monitor.record_start(&task(id));
        }
        monitor.record_completion("a", TaskStatus::Completed, None);
        monitor.record_completion("b", TaskStatus::Failed, None);
        monitor.record_completion("c", TaskStatus::Timeout, None);
        let mut processing = task("d");
        processing.status = Some(TaskStatus::Processing);
        monitor.record_start(&processing);

        let stats = monitor.stats();
        assert_eq!(stats.total_tasks, 5);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.pending, 1);
        assert!((stats.success_rate - 0.2).abs() < f64::EPSILON);
        assert!(stats.average_processing_time_ms >= 0.0);
    }

    #[test]
    fn test_average_processing_time_ignores_open_records() {
        let monitor = TaskMonitor::new();
        monitor.record_start(&task("open"));
        assert_eq!(monitor.stats().average_processing_time_ms, 0.0);
    }

    #[test]
    fn test_disabled_monitor_records_nothing() {
        let monitor = TaskMonitor::new();
        monitor.set_enabled(false);
        assert!(!monitor.is_enabled());

        monitor.record_start(&task("t1"));
        monitor.record_event("t1", "X", None);
        monitor.record_completion("t1", TaskStatus::Completed, None);
        assert!(monitor.is_empty());

        monitor.set_enabled(true);
        monitor.record_start(&task("t1"));
        assert_eq!(monitor.len(), 1);
    }

    #[test]
    fn test_evict_keeps_newest() {
        let monitor = TaskMonitor::new();
        for id in ["t1", "t2", "t3", "t4"] {
            monitor.record_start(&task(id));
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let evicted = monitor.evict_oldest(2);

        assert_eq!(evicted, 2);
        assert_eq!(monitor.len(), 2);
        assert!(monitor.get_record("t4").is_some());
        assert!(monitor.get_record("t3").is_some());
        assert!(monitor.get_record("t1").is_none());
    }

    #[test]
    fn test_evict_under_limit_is_noop() {
        let monitor = TaskMonitor::new();
        monitor.record_start(&task("t1"));
        assert_eq!(monitor.evict_oldest(10), 0);
        assert_eq!(monitor.len(), 1);
    }

    #[test]
    fn test_all_records_newest_first() {
        let monitor = TaskMonitor::new();
        monitor.record_start(&task("old"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        monitor.record_start(&task("new"));

        let ids: Vec<String> = monitor.all_records().into_iter().map(|r| r.task_id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_clones_share_records() {
        let monitor = TaskMonitor::new();
        let view = monitor.clone();
        monitor.record_start(&task("t1"));
        assert!(view.get_record("t1").is_some());
    }
}
