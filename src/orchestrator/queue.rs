//! Priority task queue
//!
//! A single ordered list with stable insertion: a new task lands after every
//! queued task of equal or higher priority and before every task of strictly
//! lower priority, so equal priorities stay FIFO.

use crate::protocol::{Priority, Task};
use std::collections::VecDeque;
use tracing::debug;

/// Ordered container of pending tasks
#[derive(Debug, Default)]
pub struct PriorityTaskQueue {
    tasks: VecDeque<Task>,
}

impl PriorityTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task, defaulting an absent priority to MEDIUM
    pub fn add(&mut self, mut task: Task) {
        let priority = *task.priority.get_or_insert(Priority::Medium);
        let rank = priority.rank();

        let position = self
            .tasks
            .iter()
            .position(|queued| queued.effective_priority().rank() > rank)
            .unwrap_or(self.tasks.len());

        debug!(
            task_id = %task.id,
            priority = %priority,
            position,
            queue_len = self.tasks.len(),
            "Queued task"
        );
        self.tasks.insert(position, task);
    }

    /// Remove and return the front task
    pub fn next(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Front task without removing it
    pub fn peek(&self) -> Option<&Task> {
        self.tasks.front()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn size(&self) -> usize {
        self.tasks.len()
    }

    /// Queued tasks in dequeue order
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }
}
