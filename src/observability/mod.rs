//! Observability
//!
//! Structured logging setup and the task monitor that records per-task
//! processing lifecycles and derives aggregate statistics.

pub mod logging;
pub mod monitor;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use monitor::{MonitorStats, TaskEvent, TaskMonitor, TaskProcessingRecord};

// Span macros for structured logging
pub use logging::{dispatch_span, harness_span, task_span};
