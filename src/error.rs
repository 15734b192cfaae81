//! Error types for the task orchestration core
//!
//! Covers the failure taxonomy surfaced through the monitor and metrics
//! (routing failures, handler failures, unregistered handlers, harness
//! timeouts) plus the synchronous submission and configuration errors.

use crate::protocol::HandlerType;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Main error type for orchestration operations
#[derive(Debug, Error)]
pub enum McpError {
    #[error("No suitable handler found for task {task_id}")]
    RoutingFailure { task_id: String },

    #[error("Handler '{handler}' failed: {message}")]
    HandlerFailure {
        handler: HandlerType,
        message: String,
    },

    #[error("Handler '{handler}' timed out after {timeout_ms}ms")]
    HandlerTimeout { handler: HandlerType, timeout_ms: u64 },

    #[error("Handler '{handler}' is not registered")]
    UnregisteredHandler { handler: HandlerType },

    #[error("Test task {task_id} did not finish within {timeout_ms}ms")]
    HarnessTimeout { task_id: String, timeout_ms: u64 },

    #[error("Task id '{task_id}' was already submitted")]
    DuplicateTaskId { task_id: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Profile lookup failed: {message}")]
    ProfileLookup { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl McpError {
    /// Stable code recorded in monitor event details
    pub fn code(&self) -> &'static str {
        match self {
            McpError::RoutingFailure { .. } => "ROUTING_FAILURE",
            McpError::HandlerFailure { .. } => "HANDLER_FAILURE",
            McpError::HandlerTimeout { .. } => "HANDLER_TIMEOUT",
            McpError::UnregisteredHandler { .. } => "UNREGISTERED_HANDLER",
            McpError::HarnessTimeout { .. } => "HARNESS_TIMEOUT",
            McpError::DuplicateTaskId { .. } => "DUPLICATE_TASK_ID",
            McpError::InvalidInput { .. } => "INVALID_INPUT",
            McpError::ProfileLookup { .. } => "PROFILE_LOOKUP",
            McpError::Internal { .. } => "INTERNAL_ERROR",
            McpError::Config(_) => "CONFIG_ERROR",
            McpError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether this error counts against a task's success
    pub fn is_task_failure(&self) -> bool {
        matches!(
            self,
            McpError::RoutingFailure { .. }
                | McpError::HandlerFailure { .. }
                | McpError::HandlerTimeout { .. }
        )
    }

    /// Failure reason safe to store in monitor records and task results
    pub fn failure_reason(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Create routing failure error
    pub fn routing_failure<S: Into<String>>(task_id: S) -> Self {
        Self::RoutingFailure {
            task_id: task_id.into(),
        }
    }

    /// Create handler failure error
    pub fn handler_failure<S: Into<String>>(handler: HandlerType, message: S) -> Self {
        Self::HandlerFailure {
            handler,
            message: message.into(),
        }
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create profile lookup error
    pub fn profile_lookup<S: Into<String>>(message: S) -> Self {
        Self::ProfileLookup {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

fn secret_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("valid secret pattern")
    })
}

fn credential_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
            .expect("valid credential path pattern")
    })
}

/// Sanitize failure messages before they are retained in records
///
/// Handler errors are free text from business-logic code and may carry
/// credentials; records outlive the request that produced them.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = secret_pattern()
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = credential_path_pattern()
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    // Total length stays <= 500 bytes, cut on a char boundary
    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for orchestration operations
pub type McpResult<T> = Result<T, McpError>;
