//! Broadcast and point-to-point messages delivered to handlers outside the
//! task-completion path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Task,
    System,
    Notification,
    Response,
    Error,
}

/// Message delivered through `receive_message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

impl Message {
    pub fn new(message_type: MessageType, content: impl Into<String>, data: Value) -> Self {
        Self {
            message_type,
            content: content.into(),
            data,
            timestamp: Utc::now(),
            sender_id: None,
            target_id: None,
        }
    }

    /// System-level message, e.g. owner initialization
    pub fn system(content: impl Into<String>, data: Value) -> Self {
        Self::new(MessageType::System, content, data)
    }

    pub fn notification(content: impl Into<String>, data: Value) -> Self {
        Self::new(MessageType::Notification, content, data)
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }
}
