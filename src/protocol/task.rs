//! Task and handler type definitions
//!
//! Tasks are the unit of work accepted by the orchestrator. Handler types,
//! task types and priorities are closed enums so routing tables are matched
//! exhaustively instead of by string lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Payload key marking a synthetic distribution-test task
pub const TEST_FLAG_KEY: &str = "is_test";
/// Payload key carrying the distribution-test identifier
pub const TEST_ID_KEY: &str = "test_id";

/// Normalize a tag for parsing: lowercase, snake_case accepted as kebab-case
fn normalize_tag(s: &str) -> String {
    s.trim().to_lowercase().replace('_', "-")
}

/// Processing handler (agent) kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerType {
    Profiling,
    LearningPath,
    ContentAdaptation,
    Assessment,
    Engagement,
    Feedback,
    UiUx,
    Scheduling,
}

impl HandlerType {
    pub const ALL: [HandlerType; 8] = [
        HandlerType::Profiling,
        HandlerType::LearningPath,
        HandlerType::ContentAdaptation,
        HandlerType::Assessment,
        HandlerType::Engagement,
        HandlerType::Feedback,
        HandlerType::UiUx,
        HandlerType::Scheduling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerType::Profiling => "profiling",
            HandlerType::LearningPath => "learning-path",
            HandlerType::ContentAdaptation => "content-adaptation",
            HandlerType::Assessment => "assessment",
            HandlerType::Engagement => "engagement",
            HandlerType::Feedback => "feedback",
            HandlerType::UiUx => "ui-ux",
            HandlerType::Scheduling => "scheduling",
        }
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = normalize_tag(s);
        HandlerType::ALL
            .iter()
            .copied()
            .find(|handler| handler.as_str() == tag)
            .ok_or_else(|| format!("unknown handler type '{s}'"))
    }
}

/// Kinds of work a task can request
///
/// `Unrecognized` keeps any other tag verbatim; the selector routes it nowhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    Profiling,
    PathGeneration,
    AssessmentGeneration,
    ContentAdaptation,
    Engagement,
    Feedback,
    UiOptimization,
    ScheduleOptimization,
    FlashcardOptimization,
    MultiHandlerCoordination,
    Unrecognized(String),
}

impl TaskType {
    pub const KNOWN: [TaskType; 10] = [
        TaskType::Profiling,
        TaskType::PathGeneration,
        TaskType::AssessmentGeneration,
        TaskType::ContentAdaptation,
        TaskType::Engagement,
        TaskType::Feedback,
        TaskType::UiOptimization,
        TaskType::ScheduleOptimization,
        TaskType::FlashcardOptimization,
        TaskType::MultiHandlerCoordination,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            TaskType::Profiling => "profiling",
            TaskType::PathGeneration => "path-generation",
            TaskType::AssessmentGeneration => "assessment-generation",
            TaskType::ContentAdaptation => "content-adaptation",
            TaskType::Engagement => "engagement",
            TaskType::Feedback => "feedback",
            TaskType::UiOptimization => "ui-optimization",
            TaskType::ScheduleOptimization => "schedule-optimization",
            TaskType::FlashcardOptimization => "flashcard-optimization",
            TaskType::MultiHandlerCoordination => "multi-handler-coordination",
            TaskType::Unrecognized(tag) => tag,
        }
    }

    /// Parse a tag; never fails, unknown tags become `Unrecognized`
    pub fn parse(s: &str) -> Self {
        let tag = normalize_tag(s);
        TaskType::KNOWN
            .iter()
            .find(|known| known.as_str() == tag)
            .cloned()
            .unwrap_or_else(|| TaskType::Unrecognized(s.to_string()))
    }
}

impl From<String> for TaskType {
    fn from(s: String) -> Self {
        TaskType::parse(&s)
    }
}

impl From<TaskType> for String {
    fn from(task_type: TaskType) -> Self {
        task_type.as_str().to_string()
    }
}

impl FromStr for TaskType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TaskType::parse(s))
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority; lower rank is served first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        };
        f.write_str(label)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CRITICAL" => Ok(Priority::Critical),
            "HIGH" => Ok(Priority::High),
            "MEDIUM" => Ok(Priority::Medium),
            "LOW" => Ok(Priority::Low),
            _ => Err(format!("unknown priority '{s}'")),
        }
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Written only by the distribution test harness
    Timeout,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// A unit of work submitted to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, never reused within one orchestrator
    pub id: String,
    /// Requesting user or session
    pub owner_id: String,
    pub task_type: TaskType,
    /// Informational only
    pub description: String,
    /// Resolved to MEDIUM by the queue when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Explicit routing; overrides automatic selection when non-empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handler_types: Option<Vec<HandlerType>>,
    /// Free-text tags used for team composition
    #[serde(default)]
    pub context: Vec<String>,
    /// Opaque payload passed through to handlers
    #[serde(default)]
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Task {
    /// Create a pending task with a generated id
    pub fn new(
        owner_id: impl Into<String>,
        task_type: TaskType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            task_type,
            description: description.into(),
            priority: None,
            target_handler_types: None,
            context: Vec::new(),
            data: Map::new(),
            created_at: Utc::now(),
            status: None,
            completed_at: None,
            result: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_targets(mut self, targets: Vec<HandlerType>) -> Self {
        self.target_handler_types = Some(targets);
        self
    }

    pub fn with_context<I, S>(mut self, context: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context = context.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Priority with the queue default applied
    pub fn effective_priority(&self) -> Priority {
        self.priority.unwrap_or_default()
    }

    /// Status with absent treated as pending
    pub fn effective_status(&self) -> TaskStatus {
        self.status.unwrap_or(TaskStatus::Pending)
    }

    /// Explicit targets, if any were given and non-empty
    pub fn explicit_targets(&self) -> Option<&[HandlerType]> {
        self.target_handler_types
            .as_deref()
            .filter(|targets| !targets.is_empty())
    }

    /// Whether the payload marks this as a distribution-test task
    pub fn is_test_task(&self) -> bool {
        self.data
            .get(TEST_FLAG_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Distribution-test identifier embedded in the payload
    pub fn test_id(&self) -> Option<&str> {
        self.data.get(TEST_ID_KEY).and_then(Value::as_str)
    }
}
