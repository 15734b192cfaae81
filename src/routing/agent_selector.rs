//! Agent selection
//!
//! Decides which handler types should process a task. Pure and
//! deterministic: no I/O, no shared state, the task is only read.
//!
//! Resolution order:
//! 1. a non-empty explicit target list is returned verbatim
//! 2. multi-handler coordination tasks get a team composed from context tags
//! 3. every other known task type maps to a fixed handler set
//! 4. unrecognized task types resolve to nothing

use crate::protocol::{HandlerType, Task, TaskType};
use serde::Serialize;

/// Team used when coordination context names no known keyword
pub const DEFAULT_TEAM: [HandlerType; 3] = [
    HandlerType::Profiling,
    HandlerType::LearningPath,
    HandlerType::Assessment,
];

/// Context keywords that pull a handler into a coordination team, in team order
const TEAM_KEYWORDS: &[(HandlerType, &[&str])] = &[
    (HandlerType::LearningPath, &["learning_path", "study_plan"]),
    (HandlerType::Assessment, &["assessment", "test", "quiz"]),
    (
        HandlerType::ContentAdaptation,
        &["content", "material", "resources"],
    ),
    (
        HandlerType::Profiling,
        &["user_profile", "cognitive", "learning_style"],
    ),
    (HandlerType::Feedback, &["feedback", "review", "evaluation"]),
    (
        HandlerType::Engagement,
        &["engagement", "motivation", "gamification"],
    ),
    (HandlerType::UiUx, &["ui", "interface", "display"]),
    (
        HandlerType::Scheduling,
        &[
            "schedule",
            "timing",
            "planning",
            "spaced_repetition",
            "flashcard",
        ],
    ),
];

/// How a selection was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    /// Task carried its own target list
    Explicit,
    /// Fixed task-type table
    TaskType,
    /// Team composed from context keywords
    ContextTeam,
    /// Coordination task with no recognized keyword
    DefaultTeam,
    /// No handler applies
    NoRoute,
}

/// Selected handler types and the rule that produced them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSelection {
    pub targets: Vec<HandlerType>,
    pub source: SelectionSource,
}

impl AgentSelection {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Resolve the handler types for a task
pub fn select_targets(task: &Task) -> Vec<HandlerType> {
    select(task).targets
}

/// Resolve the handler types for a task along with the rule that applied
pub fn select(task: &Task) -> AgentSelection {
    if let Some(explicit) = task.explicit_targets() {
        return AgentSelection {
            targets: explicit.to_vec(),
            source: SelectionSource::Explicit,
        };
    }

    match &task.task_type {
        TaskType::MultiHandlerCoordination => {
            let team = compose_team(&task.context);
            if team.is_empty() {
                AgentSelection {
                    targets: DEFAULT_TEAM.to_vec(),
                    source: SelectionSource::DefaultTeam,
                }
            } else {
                AgentSelection {
                    targets: team,
                    source: SelectionSource::ContextTeam,
                }
            }
        }
        TaskType::Unrecognized(_) => AgentSelection {
            targets: Vec::new(),
            source: SelectionSource::NoRoute,
        },
        known => AgentSelection {
            targets: handlers_for_task_type(known).to_vec(),
            source: SelectionSource::TaskType,
        },
    }
}

/// Fixed task-type table; coordination and unrecognized types map to nothing here
pub fn handlers_for_task_type(task_type: &TaskType) -> &'static [HandlerType] {
    match task_type {
        TaskType::Profiling => &[HandlerType::Profiling],
        TaskType::PathGeneration => &[HandlerType::LearningPath],
        TaskType::AssessmentGeneration => &[HandlerType::Assessment],
        TaskType::ContentAdaptation => &[HandlerType::ContentAdaptation],
        TaskType::Engagement => &[HandlerType::Engagement],
        TaskType::Feedback => &[HandlerType::Feedback],
        TaskType::UiOptimization => &[HandlerType::UiUx],
        TaskType::ScheduleOptimization => &[HandlerType::Scheduling],
        TaskType::FlashcardOptimization => &[HandlerType::Profiling, HandlerType::Scheduling],
        TaskType::MultiHandlerCoordination | TaskType::Unrecognized(_) => &[],
    }
}

/// Build a coordination team from context tags
///
/// Tags match keywords case-insensitively after trimming. The team is ordered
/// by the keyword table, never by tag order, and holds each handler once.
pub fn compose_team(context: &[String]) -> Vec<HandlerType> {
    let tags: Vec<String> = context
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .collect();

    TEAM_KEYWORDS
        .iter()
        .filter(|(_, keywords)| {
            tags.iter()
                .any(|tag| keywords.iter().any(|keyword| tag == keyword))
        })
        .map(|(handler, _)| *handler)
        .collect()
}
