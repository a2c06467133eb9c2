use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Task lifecycle states shared by tasks and subtasks.
///
/// The typical flow is: Todo → InProgress → Review → Testing → Done, with
/// Blocked as a temporary state entered from any active state while a blocker
/// is recorded, and Cancelled as the abandonment terminal.
///
/// # State transitions
///
/// - `Todo` → `InProgress`, `Cancelled`
/// - `InProgress` → `Blocked`, `Review`, `Testing`, `Done`, `Cancelled`
/// - `Blocked` → `InProgress`, `Review`, `Testing`, `Cancelled` (back to the
///   state held before blocking)
/// - `Review` → `InProgress`, `Testing`, `Blocked`, `Done`, `Cancelled`
/// - `Testing` → `InProgress`, `Review`, `Blocked`, `Done`, `Cancelled`
/// - `Done`, `Cancelled` → (no transitions; a subtask reopen is a dedicated
///   path on the subtask, not a machine transition)
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be picked up
    Todo,
    /// Actively being worked on
    InProgress,
    /// A blocker is recorded; work is suspended
    Blocked,
    /// Ready for review
    Review,
    /// Under test
    Testing,
    /// Completed
    Done,
    /// Abandoned
    Cancelled,
}

impl TaskStatus {
    /// Check if this status can transition to the given status
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        use TaskStatus::*;

        match (*self, new_status) {
            // Can't transition to the same status
            (current, new) if current == new => false,

            (Todo, InProgress | Cancelled) => true,

            (InProgress, Blocked | Review | Testing | Done | Cancelled) => true,

            // Blocked exits back to an active state once blockers clear
            (Blocked, InProgress | Review | Testing | Cancelled) => true,

            (Review, InProgress | Testing | Blocked | Done | Cancelled) => true,

            (Testing, InProgress | Review | Blocked | Done | Cancelled) => true,

            // Done and Cancelled are terminal for the machine
            (Done, _) => false,
            (Cancelled, _) => false,

            _ => false,
        }
    }

    /// States in which work is actively happening (the states Blocked can
    /// be entered from and returned to)
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::InProgress | TaskStatus::Review | TaskStatus::Testing)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }

    /// Terminal from the progress point of view
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Review => "review",
            TaskStatus::Testing => "testing",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a status string; accepts legacy spellings seen in stored data
    pub fn parse(value: &str) -> Result<TaskStatus> {
        match value.trim().to_lowercase().as_str() {
            "todo" | "pending" => Ok(TaskStatus::Todo),
            "in_progress" | "in-progress" | "active" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "review" => Ok(TaskStatus::Review),
            "testing" => Ok(TaskStatus::Testing),
            "done" => Ok(TaskStatus::Done),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            other => Err(DomainError::invalid_field("status", &format!("unknown status '{other}'"))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority levels, highest first.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Base priority score used by next-task ordering
    pub fn base_score(&self) -> f64 {
        match self {
            Priority::Critical => 100.0,
            Priority::Urgent => 90.0,
            Priority::High => 75.0,
            Priority::Medium => 50.0,
            Priority::Low => 25.0,
        }
    }

    pub fn parse(value: &str) -> Result<Priority> {
        match value.trim().to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(DomainError::invalid_field(
                "priority",
                &format!("unknown priority '{other}'"),
            )),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived progress state of a task. Never set independently: always a
/// function of (status, overall_progress).
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Initial,
    InProgress,
    Complete,
}

impl ProgressState {
    /// Threshold fallback used when neither status nor progress decides
    pub fn from_percentage(percentage: u8) -> ProgressState {
        match percentage {
            0 => ProgressState::Initial,
            100 => ProgressState::Complete,
            _ => ProgressState::InProgress,
        }
    }

    /// Derive the progress state from status and overall progress
    pub fn derive(status: TaskStatus, overall_progress: u8) -> ProgressState {
        if status.is_terminal() && status.is_done() {
            return ProgressState::Complete;
        }
        if overall_progress == 0 && status == TaskStatus::Todo {
            return ProgressState::Initial;
        }
        if overall_progress > 0 || status == TaskStatus::InProgress {
            return ProgressState::InProgress;
        }
        ProgressState::from_percentage(overall_progress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressState::Initial => "initial",
            ProgressState::InProgress => "in_progress",
            ProgressState::Complete => "complete",
        }
    }
}

impl std::fmt::Display for ProgressState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
