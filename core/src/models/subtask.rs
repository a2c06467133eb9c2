use crate::error::{DomainError, Result};
use crate::events::TaskEvent;
use crate::models::status::{Priority, TaskStatus};
use crate::validation::TaskValidator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Subtask entity. Status and progress percentage are coupled:
///
/// - status `done` forces `progress_percentage` to 100;
/// - status `todo` entered from `done` resets it to 0 (from any other state
///   the percentage is kept);
/// - percentage 0 maps to `todo`, 100 to `done`, anything in between to
///   `in_progress`.
///
/// A subtask created with no assignees inherits the parent task's assignees
/// once, at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    pub id: String,
    pub parent_task_id: String,
    /// 1-200 characters
    pub title: String,
    /// At most 500 characters
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Normalised agent handles
    pub assignees: Vec<String>,
    /// 0-100
    pub progress_percentage: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Transient domain-event buffer. Never stored.
    #[serde(skip)]
    pub events: Vec<TaskEvent>,
}

impl Subtask {
    /// Factory for a new subtask. `parent_assignees` is consulted only when
    /// the subtask has no assignees of its own.
    pub fn create(
        id: String,
        parent_task_id: String,
        title: String,
        description: String,
        priority: Priority,
        assignees: Vec<String>,
        parent_assignees: &[String],
    ) -> Result<Subtask> {
        TaskValidator::validate_title(&title)?;
        TaskValidator::validate_subtask_description(&description)?;
        if parent_task_id.trim().is_empty() {
            return Err(DomainError::empty_field("parent_task_id"));
        }

        let normalized = TaskValidator::normalize_assignees(&assignees);
        let assignees = if normalized.is_empty() {
            parent_assignees.to_vec()
        } else {
            normalized
        };

        let now = Utc::now();
        Ok(Subtask {
            id,
            parent_task_id,
            title,
            description,
            status: TaskStatus::Todo,
            priority,
            assignees,
            progress_percentage: 0,
            created_at: now,
            updated_at: now,
            events: Vec::new(),
        })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn emit(&mut self, field: &str, old: serde_json::Value, new: serde_json::Value) {
        self.events.push(TaskEvent::TaskUpdated {
            task_id: self.parent_task_id.clone(),
            field_name: field.to_string(),
            old_value: old,
            new_value: new,
            updated_at: self.updated_at,
            metadata: None,
        });
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_done()
    }

    /// Update status. `done -> todo` is the dedicated reopen path and is
    /// allowed here even though the shared machine treats done as terminal;
    /// everything else goes through transition validation.
    pub fn update_status(&mut self, new_status: TaskStatus) -> Result<()> {
        let reopen = self.status == TaskStatus::Done && new_status == TaskStatus::Todo;
        if !reopen && !self.status.can_transition_to(new_status) {
            return Err(DomainError::invalid_transition(self.status, new_status));
        }

        let old_status = self.status;
        self.status = new_status;
        self.touch();

        // Couple the percentage to the new status
        if new_status == TaskStatus::Done {
            self.progress_percentage = 100;
        } else if new_status == TaskStatus::Todo && old_status == TaskStatus::Done {
            self.progress_percentage = 0;
        }

        let (id, old, new) = (self.id.clone(), old_status, new_status);
        self.emit(
            "subtask_status",
            json!(format!("{id}:{old}")),
            json!(format!("{id}:{new}")),
        );
        Ok(())
    }

    /// Update progress percentage; status follows: 0 -> todo, 100 -> done,
    /// 1..=99 -> in_progress.
    pub fn update_progress_percentage(&mut self, percentage: i64) -> Result<()> {
        let percentage = TaskValidator::validate_percentage(percentage)?;

        let old = self.progress_percentage;
        self.progress_percentage = percentage;
        self.status = match percentage {
            0 => TaskStatus::Todo,
            100 => TaskStatus::Done,
            _ => TaskStatus::InProgress,
        };
        self.touch();

        let id = self.id.clone();
        self.emit(
            "subtask_progress",
            json!(format!("{id}:{old}")),
            json!(format!("{id}:{percentage}")),
        );
        Ok(())
    }

    pub fn update_title(&mut self, title: String) -> Result<()> {
        TaskValidator::validate_title(&title)?;
        let old = std::mem::replace(&mut self.title, title.clone());
        self.touch();
        let id = self.id.clone();
        self.emit("subtask_title", json!(format!("{id}:{old}")), json!(format!("{id}:{title}")));
        Ok(())
    }

    pub fn update_description(&mut self, description: String) -> Result<()> {
        TaskValidator::validate_subtask_description(&description)?;
        let old = std::mem::replace(&mut self.description, description.clone());
        self.touch();
        let id = self.id.clone();
        self.emit(
            "subtask_description",
            json!(format!("{id}:{old}")),
            json!(format!("{id}:{description}")),
        );
        Ok(())
    }

    pub fn update_priority(&mut self, priority: Priority) {
        let old = self.priority;
        self.priority = priority;
        self.touch();
        let id = self.id.clone();
        self.emit(
            "subtask_priority",
            json!(format!("{id}:{old}")),
            json!(format!("{id}:{priority}")),
        );
    }

    /// Once a subtask has its own non-empty assignee list it never
    /// auto-inherits again; an explicit empty update keeps it empty.
    pub fn update_assignees(&mut self, assignees: Vec<String>) {
        let normalized = TaskValidator::normalize_assignees(&assignees);
        let old = std::mem::replace(&mut self.assignees, normalized.clone());
        self.touch();
        let id = self.id.clone();
        self.emit(
            "subtask_assignees",
            json!(format!("{id}:{old:?}")),
            json!(format!("{id}:{normalized:?}")),
        );
    }

    /// Mark the subtask complete (status done, percentage 100).
    pub fn complete(&mut self) -> Result<()> {
        if self.status == TaskStatus::Done {
            return Ok(());
        }
        if self.status == TaskStatus::Todo {
            // Move through the machine rather than skipping it
            self.update_status(TaskStatus::InProgress)?;
        }
        self.update_status(TaskStatus::Done)
    }

    pub fn take_events(&mut self) -> Vec<TaskEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Rollup of subtask completion used by the parent task's progress
/// aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SubtaskRollup {
    pub total: u32,
    pub completed: u32,
    /// Average progress percentage across subtasks
    pub percentage: u8,
}

impl SubtaskRollup {
    pub fn from_subtasks(subtasks: &[Subtask]) -> SubtaskRollup {
        if subtasks.is_empty() {
            return SubtaskRollup::default();
        }
        let total = subtasks.len() as u32;
        let completed = subtasks.iter().filter(|s| s.is_completed()).count() as u32;
        let sum: u32 = subtasks.iter().map(|s| s.progress_percentage as u32).sum();
        SubtaskRollup { total, completed, percentage: (sum / total) as u8 }
    }

    pub fn all_completed(&self) -> bool {
        self.completed == self.total
    }
}
