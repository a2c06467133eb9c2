use crate::error::{DomainError, Result};
use crate::events::TaskEvent;
use crate::id::normalize_id;
use crate::models::progress::{
    ProgressMetadata, ProgressSnapshot, ProgressStatus, ProgressTimeline, ProgressType,
};
use crate::models::status::{Priority, ProgressState, TaskStatus};
use crate::validation::TaskValidator;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A numbered entry in the task's free-form progress history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEntry {
    pub number: u32,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Task aggregate of the task engine.
///
/// Holds the lifecycle status, progress aggregation state, assignees,
/// dependency list and subtask ids, plus a transient buffer of domain events
/// drained by the use case after persistence.
///
/// Every content-bearing mutation clears `context_id` (the pointer to the
/// last known good inherited context); status-only and priority-only updates
/// preserve it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub branch_id: String,
    /// 1-200 characters
    pub title: String,
    /// Non-empty, at most 2000 characters
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub details: String,
    pub estimated_effort: String,
    /// ISO-8601 date or none
    pub due_date: Option<NaiveDate>,
    /// Pointer to the last known good context; cleared by mutations
    pub context_id: Option<String>,
    /// 0-100, aggregated from the timeline and the subtask rollup
    pub overall_progress: u8,
    /// Derived from (status, overall_progress); never set independently
    pub progress_state: ProgressState,
    pub progress_timeline: Option<ProgressTimeline>,
    /// Numbered free-form progress log
    pub progress_history: Vec<ProgressEntry>,
    /// Normalised agent handles (`@slug`)
    pub assignees: Vec<String>,
    pub labels: Vec<String>,
    /// Same-tree prerequisite task ids; never contains `id` itself
    pub dependencies: Vec<String>,
    pub subtask_ids: Vec<String>,
    /// Active state held before entering Blocked, for the unblock return path
    pub status_before_block: Option<TaskStatus>,
    pub completion_summary: Option<String>,
    pub testing_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Transient domain-event buffer, drained by the caller after
    /// persistence. Never stored.
    #[serde(skip)]
    pub events: Vec<TaskEvent>,
}

impl Task {
    /// Factory for a new task. Assignees are normalised leniently; creation
    /// flows that must reject unknown roles validate the list beforehand
    /// with [`TaskValidator::validate_assignee_list`].
    pub fn create(
        id: String,
        branch_id: String,
        title: String,
        description: String,
        priority: Priority,
        assignees: Vec<String>,
    ) -> Result<Task> {
        TaskValidator::validate_title(&title)?;
        TaskValidator::validate_description(&description)?;

        let now = Utc::now();
        let mut task = Task {
            id,
            branch_id,
            title,
            description,
            status: TaskStatus::Todo,
            priority,
            details: String::new(),
            estimated_effort: String::new(),
            due_date: None,
            context_id: None,
            overall_progress: 0,
            progress_state: ProgressState::Initial,
            progress_timeline: None,
            progress_history: Vec::new(),
            assignees: TaskValidator::normalize_assignees(&assignees),
            labels: Vec::new(),
            dependencies: Vec::new(),
            subtask_ids: Vec::new(),
            status_before_block: None,
            completion_summary: None,
            testing_notes: None,
            created_at: now,
            updated_at: now,
            events: Vec::new(),
        };

        task.events.push(TaskEvent::TaskCreated {
            task_id: task.id.clone(),
            title: task.title.clone(),
            created_at: now,
        });
        Ok(task)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn emit_updated(&mut self, field: &str, old: serde_json::Value, new: serde_json::Value) {
        self.events.push(TaskEvent::TaskUpdated {
            task_id: self.id.clone(),
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

    pub fn is_blocked(&self) -> bool {
        self.status == TaskStatus::Blocked
    }

    /// Check if task is overdue (due date passed and not completed)
    pub fn is_overdue(&self) -> bool {
        match self.due_date {
            Some(due) => Utc::now().date_naive() > due && !self.status.is_terminal(),
            None => false,
        }
    }

    /// Update status with transition validation. Status-only updates
    /// preserve `context_id`.
    pub fn update_status(&mut self, new_status: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::invalid_transition(self.status, new_status));
        }

        if new_status == TaskStatus::Blocked {
            self.status_before_block = Some(self.status);
        } else if self.status == TaskStatus::Blocked {
            self.status_before_block = None;
        }

        let old_status = self.status;
        self.status = new_status;
        self.refresh_progress_state();
        self.touch();

        self.emit_updated("status", json!(old_status.as_str()), json!(new_status.as_str()));
        Ok(())
    }

    /// Record a blocker: moves the task to Blocked from any active state,
    /// remembering where to return to.
    pub fn record_blocker(&mut self) -> Result<()> {
        self.update_status(TaskStatus::Blocked)
    }

    /// Clear blockers: returns to the state held before blocking.
    pub fn clear_blockers(&mut self) -> Result<()> {
        if self.status != TaskStatus::Blocked {
            return Err(DomainError::Validation("Task is not blocked".to_string()));
        }
        let target = self.status_before_block.unwrap_or(TaskStatus::InProgress);
        self.update_status(target)
    }

    /// Priority-only updates preserve `context_id`.
    pub fn update_priority(&mut self, new_priority: Priority) {
        let old = self.priority;
        self.priority = new_priority;
        self.touch();
        self.emit_updated("priority", json!(old.as_str()), json!(new_priority.as_str()));
    }

    pub fn update_title(&mut self, title: String) -> Result<()> {
        TaskValidator::validate_title(&title)?;
        let old = std::mem::replace(&mut self.title, title.clone());
        self.context_id = None;
        self.touch();
        self.emit_updated("title", json!(old), json!(title));
        Ok(())
    }

    pub fn update_description(&mut self, description: String) -> Result<()> {
        TaskValidator::validate_description(&description)?;
        let old = std::mem::replace(&mut self.description, description.clone());
        self.context_id = None;
        self.touch();
        self.emit_updated("description", json!(old), json!(description));
        Ok(())
    }

    pub fn update_details(&mut self, details: String) {
        let old = std::mem::replace(&mut self.details, details.clone());
        self.context_id = None;
        self.touch();
        self.emit_updated("details", json!(old), json!(details));
    }

    pub fn update_estimated_effort(&mut self, estimated_effort: String) {
        let old = std::mem::replace(&mut self.estimated_effort, estimated_effort.clone());
        self.context_id = None;
        self.touch();
        self.emit_updated("estimated_effort", json!(old), json!(estimated_effort));
    }

    pub fn update_due_date(&mut self, due_date: Option<String>) -> Result<()> {
        let parsed = match due_date {
            Some(raw) => Some(TaskValidator::validate_due_date(&raw)?),
            None => None,
        };
        let old = self.due_date;
        self.due_date = parsed;
        self.context_id = None;
        self.touch();
        self.emit_updated("due_date", json!(old), json!(self.due_date));
        Ok(())
    }

    /// Lenient assignee update: legacy aliases resolve, unknown values are
    /// preserved so existing data is not dropped.
    pub fn update_assignees(&mut self, assignees: Vec<String>) {
        let normalized = TaskValidator::normalize_assignees(&assignees);
        let old = std::mem::replace(&mut self.assignees, normalized.clone());
        self.context_id = None;
        self.touch();
        self.emit_updated("assignees", json!(old), json!(normalized));
    }

    pub fn update_labels(&mut self, labels: Vec<String>) {
        let normalized = TaskValidator::normalize_labels(&labels);
        let old = std::mem::replace(&mut self.labels, normalized.clone());
        self.context_id = None;
        self.touch();
        self.emit_updated("labels", json!(old), json!(normalized));
    }

    /// Assignees subtasks inherit when created without their own.
    pub fn inherited_assignees_for_subtasks(&self) -> Vec<String> {
        self.assignees.clone()
    }

    /// Append a numbered entry to the free-form progress history.
    pub fn append_progress(&mut self, content: &str) {
        let number = self.progress_history.len() as u32 + 1;
        self.touch();
        self.progress_history.push(ProgressEntry {
            number,
            content: format!("=== Progress {number} ===\n{content}"),
            timestamp: self.updated_at,
        });
        self.context_id = None;
        self.emit_updated(
            "progress_history",
            json!(format!("progress_added_{}", number - 1)),
            json!(format!("progress_added_{number}")),
        );
    }

    /// Full progress history as formatted text.
    pub fn progress_history_text(&self) -> String {
        self.progress_history
            .iter()
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Add a same-tree dependency. Self-references and immediate cycles are
    /// rejected; the caller is responsible for cross-task graph checks.
    pub fn add_dependency(&mut self, dependency_id: &str) -> Result<()> {
        let normalized = normalize_id(dependency_id)?;
        if normalized == self.id {
            return Err(DomainError::DependencyCycle(format!(
                "task {} cannot depend on itself",
                self.id
            )));
        }
        if !self.dependencies.contains(&normalized) {
            self.dependencies.push(normalized);
            self.context_id = None;
            self.touch();
        }
        Ok(())
    }

    pub fn remove_dependency(&mut self, dependency_id: &str) {
        let before = self.dependencies.len();
        self.dependencies.retain(|d| d != dependency_id);
        if self.dependencies.len() != before {
            self.context_id = None;
            self.touch();
        }
    }

    pub fn has_dependency(&self, dependency_id: &str) -> bool {
        self.dependencies.iter().any(|d| d == dependency_id)
    }

    pub fn add_subtask_id(&mut self, subtask_id: &str) {
        if !self.subtask_ids.iter().any(|s| s == subtask_id) {
            self.subtask_ids.push(subtask_id.to_string());
            self.touch();
            self.emit_updated("subtasks", json!("subtask_added"), json!(subtask_id));
        }
    }

    pub fn remove_subtask_id(&mut self, subtask_id: &str) -> bool {
        let before = self.subtask_ids.len();
        self.subtask_ids.retain(|s| s != subtask_id);
        if self.subtask_ids.len() != before {
            self.touch();
            self.emit_updated("subtasks", json!("subtask_removed"), json!(subtask_id));
            true
        } else {
            false
        }
    }

    /// The entity only stores subtask ids: with subtasks present their
    /// status cannot be verified here, so this is conservative. The
    /// completion service loads subtasks and passes the real answer to
    /// [`Task::complete`].
    pub fn all_subtasks_completed(&self) -> bool {
        self.subtask_ids.is_empty()
    }

    pub fn set_context_id(&mut self, context_id: String) {
        self.context_id = Some(context_id);
        self.touch();
    }

    pub fn clear_context_id(&mut self) {
        self.context_id = None;
        self.touch();
    }

    /// Record typed progress on the timeline.
    ///
    /// Emits `ProgressUpdated`, fires milestone events exactly once per
    /// milestone (checked against the pending event buffer), and emits
    /// `ProgressTypeCompleted` when a type crosses into 100.
    pub fn record_progress(
        &mut self,
        progress_type: ProgressType,
        percentage: u8,
        description: Option<String>,
        metadata: ProgressMetadata,
        agent_id: Option<String>,
        subtask_rollup: Option<u8>,
    ) -> Result<()> {
        if percentage > 100 {
            return Err(DomainError::invalid_field(
                "percentage",
                &format!("must be between 0 and 100, got {percentage}"),
            ));
        }

        if self.progress_timeline.is_none() {
            self.progress_timeline = Some(ProgressTimeline::new(&self.id));
        }

        let old_percentage = self
            .progress_timeline
            .as_ref()
            .map(|t| t.progress_by_type(progress_type))
            .unwrap_or(0);

        let status = ProgressStatus::from_percentages(percentage, old_percentage);
        let snapshot = ProgressSnapshot::new(
            &self.id,
            progress_type,
            percentage,
            status,
            description.clone(),
            metadata,
            agent_id.clone(),
        )?;

        if let Some(timeline) = self.progress_timeline.as_mut() {
            timeline.add_snapshot(snapshot)?;
        }

        self.recalculate_overall_progress(subtask_rollup);
        self.context_id = None;
        self.touch();

        self.events.push(TaskEvent::ProgressUpdated {
            task_id: self.id.clone(),
            progress_type,
            old_percentage,
            new_percentage: percentage,
            status,
            description,
            agent_id: agent_id.clone(),
        });

        self.check_progress_milestones();

        if percentage == 100 && old_percentage < 100 {
            self.events.push(TaskEvent::ProgressTypeCompleted {
                task_id: self.id.clone(),
                progress_type,
                agent_id,
            });
        }

        Ok(())
    }

    /// Add a named milestone to the timeline.
    pub fn add_progress_milestone(&mut self, name: &str, threshold: u8) -> Result<()> {
        if self.progress_timeline.is_none() {
            self.progress_timeline = Some(ProgressTimeline::new(&self.id));
        }
        if let Some(timeline) = self.progress_timeline.as_mut() {
            timeline.add_milestone(name, threshold)?;
        }
        self.touch();
        Ok(())
    }

    /// Recompute `overall_progress` from the timeline and the subtask
    /// rollup: the average of both when both exist, otherwise whichever one
    /// does.
    pub fn recalculate_overall_progress(&mut self, subtask_rollup: Option<u8>) {
        let timeline_progress = self.progress_timeline.as_ref().map(|t| t.overall_progress());

        self.overall_progress = match (timeline_progress, subtask_rollup) {
            (Some(t), Some(s)) => ((t as u16 + s as u16) / 2) as u8,
            (Some(t), None) => t,
            (None, Some(s)) => s,
            (None, None) => self.overall_progress,
        };
        self.refresh_progress_state();
    }

    fn refresh_progress_state(&mut self) {
        self.progress_state = ProgressState::derive(self.status, self.overall_progress);
    }

    fn check_progress_milestones(&mut self) {
        let Some(timeline) = self.progress_timeline.as_ref() else {
            return;
        };

        let reached: Vec<(String, u8)> = timeline
            .milestones
            .iter()
            .filter(|(name, threshold)| {
                self.overall_progress >= **threshold && !self.milestone_already_emitted(name)
            })
            .map(|(name, threshold)| (name.clone(), *threshold))
            .collect();

        for (name, threshold) in reached {
            self.events.push(TaskEvent::ProgressMilestoneReached {
                task_id: self.id.clone(),
                milestone_name: name,
                milestone_percentage: threshold,
                current_progress: self.overall_progress,
            });
        }
    }

    fn milestone_already_emitted(&self, milestone_name: &str) -> bool {
        self.events.iter().any(|event| {
            matches!(event, TaskEvent::ProgressMilestoneReached { milestone_name: name, .. }
                if name == milestone_name)
        })
    }

    /// Complete the task.
    ///
    /// Preconditions:
    /// 1. `completion_summary` is non-empty;
    /// 2. all subtasks report completed (`all_subtasks_completed`, verified
    ///    by the completion service against the repository);
    /// 3. when `context_updated_at` is supplied and `context_id` is set, the
    ///    context must be newer than the task's `updated_at`.
    ///
    /// On success the status becomes `done`, `overall_progress` is forced to
    /// 100 and `progress_state` to complete. Completion is a dedicated path:
    /// it does not require a machine transition, but refuses terminal tasks.
    pub fn complete(
        &mut self,
        completion_summary: &str,
        testing_notes: Option<String>,
        context_updated_at: Option<DateTime<Utc>>,
        all_subtasks_completed: bool,
    ) -> Result<()> {
        if completion_summary.trim().is_empty() {
            return Err(DomainError::MissingCompletionSummary(self.id.clone()));
        }

        if self.status.is_terminal() {
            return Err(DomainError::Conflict(format!(
                "task {} is already {}",
                self.id, self.status
            )));
        }

        if !all_subtasks_completed {
            return Err(DomainError::Validation(format!(
                "Task {} cannot be completed: not all subtasks are done",
                self.id
            )));
        }

        if let Some(context_at) = context_updated_at {
            if self.context_id.is_some() && context_at <= self.updated_at {
                let lag_seconds = (self.updated_at - context_at).num_seconds();
                return Err(DomainError::StaleContext { task_id: self.id.clone(), lag_seconds });
            }
        }

        self.completion_summary = Some(completion_summary.to_string());
        if testing_notes.is_some() {
            self.testing_notes = testing_notes;
        }

        let old_status = self.status;
        self.status = TaskStatus::Done;
        self.overall_progress = 100;
        self.progress_state = ProgressState::Complete;
        self.touch();

        self.events.push(TaskEvent::TaskUpdated {
            task_id: self.id.clone(),
            field_name: "status".to_string(),
            old_value: json!(old_status.as_str()),
            new_value: json!(TaskStatus::Done.as_str()),
            updated_at: self.updated_at,
            metadata: Some(json!({ "completion_summary": completion_summary })),
        });

        if !self.subtask_ids.is_empty() {
            self.events.push(TaskEvent::TaskUpdated {
                task_id: self.id.clone(),
                field_name: "subtasks".to_string(),
                old_value: json!("all_subtasks_completed"),
                new_value: json!(self.subtask_ids),
                updated_at: self.updated_at,
                metadata: None,
            });
        }

        Ok(())
    }

    pub fn mark_retrieved(&mut self) {
        self.touch();
        self.events.push(TaskEvent::TaskRetrieved {
            task_id: self.id.clone(),
            retrieved_at: self.updated_at,
        });
    }

    pub fn mark_deleted(&mut self) {
        self.touch();
        self.events.push(TaskEvent::TaskDeleted {
            task_id: self.id.clone(),
            title: self.title.clone(),
            deleted_at: self.updated_at,
        });
    }

    /// Drain the pending domain events.
    pub fn take_events(&mut self) -> Vec<TaskEvent> {
        std::mem::take(&mut self.events)
    }

    /// Peek at pending events without draining (used by tests).
    pub fn pending_events(&self) -> &[TaskEvent] {
        &self.events
    }
}
