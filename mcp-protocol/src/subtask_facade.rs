use async_trait::async_trait;
use hive_core::error::{DomainError, Result};
use hive_core::events::TaskEvent;
use hive_core::models::{Subtask, SubtaskRollup, Task};
use hive_core::protocol::{
    CreateSubtaskParams, ListSubtasksParams, SubtaskProtocol, SubtaskRefParams,
    UpdateSubtaskParams,
};
use hive_core::repository::{Scope, SubtaskRepository, TaskRepository};
use std::sync::Arc;
use tracing::debug;

/// Facade for the manage_subtask surface, scoped to a parent task.
///
/// Subtask mutations bubble a progress recalculation to the parent task:
/// the parent's overall progress incorporates the subtask rollup, and its
/// derived progress state follows.
pub struct SubtaskFacade<T, S> {
    tasks: Arc<T>,
    subtasks: Arc<S>,
    scope: Scope,
}

impl<T, S> SubtaskFacade<T, S>
where
    T: TaskRepository,
    S: SubtaskRepository,
{
    pub fn new(tasks: Arc<T>, subtasks: Arc<S>, scope: Scope) -> Self {
        Self { tasks, subtasks, scope }
    }

    fn publish(&self, events: Vec<TaskEvent>) {
        for event in events {
            debug!(event_type = event.event_type(), payload = %event.to_json(), "domain event");
        }
    }

    async fn load_parent(&self, task_id: &str) -> Result<Task> {
        self.tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Task", task_id))
    }

    async fn load_subtask(&self, task_id: &str, subtask_id: Option<&str>) -> Result<Subtask> {
        let subtask_id = subtask_id.ok_or_else(|| DomainError::empty_field("subtask_id"))?;
        let subtask = self
            .subtasks
            .find_by_id(subtask_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Subtask", subtask_id))?;
        if subtask.parent_task_id != task_id {
            return Err(DomainError::not_found("Subtask", subtask_id));
        }
        Ok(subtask)
    }

    /// Recompute the parent's aggregated progress from its subtasks.
    async fn bubble_progress(&self, parent_task_id: &str) -> Result<()> {
        let mut parent = self.load_parent(parent_task_id).await?;
        let subtasks = self.subtasks.find_by_parent(parent_task_id).await?;
        let rollup = SubtaskRollup::from_subtasks(&subtasks);
        if rollup.total > 0 {
            parent.recalculate_overall_progress(Some(rollup.percentage));
            self.tasks.save(&parent).await?;
            self.publish(parent.take_events());
        }
        Ok(())
    }
}

#[async_trait]
impl<T, S> SubtaskProtocol for SubtaskFacade<T, S>
where
    T: TaskRepository,
    S: SubtaskRepository,
{
    async fn create_subtask(&self, params: CreateSubtaskParams) -> Result<Subtask> {
        self.scope.require_user()?;
        let mut parent = self.load_parent(&params.task_id).await?;

        let subtask = Subtask::create(
            hive_core::id::new_id(),
            parent.id.clone(),
            params.title,
            params.description.unwrap_or_default(),
            params.priority.unwrap_or_default(),
            params.assignees,
            &parent.inherited_assignees_for_subtasks(),
        )?;

        self.subtasks.save(&subtask).await?;
        parent.add_subtask_id(&subtask.id);
        self.tasks.save(&parent).await?;
        self.publish(parent.take_events());
        self.bubble_progress(&parent.id).await?;
        Ok(subtask)
    }

    async fn update_subtask(&self, params: UpdateSubtaskParams) -> Result<Subtask> {
        self.scope.require_user()?;
        let subtask_id = params.resolve_subtask_id().map(|s| s.to_string());
        let mut subtask = self.load_subtask(&params.task_id, subtask_id.as_deref()).await?;

        let data = params.subtask_data.unwrap_or_default();
        if let Some(title) = data.title {
            subtask.update_title(title)?;
        }
        if let Some(description) = data.description {
            subtask.update_description(description)?;
        }
        if let Some(priority) = data.priority {
            subtask.update_priority(priority);
        }
        if let Some(assignees) = data.assignees {
            subtask.update_assignees(assignees);
        }
        if let Some(status) = data.status {
            subtask.update_status(status)?;
        }
        if let Some(percentage) = data.progress_percentage {
            subtask.update_progress_percentage(percentage)?;
        }

        self.subtasks.save(&subtask).await?;
        self.publish(subtask.take_events());
        self.bubble_progress(&params.task_id).await?;
        Ok(subtask)
    }

    async fn delete_subtask(&self, params: SubtaskRefParams) -> Result<()> {
        self.scope.require_user()?;
        let subtask_id = params.resolve_subtask_id().map(|s| s.to_string());
        let subtask = self.load_subtask(&params.task_id, subtask_id.as_deref()).await?;

        self.subtasks.delete(&subtask.id).await?;

        let mut parent = self.load_parent(&params.task_id).await?;
        parent.remove_subtask_id(&subtask.id);
        self.tasks.save(&parent).await?;
        self.publish(parent.take_events());
        self.bubble_progress(&params.task_id).await?;
        Ok(())
    }

    async fn get_subtask(&self, params: SubtaskRefParams) -> Result<Subtask> {
        let subtask_id = params.resolve_subtask_id().map(|s| s.to_string());
        self.load_subtask(&params.task_id, subtask_id.as_deref()).await
    }

    async fn list_subtasks(&self, params: ListSubtasksParams) -> Result<Vec<Subtask>> {
        self.load_parent(&params.task_id).await?;
        self.subtasks.find_by_parent(&params.task_id).await
    }

    async fn complete_subtask(&self, params: SubtaskRefParams) -> Result<Subtask> {
        self.scope.require_user()?;
        let subtask_id = params.resolve_subtask_id().map(|s| s.to_string());
        let mut subtask = self.load_subtask(&params.task_id, subtask_id.as_deref()).await?;

        subtask.complete()?;
        self.subtasks.save(&subtask).await?;
        self.publish(subtask.take_events());
        self.bubble_progress(&params.task_id).await?;
        Ok(subtask)
    }
}
