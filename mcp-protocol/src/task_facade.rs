use crate::context_service::ContextService;
use async_trait::async_trait;
use hive_core::context::ContextLevel;
use hive_core::error::{DomainError, Result};
use hive_core::events::TaskEvent;
use hive_core::models::{SubtaskRollup, Task};
use hive_core::protocol::{
    CompleteTaskParams, CreateTaskParams, DeleteTaskParams, GetTaskParams, ListTasksParams,
    NextTaskParams, TaskProtocol, TaskWithContext, UpdateTaskParams,
};
use hive_core::repository::{
    ContextCacheRepository, ContextRepository, DelegationRepository, Scope, SubtaskRepository,
    TaskFilter, TaskRepository,
};
use hive_core::scoring::{self, NextTaskRecommendation};
use hive_core::validation::TaskValidator;
use std::sync::Arc;
use tracing::debug;

/// Facade for the unified manage_task surface.
pub struct TaskFacade<T, S, C, K, D> {
    tasks: Arc<T>,
    subtasks: Arc<S>,
    context_service: Arc<ContextService<C, K, D>>,
    scope: Scope,
}

impl<T, S, C, K, D> TaskFacade<T, S, C, K, D>
where
    T: TaskRepository,
    S: SubtaskRepository,
    C: ContextRepository,
    K: ContextCacheRepository,
    D: DelegationRepository,
{
    pub fn new(
        tasks: Arc<T>,
        subtasks: Arc<S>,
        context_service: Arc<ContextService<C, K, D>>,
        scope: Scope,
    ) -> Self {
        Self { tasks, subtasks, context_service, scope }
    }

    async fn load_task(&self, task_id: &str) -> Result<Task> {
        self.tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Task", task_id))
    }

    /// Hand drained events to the event-bus sink. Delivery is an external
    /// concern; the facade only publishes.
    fn publish(&self, events: Vec<TaskEvent>) {
        for event in events {
            debug!(event_type = event.event_type(), payload = %event.to_json(), "domain event");
        }
    }

    async fn subtask_rollup(&self, task: &Task) -> Result<SubtaskRollup> {
        if task.subtask_ids.is_empty() {
            return Ok(SubtaskRollup::default());
        }
        let subtasks = self.subtasks.find_by_parent(&task.id).await?;
        Ok(SubtaskRollup::from_subtasks(&subtasks))
    }
}

#[async_trait]
impl<T, S, C, K, D> TaskProtocol for TaskFacade<T, S, C, K, D>
where
    T: TaskRepository,
    S: SubtaskRepository,
    C: ContextRepository,
    K: ContextCacheRepository,
    D: DelegationRepository,
{
    async fn create_task(&self, params: CreateTaskParams) -> Result<Task> {
        self.scope.require_user()?;

        TaskValidator::require_assignees(&params.assignees)?;
        let assignees = TaskValidator::validate_assignee_list(&params.assignees)?;

        let mut task = Task::create(
            hive_core::id::new_id(),
            params.git_branch_id,
            params.title,
            params.description,
            params.priority.unwrap_or_default(),
            assignees,
        )?;

        if let Some(details) = params.details {
            task.details = details;
        }
        if let Some(effort) = params.estimated_effort {
            task.estimated_effort = effort;
        }
        if !params.labels.is_empty() {
            task.labels = TaskValidator::normalize_labels(&params.labels);
        }
        if let Some(due) = params.due_date {
            task.due_date = Some(TaskValidator::validate_due_date(&due)?);
        }

        self.tasks.save(&task).await?;
        self.publish(task.take_events());
        Ok(task)
    }

    async fn get_task(&self, params: GetTaskParams) -> Result<TaskWithContext> {
        let mut task = self.load_task(&params.task_id).await?;

        let resolved_context = if params.include_context {
            let context_id = task.context_id.clone().unwrap_or_else(|| task.id.clone());
            match self.context_service.resolve(ContextLevel::Task, &context_id, true).await {
                Ok(resolved) => Some(resolved),
                Err(error) if error.is_not_found() => None,
                Err(error) => return Err(error),
            }
        } else {
            None
        };

        task.mark_retrieved();
        self.publish(task.take_events());
        Ok(TaskWithContext { task, resolved_context })
    }

    async fn update_task(&self, params: UpdateTaskParams) -> Result<Task> {
        self.scope.require_user()?;
        let mut task = self.load_task(&params.task_id).await?;

        if let Some(title) = params.title {
            task.update_title(title)?;
        }
        if let Some(description) = params.description {
            task.update_description(description)?;
        }
        if let Some(details) = params.details {
            task.update_details(details);
        }
        if let Some(effort) = params.estimated_effort {
            task.update_estimated_effort(effort);
        }
        if let Some(assignees) = params.assignees {
            task.update_assignees(assignees);
        }
        if let Some(labels) = params.labels {
            task.update_labels(labels);
        }
        if let Some(due_date) = params.due_date {
            task.update_due_date(due_date)?;
        }
        if let Some(priority) = params.priority {
            task.update_priority(priority);
        }
        if let Some(status) = params.status {
            task.update_status(status)?;
        }
        if let Some(summary) = params.completion_summary {
            task.completion_summary = Some(summary);
            task.clear_context_id();
        }
        if let Some(notes) = params.testing_notes {
            task.testing_notes = Some(notes);
            task.clear_context_id();
        }
        // Setting the pointer itself marks the context as freshly recorded.
        if let Some(context_id) = params.context_id {
            task.set_context_id(context_id);
        }

        let rollup = self.subtask_rollup(&task).await?;
        if rollup.total > 0 {
            task.recalculate_overall_progress(Some(rollup.percentage));
        }

        self.tasks.save(&task).await?;
        self.publish(task.take_events());
        Ok(task)
    }

    async fn delete_task(&self, params: DeleteTaskParams) -> Result<()> {
        self.scope.require_user()?;
        let mut task = self.load_task(&params.task_id).await?;
        task.mark_deleted();
        self.publish(task.take_events());
        self.tasks.delete(&task.id).await
    }

    async fn complete_task(&self, params: CompleteTaskParams) -> Result<Task> {
        self.scope.require_user()?;
        let mut task = self.load_task(&params.task_id).await?;

        if params.completion_summary.trim().is_empty() {
            return Err(DomainError::MissingCompletionSummary(task.id.clone()));
        }

        // A caller-supplied context stamp older than the task's last update
        // means the context no longer reflects the task, whether or not the
        // pointer survived the intervening mutations.
        if let Some(context_at) = params.context_updated_at {
            if context_at <= task.updated_at {
                let lag_seconds = (task.updated_at - context_at).num_seconds();
                return Err(DomainError::StaleContext { task_id: task.id.clone(), lag_seconds });
            }
        }

        // The entity only holds subtask ids; load the real subtasks here
        // and pass the verdict down.
        let subtasks = self.subtasks.find_by_parent(&task.id).await?;
        let all_subtasks_completed = subtasks.iter().all(|s| s.is_completed());

        task.complete(
            &params.completion_summary,
            params.testing_notes,
            params.context_updated_at,
            all_subtasks_completed,
        )?;

        self.tasks.save(&task).await?;
        self.publish(task.take_events());
        Ok(task)
    }

    async fn list_tasks(&self, params: ListTasksParams) -> Result<Vec<Task>> {
        self.tasks
            .list(TaskFilter {
                branch_id: params.git_branch_id,
                status: params.status,
                assignee: params.assignee,
                limit: params.limit,
                offset: params.offset,
            })
            .await
    }

    async fn next_task(&self, params: NextTaskParams) -> Result<Option<NextTaskRecommendation>> {
        let tasks = self.tasks.find_by_branch(&params.git_branch_id).await?;

        // The dependency picture comes from the whole branch, terminal tasks
        // included, so a completed prerequisite stops holding its dependents
        // back.
        let all_tasks: Vec<&Task> = tasks.iter().collect();
        let deps = scoring::dependency_counts(&all_tasks);

        let eligible: Vec<&Task> = tasks.iter().filter(|t| !t.status.is_terminal()).collect();

        Ok(scoring::recommend_next_task(&eligible, |id| {
            deps.get(id).copied().unwrap_or_default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use hive_core::models::{Priority, ProgressState, TaskStatus};
    use hive_mocks::{
        MockContextCacheRepository, MockContextRepository, MockDelegationRepository,
        MockSubtaskRepository, MockTaskRepository, SubtaskBuilder, TaskBuilder,
    };

    type Facade = TaskFacade<
        MockTaskRepository,
        MockSubtaskRepository,
        MockContextRepository,
        MockContextCacheRepository,
        MockDelegationRepository,
    >;

    fn facade() -> (Facade, Arc<MockTaskRepository>, Arc<MockSubtaskRepository>) {
        let tasks = Arc::new(MockTaskRepository::new());
        let subtasks = Arc::new(MockSubtaskRepository::new());
        let contexts = Arc::new(MockContextRepository::new());
        let cache = Arc::new(MockContextCacheRepository::new());
        let delegations = Arc::new(MockDelegationRepository::new());
        let context_service = Arc::new(ContextService::new(
            contexts,
            cache,
            delegations,
            Scope::user("u1"),
            300,
        ));
        let facade =
            TaskFacade::new(tasks.clone(), subtasks.clone(), context_service, Scope::user("u1"));
        (facade, tasks, subtasks)
    }

    fn create_params() -> CreateTaskParams {
        CreateTaskParams {
            git_branch_id: hive_core::id::new_id(),
            title: "Build API".into(),
            description: "Build the backend API".into(),
            priority: None,
            assignees: vec!["coding-agent".into()],
            labels: vec![],
            due_date: None,
            details: None,
            estimated_effort: None,
        }
    }

    #[tokio::test]
    async fn test_create_validates_assignees_strictly() {
        let (facade, _, _) = facade();

        let mut params = create_params();
        params.assignees = vec![];
        assert!(facade.create_task(params).await.is_err());

        let mut params = create_params();
        params.assignees = vec!["not-a-known-role".into()];
        assert!(facade.create_task(params).await.is_err());

        let task = facade.create_task(create_params()).await.unwrap();
        assert_eq!(task.assignees, vec!["@coding-agent"]);
        assert_eq!(task.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn test_update_preserves_context_for_status_only() {
        let (facade, tasks, _) = facade();
        let task = facade.create_task(create_params()).await.unwrap();

        // record a context pointer
        facade
            .update_task(UpdateTaskParams {
                task_id: task.id.clone(),
                context_id: Some("ctx-1".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        // status-only keeps it
        let updated = facade
            .update_task(UpdateTaskParams {
                task_id: task.id.clone(),
                status: Some(TaskStatus::InProgress),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.context_id.as_deref(), Some("ctx-1"));

        // title update clears it
        let updated = facade
            .update_task(UpdateTaskParams {
                task_id: task.id.clone(),
                title: Some("Renamed".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(updated.context_id.is_none());

        let stored = tasks.find_by_id(&task.id).await.unwrap().unwrap();
        assert!(stored.context_id.is_none());
    }

    #[tokio::test]
    async fn test_complete_requires_summary_and_leaves_status() {
        let (facade, tasks, _) = facade();
        let task = facade.create_task(create_params()).await.unwrap();
        facade
            .update_task(UpdateTaskParams {
                task_id: task.id.clone(),
                status: Some(TaskStatus::InProgress),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = facade
            .complete_task(CompleteTaskParams {
                task_id: task.id.clone(),
                completion_summary: "".into(),
                testing_notes: None,
                context_updated_at: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_COMPLETION_SUMMARY");

        let stored = tasks.find_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_complete_blocked_by_open_subtasks() {
        let (facade, _, subtasks) = facade();
        let task = facade.create_task(create_params()).await.unwrap();

        let open = SubtaskBuilder::new().parent(&task.id).build();
        subtasks.save(&open).await.unwrap();

        let err = facade
            .complete_task(CompleteTaskParams {
                task_id: task.id.clone(),
                completion_summary: "done".into(),
                testing_notes: None,
                context_updated_at: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());

        // complete the subtask, completion now passes
        let mut done = open;
        done.complete().unwrap();
        subtasks.save(&done).await.unwrap();

        let completed = facade
            .complete_task(CompleteTaskParams {
                task_id: task.id.clone(),
                completion_summary: "done".into(),
                testing_notes: None,
                context_updated_at: None,
            })
            .await
            .unwrap();
        assert_eq!(completed.status, TaskStatus::Done);
        assert_eq!(completed.overall_progress, 100);
        assert_eq!(completed.progress_state, ProgressState::Complete);
    }

    #[tokio::test]
    async fn test_stale_context_rejection_flow() {
        let (facade, _, _) = facade();
        let created = facade.create_task(create_params()).await.unwrap();

        // Record a context pointer, then mutate the task (clears pointer),
        // then point it again so the staleness check applies.
        facade
            .update_task(UpdateTaskParams {
                task_id: created.id.clone(),
                context_id: Some("ctx-1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let updated = facade
            .update_task(UpdateTaskParams {
                task_id: created.id.clone(),
                description: Some("changed since context".into()),
                context_id: Some("ctx-1".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let stale_stamp = updated.updated_at - Duration::seconds(60);
        let err = facade
            .complete_task(CompleteTaskParams {
                task_id: created.id.clone(),
                completion_summary: "done".into(),
                testing_notes: None,
                context_updated_at: Some(stale_stamp),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STALE_CONTEXT");
        assert!(format!("{err}").contains(&created.id));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (facade, tasks, _) = facade();
        let branch = hive_core::id::new_id();
        tasks.save(&TaskBuilder::new().branch(&branch).build()).await.unwrap();
        tasks
            .save(&TaskBuilder::new().branch(&branch).status(TaskStatus::InProgress).build())
            .await
            .unwrap();
        tasks.save(&TaskBuilder::new().build()).await.unwrap();

        let by_branch = facade
            .list_tasks(ListTasksParams {
                git_branch_id: Some(branch.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_branch.len(), 2);

        let todos = facade
            .list_tasks(ListTasksParams {
                git_branch_id: Some(branch),
                status: Some(TaskStatus::Todo),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(todos.len(), 1);
    }

    #[tokio::test]
    async fn test_next_prefers_high_priority_and_skips_done(){
        let (facade, tasks, _) = facade();
        let branch = hive_core::id::new_id();

        let low = TaskBuilder::new().branch(&branch).priority(Priority::Low).build();
        let critical = TaskBuilder::new().branch(&branch).priority(Priority::Critical).build();
        let done = TaskBuilder::new().branch(&branch).status(TaskStatus::Done).build();
        for t in [&low, &critical, &done] {
            tasks.save(t).await.unwrap();
        }

        let rec = facade
            .next_task(NextTaskParams { git_branch_id: branch })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.task_id, critical.id);
        assert_eq!(rec.total_eligible_tasks, 2);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (facade, _, _) = facade();
        let err = facade
            .delete_task(DeleteTaskParams { task_id: hive_core::id::new_id() })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
