use crate::common::{map_sqlx_error, row_to_task, to_json_text, with_retry};
use async_trait::async_trait;
use hive_core::error::{DomainError, Result};
use hive_core::models::Task;
use hive_core::repository::{Scope, TaskFilter, TaskRepository};
use sqlx::SqlitePool;
use std::sync::Arc;

/// SQLite implementation of [`TaskRepository`]. User-scoped: every read and
/// write filters by the owning user unless the repository runs in system
/// scope.
#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: Arc<SqlitePool>,
    scope: Scope,
}

impl SqliteTaskRepository {
    pub fn new(pool: Arc<SqlitePool>, scope: Scope) -> Self {
        Self { pool, scope }
    }

    /// Reject writes whose owner does not match the repository scope, and
    /// resolve the user id a row should be stored under.
    fn write_user(&self) -> Result<&str> {
        self.scope.require_user()
    }

    async fn owner_of(&self, id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT user_id FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(|(user,)| user))
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn save(&self, task: &Task) -> Result<()> {
        let user_id = self.write_user()?.to_string();

        if let Some(owner) = self.owner_of(&task.id).await? {
            self.scope.owns(&owner)?;
        }

        let timeline = match &task.progress_timeline {
            Some(timeline) => Some(to_json_text(timeline)?),
            None => None,
        };
        let history = to_json_text(&task.progress_history)?;
        let assignees = to_json_text(&task.assignees)?;
        let labels = to_json_text(&task.labels)?;
        let dependencies = to_json_text(&task.dependencies)?;
        let subtask_ids = to_json_text(&task.subtask_ids)?;

        let pool = self.pool.clone();
        with_retry("tasks.save", || {
            let pool = pool.clone();
            let user_id = user_id.clone();
            let timeline = timeline.clone();
            let history = history.clone();
            let assignees = assignees.clone();
            let labels = labels.clone();
            let dependencies = dependencies.clone();
            let subtask_ids = subtask_ids.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO tasks (
                        id, branch_id, user_id, title, description, status, priority,
                        details, estimated_effort, due_date, context_id,
                        overall_progress, progress_state, progress_timeline,
                        progress_history, assignees, labels, dependencies,
                        subtask_ids, status_before_block, completion_summary,
                        testing_notes, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        branch_id = excluded.branch_id,
                        title = excluded.title,
                        description = excluded.description,
                        status = excluded.status,
                        priority = excluded.priority,
                        details = excluded.details,
                        estimated_effort = excluded.estimated_effort,
                        due_date = excluded.due_date,
                        context_id = excluded.context_id,
                        overall_progress = excluded.overall_progress,
                        progress_state = excluded.progress_state,
                        progress_timeline = excluded.progress_timeline,
                        progress_history = excluded.progress_history,
                        assignees = excluded.assignees,
                        labels = excluded.labels,
                        dependencies = excluded.dependencies,
                        subtask_ids = excluded.subtask_ids,
                        status_before_block = excluded.status_before_block,
                        completion_summary = excluded.completion_summary,
                        testing_notes = excluded.testing_notes,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(&task.id)
                .bind(&task.branch_id)
                .bind(&user_id)
                .bind(&task.title)
                .bind(&task.description)
                .bind(task.status.as_str())
                .bind(task.priority.as_str())
                .bind(&task.details)
                .bind(&task.estimated_effort)
                .bind(task.due_date.map(|d| d.format("%Y-%m-%d").to_string()))
                .bind(&task.context_id)
                .bind(task.overall_progress as i64)
                .bind(task.progress_state.as_str())
                .bind(timeline)
                .bind(history)
                .bind(assignees)
                .bind(labels)
                .bind(dependencies)
                .bind(subtask_ids)
                .bind(task.status_before_block.map(|s| s.as_str()))
                .bind(&task.completion_summary)
                .bind(&task.testing_notes)
                .bind(task.created_at.to_rfc3339())
                .bind(task.updated_at.to_rfc3339())
                .execute(&*pool)
                .await
                .map_err(map_sqlx_error)?;
                Ok(())
            }
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE id = ?");
        if !self.scope.is_system() {
            query.push_str(" AND user_id = ?");
        }

        let mut q = sqlx::query(&query).bind(id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }

        let row = q.fetch_optional(&*self.pool).await.map_err(map_sqlx_error)?;
        row.map(|r| row_to_task(&r)).transpose()
    }

    async fn find_by_branch(&self, branch_id: &str) -> Result<Vec<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE branch_id = ?");
        if !self.scope.is_system() {
            query.push_str(" AND user_id = ?");
        }
        query.push_str(" ORDER BY created_at ASC");

        let mut q = sqlx::query(&query).bind(branch_id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }

        let rows = q.fetch_all(&*self.pool).await.map_err(map_sqlx_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM tasks WHERE 1 = 1");

        if let Some(user) = self.scope.user_id() {
            builder.push(" AND user_id = ");
            builder.push_bind(user.to_string());
        }
        if let Some(branch_id) = &filter.branch_id {
            builder.push(" AND branch_id = ");
            builder.push_bind(branch_id.clone());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(assignee) = &filter.assignee {
            // assignees is a JSON array of handles
            builder.push(" AND assignees LIKE ");
            builder.push_bind(format!("%\"{assignee}\"%"));
        }

        builder.push(" ORDER BY created_at DESC");

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }
        if let Some(offset) = filter.offset {
            builder.push(" OFFSET ");
            builder.push_bind(offset as i64);
        }

        let rows = builder.build().fetch_all(&*self.pool).await.map_err(map_sqlx_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match self.owner_of(id).await? {
            None => return Err(DomainError::not_found("Task", id)),
            Some(owner) => self.scope.owns(&owner)?,
        }

        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
