use crate::common::{map_sqlx_error, row_to_subtask, to_json_text, with_retry};
use async_trait::async_trait;
use hive_core::error::{DomainError, Result};
use hive_core::models::Subtask;
use hive_core::repository::{Scope, SubtaskRepository};
use sqlx::SqlitePool;
use std::sync::Arc;

/// SQLite implementation of [`SubtaskRepository`].
#[derive(Clone)]
pub struct SqliteSubtaskRepository {
    pool: Arc<SqlitePool>,
    scope: Scope,
}

impl SqliteSubtaskRepository {
    pub fn new(pool: Arc<SqlitePool>, scope: Scope) -> Self {
        Self { pool, scope }
    }

    async fn owner_of(&self, id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT user_id FROM subtasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(|(user,)| user))
    }
}

#[async_trait]
impl SubtaskRepository for SqliteSubtaskRepository {
    async fn save(&self, subtask: &Subtask) -> Result<()> {
        let user_id = self.scope.require_user()?.to_string();
        if let Some(owner) = self.owner_of(&subtask.id).await? {
            self.scope.owns(&owner)?;
        }

        let assignees = to_json_text(&subtask.assignees)?;
        let pool = self.pool.clone();
        with_retry("subtasks.save", || {
            let pool = pool.clone();
            let user_id = user_id.clone();
            let assignees = assignees.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO subtasks (
                        id, parent_task_id, user_id, title, description, status,
                        priority, assignees, progress_percentage, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        title = excluded.title,
                        description = excluded.description,
                        status = excluded.status,
                        priority = excluded.priority,
                        assignees = excluded.assignees,
                        progress_percentage = excluded.progress_percentage,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(&subtask.id)
                .bind(&subtask.parent_task_id)
                .bind(&user_id)
                .bind(&subtask.title)
                .bind(&subtask.description)
                .bind(subtask.status.as_str())
                .bind(subtask.priority.as_str())
                .bind(assignees)
                .bind(subtask.progress_percentage as i64)
                .bind(subtask.created_at.to_rfc3339())
                .bind(subtask.updated_at.to_rfc3339())
                .execute(&*pool)
                .await
                .map_err(map_sqlx_error)?;
                Ok(())
            }
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Subtask>> {
        let mut query = String::from("SELECT * FROM subtasks WHERE id = ?");
        if !self.scope.is_system() {
            query.push_str(" AND user_id = ?");
        }

        let mut q = sqlx::query(&query).bind(id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let row = q.fetch_optional(&*self.pool).await.map_err(map_sqlx_error)?;
        row.map(|r| row_to_subtask(&r)).transpose()
    }

    async fn find_by_parent(&self, parent_task_id: &str) -> Result<Vec<Subtask>> {
        let mut query = String::from("SELECT * FROM subtasks WHERE parent_task_id = ?");
        if !self.scope.is_system() {
            query.push_str(" AND user_id = ?");
        }
        query.push_str(" ORDER BY created_at ASC");

        let mut q = sqlx::query(&query).bind(parent_task_id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let rows = q.fetch_all(&*self.pool).await.map_err(map_sqlx_error)?;
        rows.iter().map(row_to_subtask).collect()
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match self.owner_of(id).await? {
            None => return Err(DomainError::not_found("Subtask", id)),
            Some(owner) => self.scope.owns(&owner)?,
        }
        sqlx::query("DELETE FROM subtasks WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;
    use hive_core::models::{Priority, TaskStatus};

    async fn seed_task(pool: &SqlitePool, user: &str) -> String {
        let project_id = hive_core::id::new_id();
        let branch_id = hive_core::id::new_id();
        let task_id = hive_core::id::new_id();
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO projects (id, user_id, name, created_at, updated_at) VALUES (?, ?, 'p', ?, ?)")
            .bind(&project_id).bind(user).bind(&now).bind(&now)
            .execute(pool).await.unwrap();
        sqlx::query("INSERT INTO git_branches (id, project_id, user_id, name, created_at, updated_at) VALUES (?, ?, ?, 'main', ?, ?)")
            .bind(&branch_id).bind(&project_id).bind(user).bind(&now).bind(&now)
            .execute(pool).await.unwrap();
        sqlx::query("INSERT INTO tasks (id, branch_id, user_id, title, description, created_at, updated_at) VALUES (?, ?, ?, 't', 'd', ?, ?)")
            .bind(&task_id).bind(&branch_id).bind(user).bind(&now).bind(&now)
            .execute(pool).await.unwrap();
        task_id
    }

    fn subtask(parent: &str) -> Subtask {
        Subtask::create(
            hive_core::id::new_id(),
            parent.to_string(),
            "Wire endpoint".to_string(),
            String::new(),
            Priority::Medium,
            vec![],
            &["@coding-agent".to_string()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_and_parent_listing() {
        let pool = Arc::new(test_pool().await);
        let parent = seed_task(&pool, "u1").await;
        let repo = SqliteSubtaskRepository::new(pool, Scope::user("u1"));

        let mut st = subtask(&parent);
        st.update_progress_percentage(40).unwrap();
        repo.save(&st).await.unwrap();
        repo.save(&subtask(&parent)).await.unwrap();

        let loaded = repo.find_by_id(&st.id).await.unwrap().unwrap();
        assert_eq!(loaded.progress_percentage, 40);
        assert_eq!(loaded.status, TaskStatus::InProgress);
        // inherited from parent task assignees at creation
        assert_eq!(loaded.assignees, vec!["@coding-agent"]);

        let children = repo.find_by_parent(&parent).await.unwrap();
        assert_eq!(children.len(), 2);
    }

    #[tokio::test]
    async fn test_cascade_on_task_delete() {
        let pool = Arc::new(test_pool().await);
        let parent = seed_task(&pool, "u1").await;
        let repo = SqliteSubtaskRepository::new(pool.clone(), Scope::user("u1"));
        repo.save(&subtask(&parent)).await.unwrap();

        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(&parent)
            .execute(&*pool)
            .await
            .unwrap();

        assert!(repo.find_by_parent(&parent).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cross_user_delete_refused() {
        let pool = Arc::new(test_pool().await);
        let parent = seed_task(&pool, "u1").await;
        let repo_u1 = SqliteSubtaskRepository::new(pool.clone(), Scope::user("u1"));
        let repo_u2 = SqliteSubtaskRepository::new(pool, Scope::user("u2"));

        let st = subtask(&parent);
        repo_u1.save(&st).await.unwrap();
        assert!(matches!(repo_u2.delete(&st.id).await, Err(DomainError::Forbidden(_))));
    }
}
