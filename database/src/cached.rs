use async_trait::async_trait;
use dashmap::DashMap;
use hive_core::error::Result;
use hive_core::models::Task;
use hive_core::repository::{TaskFilter, TaskRepository};
use std::sync::Arc;
use tracing::debug;

/// Read-through cache wrapper around a [`TaskRepository`].
///
/// Implements the same contract as the inner repository. Every mutation
/// invalidates every read key derivable from the mutated entity: its id
/// key, its parent-branch key, and all list keys. No mutation path
/// bypasses invalidation.
pub struct CachedTaskRepository<R> {
    inner: Arc<R>,
    by_id: DashMap<String, Task>,
    by_branch: DashMap<String, Vec<Task>>,
    lists: DashMap<String, Vec<Task>>,
}

impl<R: TaskRepository> CachedTaskRepository<R> {
    pub fn new(inner: Arc<R>) -> Self {
        Self {
            inner,
            by_id: DashMap::new(),
            by_branch: DashMap::new(),
            lists: DashMap::new(),
        }
    }

    fn list_key(filter: &TaskFilter) -> String {
        format!(
            "branch={:?};status={:?};assignee={:?};limit={:?};offset={:?}",
            filter.branch_id, filter.status, filter.assignee, filter.limit, filter.offset
        )
    }

    fn invalidate_for(&self, task: &Task) {
        self.by_id.remove(&task.id);
        self.by_branch.remove(&task.branch_id);
        // List results can include any task, so every list key goes.
        self.lists.clear();
        debug!(task_id = %task.id, branch_id = %task.branch_id, "cache invalidated");
    }

    /// Number of cached id entries (test hook).
    pub fn cached_ids(&self) -> usize {
        self.by_id.len()
    }
}

#[async_trait]
impl<R: TaskRepository> TaskRepository for CachedTaskRepository<R> {
    async fn save(&self, task: &Task) -> Result<()> {
        self.inner.save(task).await?;
        self.invalidate_for(task);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Task>> {
        if let Some(cached) = self.by_id.get(id) {
            return Ok(Some(cached.clone()));
        }
        let found = self.inner.find_by_id(id).await?;
        if let Some(task) = &found {
            self.by_id.insert(task.id.clone(), task.clone());
        }
        Ok(found)
    }

    async fn find_by_branch(&self, branch_id: &str) -> Result<Vec<Task>> {
        if let Some(cached) = self.by_branch.get(branch_id) {
            return Ok(cached.clone());
        }
        let tasks = self.inner.find_by_branch(branch_id).await?;
        self.by_branch.insert(branch_id.to_string(), tasks.clone());
        Ok(tasks)
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let key = Self::list_key(&filter);
        if let Some(cached) = self.lists.get(&key) {
            return Ok(cached.clone());
        }
        let tasks = self.inner.list(filter).await?;
        self.lists.insert(key, tasks.clone());
        Ok(tasks)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        // Look the task up first so the branch key can be invalidated too.
        let task = self.inner.find_by_id(id).await?;
        self.inner.delete(id).await?;
        match task {
            Some(task) => self.invalidate_for(&task),
            None => {
                self.by_id.remove(id);
                self.lists.clear();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_repository::SqliteTaskRepository;
    use crate::test_pool;
    use hive_core::models::Priority;
    use hive_core::repository::Scope;
    use sqlx::SqlitePool;

    async fn seed_branch(pool: &SqlitePool) -> String {
        let project_id = hive_core::id::new_id();
        let branch_id = hive_core::id::new_id();
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO projects (id, user_id, name, created_at, updated_at) VALUES (?, 'u1', 'p', ?, ?)")
            .bind(&project_id).bind(&now).bind(&now)
            .execute(pool).await.unwrap();
        sqlx::query("INSERT INTO git_branches (id, project_id, user_id, name, created_at, updated_at) VALUES (?, ?, 'u1', 'main', ?, ?)")
            .bind(&branch_id).bind(&project_id).bind(&now).bind(&now)
            .execute(pool).await.unwrap();
        branch_id
    }

    fn task(branch_id: &str) -> Task {
        Task::create(
            hive_core::id::new_id(),
            branch_id.to_string(),
            "Build API".to_string(),
            "work".to_string(),
            Priority::Medium,
            vec!["@coding-agent".to_string()],
        )
        .unwrap()
    }

    async fn cached_repo() -> (CachedTaskRepository<SqliteTaskRepository>, String) {
        let pool = Arc::new(test_pool().await);
        let branch_id = seed_branch(&pool).await;
        let inner = Arc::new(SqliteTaskRepository::new(pool, Scope::user("u1")));
        (CachedTaskRepository::new(inner), branch_id)
    }

    #[tokio::test]
    async fn test_read_through_and_hit() {
        let (repo, branch_id) = cached_repo().await;
        let t = task(&branch_id);
        repo.save(&t).await.unwrap();

        assert_eq!(repo.cached_ids(), 0);
        let first = repo.find_by_id(&t.id).await.unwrap().unwrap();
        assert_eq!(repo.cached_ids(), 1);
        let second = repo.find_by_id(&t.id).await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_save_invalidates_all_derivable_keys() {
        let (repo, branch_id) = cached_repo().await;
        let mut t = task(&branch_id);
        repo.save(&t).await.unwrap();

        // Warm every cache shape
        repo.find_by_id(&t.id).await.unwrap();
        repo.find_by_branch(&branch_id).await.unwrap();
        repo.list(TaskFilter::default()).await.unwrap();

        t.update_title("Renamed".to_string()).unwrap();
        repo.save(&t).await.unwrap();

        // Fresh reads see the new title everywhere
        assert_eq!(repo.find_by_id(&t.id).await.unwrap().unwrap().title, "Renamed");
        assert_eq!(repo.find_by_branch(&branch_id).await.unwrap()[0].title, "Renamed");
        assert_eq!(repo.list(TaskFilter::default()).await.unwrap()[0].title, "Renamed");
    }

    #[tokio::test]
    async fn test_delete_invalidates() {
        let (repo, branch_id) = cached_repo().await;
        let t = task(&branch_id);
        repo.save(&t).await.unwrap();
        repo.find_by_id(&t.id).await.unwrap();
        repo.find_by_branch(&branch_id).await.unwrap();

        repo.delete(&t.id).await.unwrap();
        assert!(repo.find_by_id(&t.id).await.unwrap().is_none());
        assert!(repo.find_by_branch(&branch_id).await.unwrap().is_empty());
    }
}
