use crate::context::{
    BranchContext, ContextCacheEntry, ContextDelegation, ContextLevel, GlobalContext,
    ProjectContext, TaskContext,
};
use crate::error::{DomainError, Result};
use crate::models::{Project, Subtask, Task, TaskStatus};
use async_trait::async_trait;

/// Tenant scope a repository is constructed with.
///
/// User scope filters every read and write by the authenticated user.
/// System mode skips tenant filtering; it is reserved for startup and
/// maintenance and must be refused when a write originates from a user
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    user_id: Option<String>,
}

impl Scope {
    pub fn user(user_id: impl Into<String>) -> Scope {
        Scope { user_id: Some(user_id.into()) }
    }

    pub fn system() -> Scope {
        Scope { user_id: None }
    }

    pub fn is_system(&self) -> bool {
        self.user_id.is_none()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The authenticated user, or Forbidden in system mode. Facades call
    /// this before any user-originating write.
    pub fn require_user(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| DomainError::Forbidden("operation requires an authenticated user".into()))
    }

    /// Check row ownership. System mode owns everything.
    pub fn owns(&self, row_user_id: &str) -> Result<()> {
        match self.user_id.as_deref() {
            None => Ok(()),
            Some(user) if user == row_user_id => Ok(()),
            Some(_) => Err(DomainError::Forbidden("access denied".into())),
        }
    }
}

/// Filter criteria for task listing. Fields combine with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub branch_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Persistence contract for project aggregates.
///
/// `save` is an upsert: it sets `created_at` on insert, bumps `updated_at`
/// on any write, and rejects writes owned by a different user. Deleting
/// cascades to branches and tasks as declared by foreign keys.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn save(&self, project: &Project) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Project>>;
    async fn list(&self) -> Result<Vec<Project>>;
    async fn delete(&self, id: &str) -> Result<()>;
    /// Persist a session that has left the aggregate's active map
    /// (completed, cancelled or timed out), so its terminal state survives.
    async fn save_session(&self, project_id: &str, session: &crate::models::WorkSession)
        -> Result<()>;
    async fn health_check(&self) -> Result<()>;
}

/// Persistence contract for tasks (user-filtered).
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn save(&self, task: &Task) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Task>>;
    async fn find_by_branch(&self, branch_id: &str) -> Result<Vec<Task>>;
    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Persistence contract for subtasks (user-filtered).
#[async_trait]
pub trait SubtaskRepository: Send + Sync {
    async fn save(&self, subtask: &Subtask) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Subtask>>;
    async fn find_by_parent(&self, parent_task_id: &str) -> Result<Vec<Subtask>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Persistence contract for the four context levels.
///
/// Saves are upsert-with-version: when the stored row's version has
/// advanced past the entity's previous version the write fails with
/// Conflict, and the caller re-reads and retries.
#[async_trait]
pub trait ContextRepository: Send + Sync {
    async fn save_global(&self, context: &GlobalContext) -> Result<()>;
    async fn find_global_by_id(&self, id: &str) -> Result<Option<GlobalContext>>;
    /// The calling user's own global context, if created
    async fn find_global_for_user(&self) -> Result<Option<GlobalContext>>;

    async fn save_project_context(&self, context: &ProjectContext) -> Result<()>;
    async fn find_project_context(&self, id: &str) -> Result<Option<ProjectContext>>;
    async fn find_project_contexts_by_parent(
        &self,
        global_context_id: &str,
    ) -> Result<Vec<ProjectContext>>;

    async fn save_branch_context(&self, context: &BranchContext) -> Result<()>;
    async fn find_branch_context(&self, id: &str) -> Result<Option<BranchContext>>;
    async fn find_branch_contexts_by_parent(
        &self,
        project_context_id: &str,
    ) -> Result<Vec<BranchContext>>;

    async fn save_task_context(&self, context: &TaskContext) -> Result<()>;
    async fn find_task_context(&self, id: &str) -> Result<Option<TaskContext>>;
    async fn find_task_contexts_by_parent(
        &self,
        branch_context_id: &str,
    ) -> Result<Vec<TaskContext>>;
}

/// Persistence contract for the inheritance cache. Rows are per-user and
/// keyed by `(context_id, level)`; the table is internal and may be rebuilt
/// at will.
#[async_trait]
pub trait ContextCacheRepository: Send + Sync {
    /// Fetch the entry regardless of liveness; callers check
    /// [`ContextCacheEntry::is_live`] and the dependencies hash.
    async fn get(&self, context_id: &str, level: ContextLevel) -> Result<Option<ContextCacheEntry>>;
    /// Upsert the entry, replacing any previous row for the key.
    async fn put(&self, entry: &ContextCacheEntry) -> Result<()>;
    /// Persist hit bookkeeping for a live entry.
    async fn record_hit(&self, context_id: &str, level: ContextLevel) -> Result<()>;
    /// Mark-invalidate one entry.
    async fn invalidate(&self, context_id: &str, level: ContextLevel, reason: &str) -> Result<()>;
}

/// Persistence contract for delegation records.
#[async_trait]
pub trait DelegationRepository: Send + Sync {
    async fn save(&self, delegation: &ContextDelegation) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<ContextDelegation>>;
    async fn list_unprocessed(&self) -> Result<Vec<ContextDelegation>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_modes() {
        let user = Scope::user("u1");
        assert!(!user.is_system());
        assert_eq!(user.require_user().unwrap(), "u1");
        assert!(user.owns("u1").is_ok());
        assert!(matches!(user.owns("u2"), Err(DomainError::Forbidden(_))));

        let system = Scope::system();
        assert!(system.is_system());
        assert!(matches!(system.require_user(), Err(DomainError::Forbidden(_))));
        assert!(system.owns("anyone").is_ok());
    }

    #[test]
    fn test_forbidden_does_not_leak_target() {
        let scope = Scope::user("u1");
        let err = scope.owns("u2").unwrap_err();
        let message = format!("{err}");
        assert!(!message.contains("u2"));
    }

    #[test]
    fn test_task_filter_default_is_empty() {
        let filter = TaskFilter::default();
        assert!(filter.branch_id.is_none());
        assert!(filter.status.is_none());
        assert!(filter.assignee.is_none());
    }
}
