//! Mock repository implementations.
//!
//! Thread-safe in-memory stores with:
//! - Error injection capabilities
//! - Call tracking for verification
//! - The same contracts as the SQLite implementations (version conflicts,
//!   user scoping left to the caller)

use async_trait::async_trait;
use hive_core::context::{
    BranchContext, ContextCacheEntry, ContextDelegation, ContextLevel, GlobalContext,
    ProjectContext, TaskContext,
};
use hive_core::error::{DomainError, Result};
use hive_core::models::{Project, Subtask, Task, WorkSession};
use hive_core::repository::{
    ContextCacheRepository, ContextRepository, DelegationRepository, ProjectRepository,
    SubtaskRepository, TaskFilter, TaskRepository,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared error-injection and call-history plumbing carried by every mock.
#[derive(Default)]
struct MockState {
    error_injection: Option<DomainError>,
    call_history: Vec<String>,
}

impl MockState {
    /// Record the call, then surface an injected error if one is pending.
    fn enter(&mut self, call: String) -> Result<()> {
        self.call_history.push(call);
        match self.error_injection.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

macro_rules! mock_instrumentation {
    () => {
        /// Inject an error for the next operation
        pub fn inject_error(&self, error: DomainError) {
            self.state.lock().error_injection = Some(error);
        }

        /// Get history of called methods
        pub fn call_history(&self) -> Vec<String> {
            self.state.lock().call_history.clone()
        }

        /// Assert a method was called
        pub fn assert_called(&self, method: &str) {
            let history = self.call_history();
            assert!(
                history.iter().any(|call| call.contains(method)),
                "Method '{method}' was not called. Call history: {history:?}"
            );
        }
    };
}

/// Mock implementation of [`TaskRepository`].
#[derive(Default)]
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    state: Arc<Mutex<MockState>>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let map = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self { tasks: Arc::new(Mutex::new(map)), state: Arc::default() }
    }

    mock_instrumentation!();
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn save(&self, task: &Task) -> Result<()> {
        self.state.lock().enter(format!("save({})", task.id))?;
        self.tasks.lock().insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Task>> {
        self.state.lock().enter(format!("find_by_id({id})"))?;
        Ok(self.tasks.lock().get(id).cloned())
    }

    async fn find_by_branch(&self, branch_id: &str) -> Result<Vec<Task>> {
        self.state.lock().enter(format!("find_by_branch({branch_id})"))?;
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .values()
            .filter(|t| t.branch_id == branch_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(tasks)
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.state.lock().enter("list()".to_string())?;
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .values()
            .filter(|task| {
                if let Some(branch_id) = &filter.branch_id {
                    if &task.branch_id != branch_id {
                        return false;
                    }
                }
                if let Some(status) = filter.status {
                    if task.status != status {
                        return false;
                    }
                }
                if let Some(assignee) = &filter.assignee {
                    if !task.assignees.iter().any(|a| a == assignee) {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(offset) = filter.offset {
            if offset as usize >= tasks.len() {
                return Ok(Vec::new());
            }
            tasks = tasks.split_off(offset as usize);
        }
        if let Some(limit) = filter.limit {
            tasks.truncate(limit as usize);
        }
        Ok(tasks)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.state.lock().enter(format!("delete({id})"))?;
        self.tasks
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("Task", id))
    }
}

/// Mock implementation of [`SubtaskRepository`].
#[derive(Default)]
pub struct MockSubtaskRepository {
    subtasks: Arc<Mutex<HashMap<String, Subtask>>>,
    state: Arc<Mutex<MockState>>,
}

impl MockSubtaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    mock_instrumentation!();
}

#[async_trait]
impl SubtaskRepository for MockSubtaskRepository {
    async fn save(&self, subtask: &Subtask) -> Result<()> {
        self.state.lock().enter(format!("save({})", subtask.id))?;
        self.subtasks.lock().insert(subtask.id.clone(), subtask.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Subtask>> {
        self.state.lock().enter(format!("find_by_id({id})"))?;
        Ok(self.subtasks.lock().get(id).cloned())
    }

    async fn find_by_parent(&self, parent_task_id: &str) -> Result<Vec<Subtask>> {
        self.state.lock().enter(format!("find_by_parent({parent_task_id})"))?;
        let mut subtasks: Vec<Subtask> = self
            .subtasks
            .lock()
            .values()
            .filter(|s| s.parent_task_id == parent_task_id)
            .cloned()
            .collect();
        subtasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(subtasks)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.state.lock().enter(format!("delete({id})"))?;
        self.subtasks
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("Subtask", id))
    }
}

/// Mock implementation of [`ProjectRepository`]. Ended sessions saved via
/// [`ProjectRepository::save_session`] are retained for inspection.
#[derive(Default)]
pub struct MockProjectRepository {
    projects: Arc<Mutex<HashMap<String, Project>>>,
    ended_sessions: Arc<Mutex<Vec<WorkSession>>>,
    state: Arc<Mutex<MockState>>,
}

impl MockProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminal sessions persisted through save_session
    pub fn ended_sessions(&self) -> Vec<WorkSession> {
        self.ended_sessions.lock().clone()
    }

    mock_instrumentation!();
}

#[async_trait]
impl ProjectRepository for MockProjectRepository {
    async fn save(&self, project: &Project) -> Result<()> {
        self.state.lock().enter(format!("save({})", project.id))?;
        self.projects.lock().insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Project>> {
        self.state.lock().enter(format!("find_by_id({id})"))?;
        Ok(self.projects.lock().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Project>> {
        self.state.lock().enter("list()".to_string())?;
        let mut projects: Vec<Project> = self.projects.lock().values().cloned().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(projects)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.state.lock().enter(format!("delete({id})"))?;
        self.projects
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("Project", id))
    }

    async fn save_session(&self, project_id: &str, session: &WorkSession) -> Result<()> {
        self.state.lock().enter(format!("save_session({project_id})"))?;
        self.ended_sessions.lock().push(session.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.state.lock().enter("health_check()".to_string())
    }
}

/// Mock implementation of [`ContextRepository`] with version conflicts.
#[derive(Default)]
pub struct MockContextRepository {
    globals: Arc<Mutex<HashMap<String, GlobalContext>>>,
    projects: Arc<Mutex<HashMap<String, ProjectContext>>>,
    branches: Arc<Mutex<HashMap<String, BranchContext>>>,
    tasks: Arc<Mutex<HashMap<String, TaskContext>>>,
    user_id: Arc<Mutex<Option<String>>>,
    state: Arc<Mutex<MockState>>,
}

impl MockContextRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the user whose global context `find_global_for_user` returns.
    pub fn for_user(self, user_id: &str) -> Self {
        *self.user_id.lock() = Some(user_id.to_string());
        self
    }

    mock_instrumentation!();
}

fn versioned_insert<T>(
    map: &mut HashMap<String, T>,
    id: &str,
    version: i64,
    stored_version: impl Fn(&T) -> i64,
    value: T,
) -> Result<()> {
    if let Some(existing) = map.get(id) {
        if stored_version(existing) >= version {
            return Err(DomainError::Conflict(format!(
                "context row {id} was modified concurrently"
            )));
        }
    }
    map.insert(id.to_string(), value);
    Ok(())
}

#[async_trait]
impl ContextRepository for MockContextRepository {
    async fn save_global(&self, context: &GlobalContext) -> Result<()> {
        self.state.lock().enter(format!("save_global({})", context.id))?;
        versioned_insert(
            &mut self.globals.lock(),
            &context.id,
            context.version,
            |c: &GlobalContext| c.version,
            context.clone(),
        )
    }

    async fn find_global_by_id(&self, id: &str) -> Result<Option<GlobalContext>> {
        self.state.lock().enter(format!("find_global_by_id({id})"))?;
        Ok(self.globals.lock().get(id).cloned())
    }

    async fn find_global_for_user(&self) -> Result<Option<GlobalContext>> {
        self.state.lock().enter("find_global_for_user()".to_string())?;
        let user = self.user_id.lock().clone();
        Ok(self
            .globals
            .lock()
            .values()
            .find(|g| Some(&g.user_id) == user.as_ref())
            .cloned())
    }

    async fn save_project_context(&self, context: &ProjectContext) -> Result<()> {
        self.state.lock().enter(format!("save_project_context({})", context.id))?;
        versioned_insert(
            &mut self.projects.lock(),
            &context.id,
            context.version,
            |c: &ProjectContext| c.version,
            context.clone(),
        )
    }

    async fn find_project_context(&self, id: &str) -> Result<Option<ProjectContext>> {
        self.state.lock().enter(format!("find_project_context({id})"))?;
        Ok(self.projects.lock().get(id).cloned())
    }

    async fn find_project_contexts_by_parent(
        &self,
        global_context_id: &str,
    ) -> Result<Vec<ProjectContext>> {
        self.state
            .lock()
            .enter(format!("find_project_contexts_by_parent({global_context_id})"))?;
        Ok(self
            .projects
            .lock()
            .values()
            .filter(|c| c.parent_global_id.as_deref() == Some(global_context_id))
            .cloned()
            .collect())
    }

    async fn save_branch_context(&self, context: &BranchContext) -> Result<()> {
        self.state.lock().enter(format!("save_branch_context({})", context.id))?;
        versioned_insert(
            &mut self.branches.lock(),
            &context.id,
            context.version,
            |c: &BranchContext| c.version,
            context.clone(),
        )
    }

    async fn find_branch_context(&self, id: &str) -> Result<Option<BranchContext>> {
        self.state.lock().enter(format!("find_branch_context({id})"))?;
        Ok(self.branches.lock().get(id).cloned())
    }

    async fn find_branch_contexts_by_parent(
        &self,
        project_context_id: &str,
    ) -> Result<Vec<BranchContext>> {
        self.state
            .lock()
            .enter(format!("find_branch_contexts_by_parent({project_context_id})"))?;
        Ok(self
            .branches
            .lock()
            .values()
            .filter(|c| c.parent_project_id.as_deref() == Some(project_context_id))
            .cloned()
            .collect())
    }

    async fn save_task_context(&self, context: &TaskContext) -> Result<()> {
        self.state.lock().enter(format!("save_task_context({})", context.id))?;
        versioned_insert(
            &mut self.tasks.lock(),
            &context.id,
            context.version,
            |c: &TaskContext| c.version,
            context.clone(),
        )
    }

    async fn find_task_context(&self, id: &str) -> Result<Option<TaskContext>> {
        self.state.lock().enter(format!("find_task_context({id})"))?;
        Ok(self.tasks.lock().get(id).cloned())
    }

    async fn find_task_contexts_by_parent(
        &self,
        branch_context_id: &str,
    ) -> Result<Vec<TaskContext>> {
        self.state
            .lock()
            .enter(format!("find_task_contexts_by_parent({branch_context_id})"))?;
        Ok(self
            .tasks
            .lock()
            .values()
            .filter(|c| c.parent_branch_context_id.as_deref() == Some(branch_context_id))
            .cloned()
            .collect())
    }
}

/// Mock implementation of [`ContextCacheRepository`].
#[derive(Default)]
pub struct MockContextCacheRepository {
    entries: Arc<Mutex<HashMap<(String, ContextLevel), ContextCacheEntry>>>,
    state: Arc<Mutex<MockState>>,
}

impl MockContextCacheRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }

    mock_instrumentation!();
}

#[async_trait]
impl ContextCacheRepository for MockContextCacheRepository {
    async fn get(&self, context_id: &str, level: ContextLevel) -> Result<Option<ContextCacheEntry>> {
        self.state.lock().enter(format!("get({context_id}, {level})"))?;
        Ok(self.entries.lock().get(&(context_id.to_string(), level)).cloned())
    }

    async fn put(&self, entry: &ContextCacheEntry) -> Result<()> {
        self.state.lock().enter(format!("put({}, {})", entry.context_id, entry.level))?;
        self.entries
            .lock()
            .insert((entry.context_id.clone(), entry.level), entry.clone());
        Ok(())
    }

    async fn record_hit(&self, context_id: &str, level: ContextLevel) -> Result<()> {
        self.state.lock().enter(format!("record_hit({context_id}, {level})"))?;
        if let Some(entry) = self.entries.lock().get_mut(&(context_id.to_string(), level)) {
            entry.record_hit();
        }
        Ok(())
    }

    async fn invalidate(&self, context_id: &str, level: ContextLevel, reason: &str) -> Result<()> {
        self.state.lock().enter(format!("invalidate({context_id}, {level})"))?;
        if let Some(entry) = self.entries.lock().get_mut(&(context_id.to_string(), level)) {
            entry.invalidate(reason);
        }
        Ok(())
    }
}

/// Mock implementation of [`DelegationRepository`].
#[derive(Default)]
pub struct MockDelegationRepository {
    delegations: Arc<Mutex<HashMap<String, ContextDelegation>>>,
    state: Arc<Mutex<MockState>>,
}

impl MockDelegationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    mock_instrumentation!();
}

#[async_trait]
impl DelegationRepository for MockDelegationRepository {
    async fn save(&self, delegation: &ContextDelegation) -> Result<()> {
        self.state.lock().enter(format!("save({})", delegation.id))?;
        self.delegations.lock().insert(delegation.id.clone(), delegation.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ContextDelegation>> {
        self.state.lock().enter(format!("find_by_id({id})"))?;
        Ok(self.delegations.lock().get(id).cloned())
    }

    async fn list_unprocessed(&self) -> Result<Vec<ContextDelegation>> {
        self.state.lock().enter("list_unprocessed()".to_string())?;
        let mut pending: Vec<ContextDelegation> = self
            .delegations
            .lock()
            .values()
            .filter(|d| !d.processed)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }
}
