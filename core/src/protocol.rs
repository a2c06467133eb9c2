//! Facade traits and parameter types for the RPC surface.
//!
//! The transport delivers authenticated, structured arguments; these types
//! are the contract between that edge and the engines. One trait per
//! aggregate: manage_task, manage_subtask, manage_project, manage_agent,
//! manage_context.

use crate::context::{ContextDelegation, ContextLevel};
use crate::error::Result;
use crate::models::{Priority, Project, Subtask, Task, TaskStatus, WorkSession};
use crate::scoring::NextTaskRecommendation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters for creating a task. `assignees` must be non-empty and is
/// validated strictly against the role registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskParams {
    pub git_branch_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub assignees: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub estimated_effort: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskParams {
    pub task_id: String,
    /// When true the response includes the resolved inherited context
    #[serde(default)]
    pub include_context: bool,
}

/// Partial update; only provided fields change. Status-only and
/// priority-only updates do not clear the task's context pointer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTaskParams {
    pub task_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub estimated_effort: Option<String>,
    #[serde(default)]
    pub assignees: Option<Vec<String>>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    /// `Some(None)` clears the due date
    #[serde(default, with = "double_option")]
    pub due_date: Option<Option<String>>,
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub completion_summary: Option<String>,
    #[serde(default)]
    pub testing_notes: Option<String>,
}

/// Serde helper distinguishing "absent" from "present but null".
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(
        value: &Option<Option<T>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<T>>, D::Error> {
        Ok(Some(Option::<T>::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTaskParams {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskParams {
    pub task_id: String,
    pub completion_summary: String,
    #[serde(default)]
    pub testing_notes: Option<String>,
    #[serde(default)]
    pub context_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListTasksParams {
    #[serde(default)]
    pub git_branch_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextTaskParams {
    pub git_branch_id: String,
}

/// Task payload with the optionally-resolved inherited context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithContext {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_context: Option<Value>,
}

/// Unified manage_task surface.
#[async_trait]
pub trait TaskProtocol: Send + Sync {
    async fn create_task(&self, params: CreateTaskParams) -> Result<Task>;
    async fn get_task(&self, params: GetTaskParams) -> Result<TaskWithContext>;
    async fn update_task(&self, params: UpdateTaskParams) -> Result<Task>;
    async fn delete_task(&self, params: DeleteTaskParams) -> Result<()>;
    async fn complete_task(&self, params: CompleteTaskParams) -> Result<Task>;
    async fn list_tasks(&self, params: ListTasksParams) -> Result<Vec<Task>>;
    async fn next_task(&self, params: NextTaskParams) -> Result<Option<NextTaskRecommendation>>;
}

/// Inline subtask fields; `subtask_id` may ride inside this object instead
/// of at the top level (compatibility shim, part of the contract).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SubtaskData {
    #[serde(default)]
    pub subtask_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assignees: Option<Vec<String>>,
    #[serde(default)]
    pub progress_percentage: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubtaskParams {
    pub task_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateSubtaskParams {
    pub task_id: String,
    #[serde(default)]
    pub subtask_id: Option<String>,
    #[serde(default)]
    pub subtask_data: Option<SubtaskData>,
}

impl UpdateSubtaskParams {
    /// The shim: `subtask_id` is accepted at the top level or inside
    /// `subtask_data`.
    pub fn resolve_subtask_id(&self) -> Option<&str> {
        self.subtask_id
            .as_deref()
            .or_else(|| self.subtask_data.as_ref().and_then(|d| d.subtask_id.as_deref()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SubtaskRefParams {
    pub task_id: String,
    #[serde(default)]
    pub subtask_id: Option<String>,
    #[serde(default)]
    pub subtask_data: Option<SubtaskData>,
}

impl SubtaskRefParams {
    pub fn resolve_subtask_id(&self) -> Option<&str> {
        self.subtask_id
            .as_deref()
            .or_else(|| self.subtask_data.as_ref().and_then(|d| d.subtask_id.as_deref()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSubtasksParams {
    pub task_id: String,
}

/// manage_subtask surface, scoped to a parent task id.
#[async_trait]
pub trait SubtaskProtocol: Send + Sync {
    async fn create_subtask(&self, params: CreateSubtaskParams) -> Result<Subtask>;
    async fn update_subtask(&self, params: UpdateSubtaskParams) -> Result<Subtask>;
    async fn delete_subtask(&self, params: SubtaskRefParams) -> Result<()>;
    async fn get_subtask(&self, params: SubtaskRefParams) -> Result<Subtask>;
    async fn list_subtasks(&self, params: ListSubtasksParams) -> Result<Vec<Subtask>>;
    async fn complete_subtask(&self, params: SubtaskRefParams) -> Result<Subtask>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectParams {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRefParams {
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateProjectParams {
    pub project_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteProjectParams {
    pub project_id: String,
    /// Bypasses the deletion safety rule but still cascades
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBranchParams {
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Health-check verdict for one project aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectHealthReport {
    pub project_id: String,
    pub healthy: bool,
    pub issues: Vec<String>,
    pub orchestration_status: Value,
}

/// manage_project surface.
#[async_trait]
pub trait ProjectProtocol: Send + Sync {
    async fn create_project(&self, params: CreateProjectParams) -> Result<Project>;
    async fn get_project(&self, params: ProjectRefParams) -> Result<Project>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn update_project(&self, params: UpdateProjectParams) -> Result<Project>;
    async fn delete_project(&self, params: DeleteProjectParams) -> Result<()>;
    async fn create_branch(&self, params: CreateBranchParams) -> Result<Project>;
    async fn health_check_project(&self, params: ProjectRefParams) -> Result<ProjectHealthReport>;
    /// Remove terminal sessions and dangling assignments
    async fn cleanup_obsolete(&self, params: ProjectRefParams) -> Result<Project>;
    /// Verify aggregate invariants; returns found issues
    async fn validate_integrity(&self, params: ProjectRefParams) -> Result<Vec<String>>;
    /// Run the workload balancer; proposals only
    async fn rebalance_agents(&self, params: ProjectRefParams) -> Result<Value>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentParams {
    pub project_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub preferred_languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRefParams {
    pub project_id: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignAgentParams {
    pub project_id: String,
    pub agent_id: String,
    pub git_branch_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateAgentParams {
    pub project_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub preferred_languages: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionParams {
    pub project_id: String,
    pub agent_id: String,
    pub task_id: String,
    #[serde(default)]
    pub max_duration_seconds: Option<i64>,
}

/// manage_agent surface.
#[async_trait]
pub trait AgentProtocol: Send + Sync {
    async fn register_agent(&self, params: RegisterAgentParams) -> Result<crate::models::Agent>;
    async fn unregister_agent(&self, params: AgentRefParams) -> Result<()>;
    async fn assign_agent(&self, params: AssignAgentParams) -> Result<()>;
    async fn unassign_agent(&self, params: AssignAgentParams) -> Result<()>;
    async fn get_agent(&self, params: AgentRefParams) -> Result<crate::models::Agent>;
    async fn list_agents(&self, params: ProjectRefParams) -> Result<Vec<crate::models::Agent>>;
    async fn update_agent(&self, params: UpdateAgentParams) -> Result<crate::models::Agent>;
    async fn rebalance_agents(&self, params: ProjectRefParams) -> Result<Value>;
    async fn start_work_session(&self, params: StartSessionParams) -> Result<WorkSession>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveContextParams {
    pub level: ContextLevel,
    pub context_id: String,
    #[serde(default = "default_true")]
    pub include_inherited: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddContextProgressParams {
    pub level: ContextLevel,
    pub context_id: String,
    pub content: String,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSectionParams {
    pub level: ContextLevel,
    pub context_id: String,
    pub section: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateContextParams {
    pub source_level: ContextLevel,
    pub source_id: String,
    pub target_level: ContextLevel,
    pub target_id: String,
    pub data: Value,
    #[serde(default)]
    pub reason: String,
    pub trigger_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateContextParams {
    pub level: ContextLevel,
    pub context_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// manage_context surface.
#[async_trait]
pub trait ContextProtocol: Send + Sync {
    async fn resolve_context(&self, params: ResolveContextParams) -> Result<Value>;
    async fn add_progress(&self, params: AddContextProgressParams) -> Result<Value>;
    async fn update_section(&self, params: UpdateSectionParams) -> Result<Value>;
    async fn delegate_context(&self, params: DelegateContextParams) -> Result<ContextDelegation>;
    async fn invalidate_context(&self, params: InvalidateContextParams) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtask_id_shim() {
        let top_level = UpdateSubtaskParams {
            task_id: "t1".into(),
            subtask_id: Some("s1".into()),
            subtask_data: None,
        };
        assert_eq!(top_level.resolve_subtask_id(), Some("s1"));

        let nested = UpdateSubtaskParams {
            task_id: "t1".into(),
            subtask_id: None,
            subtask_data: Some(SubtaskData { subtask_id: Some("s2".into()), ..Default::default() }),
        };
        assert_eq!(nested.resolve_subtask_id(), Some("s2"));

        // top level wins when both are given
        let both = UpdateSubtaskParams {
            task_id: "t1".into(),
            subtask_id: Some("s1".into()),
            subtask_data: Some(SubtaskData { subtask_id: Some("s2".into()), ..Default::default() }),
        };
        assert_eq!(both.resolve_subtask_id(), Some("s1"));

        let neither = UpdateSubtaskParams { task_id: "t1".into(), ..Default::default() };
        assert_eq!(neither.resolve_subtask_id(), None);
    }

    #[test]
    fn test_update_task_due_date_double_option() {
        // absent
        let params: UpdateTaskParams =
            serde_json::from_str(r#"{"task_id": "t1"}"#).unwrap();
        assert!(params.due_date.is_none());

        // present but null -> clear
        let params: UpdateTaskParams =
            serde_json::from_str(r#"{"task_id": "t1", "due_date": null}"#).unwrap();
        assert_eq!(params.due_date, Some(None));

        // present with value
        let params: UpdateTaskParams =
            serde_json::from_str(r#"{"task_id": "t1", "due_date": "2026-06-01"}"#).unwrap();
        assert_eq!(params.due_date, Some(Some("2026-06-01".to_string())));
    }

    #[test]
    fn test_resolve_context_defaults_inherited() {
        let params: ResolveContextParams =
            serde_json::from_str(r#"{"level": "task", "context_id": "c1"}"#).unwrap();
        assert!(params.include_inherited);
        assert_eq!(params.level, ContextLevel::Task);
    }
}
