//! Line-delimited JSON dispatch over stdin/stdout.
//!
//! Each request line is `{"method": "<surface>.<action>", "params": {...}}`;
//! each response line is the standard envelope. The heavier RPC framing
//! lives outside this process; this loop is the minimal transport the
//! server ships with.

use hive_core::error::{DomainError, Result as DomainResult};
use hive_core::protocol::*;
use hive_protocol::response::McpResponse;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Request {
    method: String,
    #[serde(default)]
    params: Value,
}

/// The five facade surfaces the dispatcher routes to.
pub struct Facades {
    pub tasks: Arc<dyn TaskProtocol>,
    pub subtasks: Arc<dyn SubtaskProtocol>,
    pub projects: Arc<dyn ProjectProtocol>,
    pub agents: Arc<dyn AgentProtocol>,
    pub contexts: Arc<dyn ContextProtocol>,
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> DomainResult<T> {
    serde_json::from_value(params)
        .map_err(|e| DomainError::Validation(format!("invalid parameters: {e}")))
}

fn to_value<T: serde::Serialize>(result: DomainResult<T>) -> Value {
    match result {
        Ok(data) => json!(McpResponse::ok(json!(data))),
        Err(error) => json!(McpResponse::<Value>::err(&error)),
    }
}

/// Route one request to its facade.
pub async fn dispatch(facades: &Facades, method: &str, params: Value) -> Value {
    debug!(%method, "dispatching request");
    match method {
        "manage_task.create" => match parse_params::<CreateTaskParams>(params) {
            Ok(p) => to_value(facades.tasks.create_task(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_task.get" => match parse_params::<GetTaskParams>(params) {
            Ok(p) => to_value(facades.tasks.get_task(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_task.update" => match parse_params::<UpdateTaskParams>(params) {
            Ok(p) => to_value(facades.tasks.update_task(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_task.delete" => match parse_params::<DeleteTaskParams>(params) {
            Ok(p) => to_value(facades.tasks.delete_task(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_task.complete" => match parse_params::<CompleteTaskParams>(params) {
            Ok(p) => to_value(facades.tasks.complete_task(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_task.list" => match parse_params::<ListTasksParams>(params) {
            Ok(p) => to_value(facades.tasks.list_tasks(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_task.next" => match parse_params::<NextTaskParams>(params) {
            Ok(p) => to_value(facades.tasks.next_task(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },

        "manage_subtask.create" => match parse_params::<CreateSubtaskParams>(params) {
            Ok(p) => to_value(facades.subtasks.create_subtask(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_subtask.update" => match parse_params::<UpdateSubtaskParams>(params) {
            Ok(p) => to_value(facades.subtasks.update_subtask(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_subtask.delete" => match parse_params::<SubtaskRefParams>(params) {
            Ok(p) => to_value(facades.subtasks.delete_subtask(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_subtask.get" => match parse_params::<SubtaskRefParams>(params) {
            Ok(p) => to_value(facades.subtasks.get_subtask(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_subtask.list" => match parse_params::<ListSubtasksParams>(params) {
            Ok(p) => to_value(facades.subtasks.list_subtasks(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_subtask.complete" => match parse_params::<SubtaskRefParams>(params) {
            Ok(p) => to_value(facades.subtasks.complete_subtask(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },

        "manage_project.create" => match parse_params::<CreateProjectParams>(params) {
            Ok(p) => to_value(facades.projects.create_project(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_project.get" => match parse_params::<ProjectRefParams>(params) {
            Ok(p) => to_value(facades.projects.get_project(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_project.list" => to_value(facades.projects.list_projects().await),
        "manage_project.update" => match parse_params::<UpdateProjectParams>(params) {
            Ok(p) => to_value(facades.projects.update_project(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_project.delete" => match parse_params::<DeleteProjectParams>(params) {
            Ok(p) => to_value(facades.projects.delete_project(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_project.create_branch" => match parse_params::<CreateBranchParams>(params) {
            Ok(p) => to_value(facades.projects.create_branch(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_project.health_check" => match parse_params::<ProjectRefParams>(params) {
            Ok(p) => to_value(facades.projects.health_check_project(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_project.cleanup_obsolete" => match parse_params::<ProjectRefParams>(params) {
            Ok(p) => to_value(facades.projects.cleanup_obsolete(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_project.validate_integrity" => match parse_params::<ProjectRefParams>(params) {
            Ok(p) => to_value(facades.projects.validate_integrity(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_project.rebalance_agents" => match parse_params::<ProjectRefParams>(params) {
            Ok(p) => to_value(facades.projects.rebalance_agents(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },

        "manage_agent.register" => match parse_params::<RegisterAgentParams>(params) {
            Ok(p) => to_value(facades.agents.register_agent(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_agent.unregister" => match parse_params::<AgentRefParams>(params) {
            Ok(p) => to_value(facades.agents.unregister_agent(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_agent.assign" => match parse_params::<AssignAgentParams>(params) {
            Ok(p) => to_value(facades.agents.assign_agent(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_agent.unassign" => match parse_params::<AssignAgentParams>(params) {
            Ok(p) => to_value(facades.agents.unassign_agent(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_agent.get" => match parse_params::<AgentRefParams>(params) {
            Ok(p) => to_value(facades.agents.get_agent(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_agent.list" => match parse_params::<ProjectRefParams>(params) {
            Ok(p) => to_value(facades.agents.list_agents(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_agent.update" => match parse_params::<UpdateAgentParams>(params) {
            Ok(p) => to_value(facades.agents.update_agent(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_agent.rebalance" => match parse_params::<ProjectRefParams>(params) {
            Ok(p) => to_value(facades.agents.rebalance_agents(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_agent.start_session" => match parse_params::<StartSessionParams>(params) {
            Ok(p) => to_value(facades.agents.start_work_session(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },

        "manage_context.resolve" => match parse_params::<ResolveContextParams>(params) {
            Ok(p) => to_value(facades.contexts.resolve_context(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_context.add_progress" => match parse_params::<AddContextProgressParams>(params) {
            Ok(p) => to_value(facades.contexts.add_progress(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_context.update_section" => match parse_params::<UpdateSectionParams>(params) {
            Ok(p) => to_value(facades.contexts.update_section(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_context.delegate" => match parse_params::<DelegateContextParams>(params) {
            Ok(p) => to_value(facades.contexts.delegate_context(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },
        "manage_context.invalidate" => match parse_params::<InvalidateContextParams>(params) {
            Ok(p) => to_value(facades.contexts.invalidate_context(p).await),
            Err(e) => to_value::<Value>(Err(e)),
        },

        other => to_value::<Value>(Err(DomainError::Validation(format!(
            "unknown method '{other}'"
        )))),
    }
}

/// Serve JSON lines from stdin until EOF.
pub async fn serve(facades: Facades) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => dispatch(&facades, &request.method, request.params).await,
            Err(error) => {
                warn!(%error, "malformed request line");
                json!(McpResponse::<Value>::err(&DomainError::Validation(format!(
                    "malformed request: {error}"
                ))))
            }
        };

        let mut framed = serde_json::to_vec(&response)?;
        framed.push(b'\n');
        stdout.write_all(&framed).await?;
        stdout.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::repository::Scope;
    use hive_mocks::{
        MockContextCacheRepository, MockContextRepository, MockDelegationRepository,
        MockProjectRepository, MockSubtaskRepository, MockTaskRepository,
    };
    use hive_protocol::{
        AgentFacade, ContextFacade, ContextService, ProjectFacade, SubtaskFacade, TaskFacade,
    };

    fn facades() -> Facades {
        let tasks = Arc::new(MockTaskRepository::new());
        let subtasks = Arc::new(MockSubtaskRepository::new());
        let projects = Arc::new(MockProjectRepository::new());
        let contexts = Arc::new(MockContextRepository::new());
        let cache = Arc::new(MockContextCacheRepository::new());
        let delegations = Arc::new(MockDelegationRepository::new());
        let scope = Scope::user("u1");
        let context_service = Arc::new(ContextService::new(
            contexts,
            cache,
            delegations,
            scope.clone(),
            300,
        ));

        Facades {
            tasks: Arc::new(TaskFacade::new(
                tasks.clone(),
                subtasks.clone(),
                context_service.clone(),
                scope.clone(),
            )),
            subtasks: Arc::new(SubtaskFacade::new(tasks, subtasks, scope.clone())),
            projects: Arc::new(ProjectFacade::new(projects.clone(), scope.clone())),
            agents: Arc::new(AgentFacade::new(projects, scope)),
            contexts: Arc::new(ContextFacade::new(context_service)),
        }
    }

    #[tokio::test]
    async fn test_dispatch_round_trip() {
        let facades = facades();

        let created = dispatch(
            &facades,
            "manage_project.create",
            json!({"name": "Alpha", "description": ""}),
        )
        .await;
        assert_eq!(created["success"], true);
        let project_id = created["data"]["id"].as_str().unwrap().to_string();

        let fetched =
            dispatch(&facades, "manage_project.get", json!({"project_id": project_id})).await;
        assert_eq!(fetched["success"], true);
        assert_eq!(fetched["data"]["name"], "Alpha");
    }

    #[tokio::test]
    async fn test_dispatch_shapes_errors() {
        let facades = facades();

        let response = dispatch(
            &facades,
            "manage_task.get",
            json!({"task_id": hive_core::id::new_id()}),
        )
        .await;
        assert_eq!(response["success"], false);
        assert_eq!(response["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let facades = facades();
        let response = dispatch(&facades, "manage_time.travel", json!({})).await;
        assert_eq!(response["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_params() {
        let facades = facades();
        let response = dispatch(&facades, "manage_task.create", json!({"title": 42})).await;
        assert_eq!(response["success"], false);
        assert_eq!(response["error"]["code"], "VALIDATION_ERROR");
    }
}
