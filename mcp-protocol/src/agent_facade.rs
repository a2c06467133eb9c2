use async_trait::async_trait;
use chrono::Duration;
use hive_core::error::{DomainError, Result};
use hive_core::models::{Agent, AgentCapability, AgentStatus, Project, WorkSession};
use hive_core::orchestration::Orchestrator;
use hive_core::protocol::{
    AgentProtocol, AgentRefParams, AssignAgentParams, ProjectRefParams, RegisterAgentParams,
    StartSessionParams, UpdateAgentParams,
};
use hive_core::repository::{ProjectRepository, Scope};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Facade for the manage_agent surface. Agents live inside the project
/// aggregate; every operation loads the aggregate, mutates it and persists
/// it whole.
pub struct AgentFacade<P> {
    projects: Arc<P>,
    orchestrator: Orchestrator,
    scope: Scope,
}

impl<P: ProjectRepository> AgentFacade<P> {
    pub fn new(projects: Arc<P>, scope: Scope) -> Self {
        Self { projects, orchestrator: Orchestrator::default(), scope }
    }

    async fn load(&self, project_id: &str) -> Result<Project> {
        self.projects
            .find_by_id(project_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Project", project_id))
    }

    fn parse_capabilities(raw: &[String]) -> Result<BTreeSet<AgentCapability>> {
        raw.iter()
            .map(|value| {
                AgentCapability::parse(value).ok_or_else(|| {
                    DomainError::invalid_field("capabilities", &format!("unknown capability '{value}'"))
                })
            })
            .collect()
    }
}

#[async_trait]
impl<P: ProjectRepository> AgentProtocol for AgentFacade<P> {
    /// Register an agent on a project. Idempotent on id: registering the
    /// same id again replaces the existing registration.
    async fn register_agent(&self, params: RegisterAgentParams) -> Result<Agent> {
        self.scope.require_user()?;
        if params.name.trim().is_empty() {
            return Err(DomainError::empty_field("name"));
        }

        let mut project = self.load(&params.project_id).await?;
        let capabilities = Self::parse_capabilities(&params.capabilities)?;

        let agent_id = params.agent_id.unwrap_or_else(hive_core::id::new_id);
        let mut agent = Agent::new(agent_id.clone(), params.name, capabilities);
        agent.preferred_languages = params.preferred_languages;

        project.register_agent(agent.clone());
        self.projects.save(&project).await?;
        info!(project_id = %project.id, agent_id = %agent_id, "agent registered");
        Ok(agent)
    }

    async fn unregister_agent(&self, params: AgentRefParams) -> Result<()> {
        self.scope.require_user()?;
        let mut project = self.load(&params.project_id).await?;
        project.unregister_agent(&params.agent_id)?;
        self.projects.save(&project).await?;
        Ok(())
    }

    async fn assign_agent(&self, params: AssignAgentParams) -> Result<()> {
        self.scope.require_user()?;
        let mut project = self.load(&params.project_id).await?;
        project.assign_agent_to_branch(&params.agent_id, &params.git_branch_id)?;
        self.projects.save(&project).await?;
        Ok(())
    }

    async fn unassign_agent(&self, params: AssignAgentParams) -> Result<()> {
        self.scope.require_user()?;
        let mut project = self.load(&params.project_id).await?;
        project.unassign_agent_from_branch(&params.git_branch_id)?;
        self.projects.save(&project).await?;
        Ok(())
    }

    async fn get_agent(&self, params: AgentRefParams) -> Result<Agent> {
        let project = self.load(&params.project_id).await?;
        project
            .agents
            .get(&params.agent_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Agent", &params.agent_id))
    }

    async fn list_agents(&self, params: ProjectRefParams) -> Result<Vec<Agent>> {
        let project = self.load(&params.project_id).await?;
        Ok(project.agents.values().cloned().collect())
    }

    async fn update_agent(&self, params: UpdateAgentParams) -> Result<Agent> {
        self.scope.require_user()?;
        let mut project = self.load(&params.project_id).await?;
        let agent = project
            .agents
            .get_mut(&params.agent_id)
            .ok_or_else(|| DomainError::not_found("Agent", &params.agent_id))?;

        if let Some(name) = params.name {
            if name.trim().is_empty() {
                return Err(DomainError::empty_field("name"));
            }
            agent.name = name;
        }
        if let Some(capabilities) = params.capabilities {
            agent.capabilities = Self::parse_capabilities(&capabilities)?;
        }
        if let Some(languages) = params.preferred_languages {
            agent.preferred_languages = languages;
        }
        if let Some(status) = params.status {
            agent.status = match status.to_lowercase().as_str() {
                "available" => AgentStatus::Available,
                "busy" => AgentStatus::Busy,
                "offline" => AgentStatus::Offline,
                other => {
                    return Err(DomainError::invalid_field(
                        "status",
                        &format!("unknown agent status '{other}'"),
                    ))
                }
            };
        }
        agent.updated_at = chrono::Utc::now();

        let updated = agent.clone();
        self.projects.save(&project).await?;
        Ok(updated)
    }

    /// Run an orchestration pass: sweep timeouts, resolve conflicts, let
    /// the capability strategy assign unassigned branches, and compute
    /// per-agent recommendations.
    async fn rebalance_agents(&self, params: ProjectRefParams) -> Result<Value> {
        self.scope.require_user()?;
        let mut project = self.load(&params.project_id).await?;
        let summary = self.orchestrator.orchestrate(&mut project);
        let balance = self.orchestrator.balance_workload(&project);
        self.projects.save(&project).await?;
        Ok(json!({
            "orchestration": summary,
            "workload": balance,
        }))
    }

    async fn start_work_session(&self, params: StartSessionParams) -> Result<WorkSession> {
        self.scope.require_user()?;
        let mut project = self.load(&params.project_id).await?;
        let session = project
            .start_work_session(
                &params.agent_id,
                &params.task_id,
                params.max_duration_seconds.map(Duration::seconds),
            )?
            .clone();
        self.projects.save(&project).await?;
        Ok(session)
    }
}
