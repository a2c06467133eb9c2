use async_trait::async_trait;
use hive_core::error::{DomainError, Result};
use hive_core::models::{Project, SessionStatus};
use hive_core::orchestration::Orchestrator;
use hive_core::protocol::{
    CreateBranchParams, CreateProjectParams, DeleteProjectParams, ProjectHealthReport,
    ProjectProtocol, ProjectRefParams, UpdateProjectParams,
};
use hive_core::repository::{ProjectRepository, Scope};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Facade for the manage_project surface.
pub struct ProjectFacade<P> {
    projects: Arc<P>,
    orchestrator: Orchestrator,
    scope: Scope,
}

impl<P: ProjectRepository> ProjectFacade<P> {
    pub fn new(projects: Arc<P>, scope: Scope) -> Self {
        Self { projects, orchestrator: Orchestrator::default(), scope }
    }

    async fn load(&self, project_id: &str) -> Result<Project> {
        self.projects
            .find_by_id(project_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Project", project_id))
    }
}

#[async_trait]
impl<P: ProjectRepository> ProjectProtocol for ProjectFacade<P> {
    async fn create_project(&self, params: CreateProjectParams) -> Result<Project> {
        self.scope.require_user()?;
        let project = Project::create(&params.name, &params.description)?;
        self.projects.save(&project).await?;
        info!(project_id = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    async fn get_project(&self, params: ProjectRefParams) -> Result<Project> {
        self.load(&params.project_id).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.projects.list().await
    }

    async fn update_project(&self, params: UpdateProjectParams) -> Result<Project> {
        self.scope.require_user()?;
        let mut project = self.load(&params.project_id).await?;

        if let Some(name) = params.name {
            if name.trim().is_empty() {
                return Err(DomainError::empty_field("name"));
            }
            project.name = name;
        }
        if let Some(description) = params.description {
            project.description = description;
        }
        project.updated_at = chrono::Utc::now();

        self.projects.save(&project).await?;
        Ok(project)
    }

    /// Deletion honours the safety rule: zero branches, or exactly one
    /// empty branch named `main`. `force` bypasses the check; the cascade
    /// over branches and tasks happens either way.
    async fn delete_project(&self, params: DeleteProjectParams) -> Result<()> {
        self.scope.require_user()?;
        let project = self.load(&params.project_id).await?;

        if !params.force && !project.can_be_deleted() {
            return Err(DomainError::Conflict(format!(
                "project {} still holds branches with tasks; pass force to delete anyway",
                project.id
            )));
        }

        self.projects.delete(&project.id).await?;
        info!(project_id = %project.id, force = params.force, "project deleted");
        Ok(())
    }

    async fn create_branch(&self, params: CreateBranchParams) -> Result<Project> {
        self.scope.require_user()?;
        let mut project = self.load(&params.project_id).await?;
        project.create_branch(&params.name, &params.description)?;
        self.projects.save(&project).await?;
        Ok(project)
    }

    async fn health_check_project(&self, params: ProjectRefParams) -> Result<ProjectHealthReport> {
        self.projects.health_check().await?;
        let project = self.load(&params.project_id).await?;

        let issues = aggregate_issues(&project);
        Ok(ProjectHealthReport {
            project_id: project.id.clone(),
            healthy: issues.is_empty(),
            issues,
            orchestration_status: project.orchestration_status(),
        })
    }

    /// Sweep timed-out sessions and drop assignments pointing at
    /// unregistered agents.
    async fn cleanup_obsolete(&self, params: ProjectRefParams) -> Result<Project> {
        self.scope.require_user()?;
        let mut project = self.load(&params.project_id).await?;

        let swept = project.sweep_timed_out_sessions();
        for session in &swept {
            self.projects.save_session(&project.id, session).await?;
        }

        let dangling: Vec<String> = project
            .assignments
            .iter()
            .filter(|(_, agent_id)| !project.agents.contains_key(*agent_id))
            .map(|(branch_id, _)| branch_id.clone())
            .collect();
        for branch_id in &dangling {
            project.unassign_agent_from_branch(branch_id)?;
        }

        if !swept.is_empty() || !dangling.is_empty() {
            info!(
                project_id = %project.id,
                sessions_swept = swept.len(),
                assignments_dropped = dangling.len(),
                "cleanup pass"
            );
        }

        self.projects.save(&project).await?;
        Ok(project)
    }

    /// Verify aggregate invariants; returns the violations found.
    async fn validate_integrity(&self, params: ProjectRefParams) -> Result<Vec<String>> {
        let project = self.load(&params.project_id).await?;
        Ok(aggregate_issues(&project))
    }

    async fn rebalance_agents(&self, params: ProjectRefParams) -> Result<Value> {
        let project = self.load(&params.project_id).await?;
        let report = self.orchestrator.balance_workload(&project);
        Ok(json!(report))
    }
}

/// Aggregate invariants checked by health-check and validate-integrity.
fn aggregate_issues(project: &Project) -> Vec<String> {
    let mut issues = Vec::new();

    // Every assignment references a registered agent
    for (branch_id, agent_id) in &project.assignments {
        if !project.agents.contains_key(agent_id) {
            issues.push(format!(
                "assignment of branch {branch_id} references unregistered agent {agent_id}"
            ));
        }
        if !project.branches.contains_key(branch_id) {
            issues.push(format!("assignment references unknown branch {branch_id}"));
        }
    }

    // Branch names are unique within the project
    let mut names: Vec<&str> = project.branches.values().map(|b| b.name.as_str()).collect();
    names.sort_unstable();
    for window in names.windows(2) {
        if window[0] == window[1] {
            issues.push(format!("duplicate branch name '{}'", window[0]));
        }
    }

    // Cross-tree dependencies connect different branches
    for (dependent, prerequisites) in &project.cross_tree_dependencies {
        let dependent_branch = project.find_branch_of_task(dependent).map(|b| b.id.clone());
        for prerequisite in prerequisites {
            let prerequisite_branch =
                project.find_branch_of_task(prerequisite).map(|b| b.id.clone());
            if dependent_branch.is_some() && dependent_branch == prerequisite_branch {
                issues.push(format!(
                    "cross-tree dependency {dependent} -> {prerequisite} stays within one branch"
                ));
            }
        }
    }

    // Active sessions reference registered agents and live locks
    for session in project.active_sessions.values() {
        if session.status == SessionStatus::Active
            && !project.agents.contains_key(&session.agent_id)
        {
            issues.push(format!(
                "session {} references unregistered agent {}",
                session.id, session.agent_id
            ));
        }
    }

    issues
}
