use crate::error::{DomainError, Result};
use crate::id::{new_id, normalize_id};
use crate::models::agent::Agent;
use crate::models::branch::GitBranch;
use crate::models::session::WorkSession;
use crate::models::task::Task;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

/// Report produced by [`Project::coordinate_cross_tree_dependencies`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CoordinationReport {
    pub total_dependencies: usize,
    pub validated_dependencies: usize,
    pub blocked_tasks: Vec<String>,
    pub ready_tasks: Vec<String>,
    pub missing_prerequisites: Vec<MissingPrerequisite>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissingPrerequisite {
    pub task_id: String,
    pub issue: String,
}

/// Project aggregate root for multi-agent orchestration.
///
/// Owns branches (task trees), the agent registry, agent-to-branch
/// assignments, the cross-tree dependency graph, active work sessions and
/// advisory resource locks. The aggregate is loaded, mutated and persisted
/// as one consistency boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub metadata: BTreeMap<String, Value>,
    /// branch_id -> branch
    pub branches: BTreeMap<String, GitBranch>,
    /// agent_id -> agent
    pub agents: BTreeMap<String, Agent>,
    /// branch_id -> agent_id; at most one agent per branch
    pub assignments: BTreeMap<String, String>,
    /// dependent task id -> prerequisite task ids (cross-tree only)
    pub cross_tree_dependencies: BTreeMap<String, BTreeSet<String>>,
    /// session_id -> active session
    pub active_sessions: BTreeMap<String, WorkSession>,
    /// resource key -> agent id holding the lock
    pub resource_locks: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn create(name: &str, description: &str) -> Result<Project> {
        if name.trim().is_empty() {
            return Err(DomainError::empty_field("name"));
        }
        let now = Utc::now();
        Ok(Project {
            id: new_id(),
            name: name.to_string(),
            description: description.to_string(),
            status: ProjectStatus::Active,
            metadata: BTreeMap::new(),
            branches: BTreeMap::new(),
            agents: BTreeMap::new(),
            assignments: BTreeMap::new(),
            cross_tree_dependencies: BTreeMap::new(),
            active_sessions: BTreeMap::new(),
            resource_locks: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Create a branch. Branch names are unique within the project.
    pub fn create_branch(&mut self, name: &str, description: &str) -> Result<&GitBranch> {
        if name.trim().is_empty() {
            return Err(DomainError::empty_field("name"));
        }
        if self.branches.values().any(|b| b.name == name) {
            return Err(DomainError::Duplicate(format!(
                "branch '{name}' already exists in project {}",
                self.id
            )));
        }

        let branch =
            GitBranch::new(new_id(), self.id.clone(), name.to_string(), description.to_string());
        let branch_id = branch.id.clone();
        self.branches.insert(branch_id.clone(), branch);
        self.touch();
        Ok(self.branches.get(&branch_id).expect("just inserted"))
    }

    /// Add an already-built branch (e.g. rehydrated from the repository).
    pub fn add_branch(&mut self, branch: GitBranch) {
        if let Some(agent_id) = branch.assigned_agent_id.clone() {
            self.assignments.insert(branch.id.clone(), agent_id);
        }
        self.branches.insert(branch.id.clone(), branch);
        self.touch();
    }

    pub fn get_branch(&self, branch_id: &str) -> Option<&GitBranch> {
        self.branches.get(branch_id)
    }

    pub fn get_branch_by_name(&self, name: &str) -> Option<&GitBranch> {
        self.branches.values().find(|b| b.name == name)
    }

    /// Register an agent. Idempotent on id: an existing registration is
    /// replaced.
    pub fn register_agent(&mut self, agent: Agent) {
        self.agents.insert(agent.id.clone(), agent);
        self.touch();
    }

    /// Remove an agent registration and its branch assignments.
    pub fn unregister_agent(&mut self, agent_id: &str) -> Result<Agent> {
        let agent = self
            .agents
            .remove(agent_id)
            .ok_or_else(|| DomainError::not_found("Agent", agent_id))?;
        let assigned: Vec<String> = self
            .assignments
            .iter()
            .filter(|(_, a)| a.as_str() == agent_id)
            .map(|(b, _)| b.clone())
            .collect();
        for branch_id in assigned {
            self.assignments.remove(&branch_id);
            if let Some(branch) = self.branches.get_mut(&branch_id) {
                branch.assigned_agent_id = None;
            }
        }
        self.touch();
        Ok(agent)
    }

    /// Assign an agent to a branch. A branch holds at most one agent;
    /// reassigning the same agent is a no-op.
    pub fn assign_agent_to_branch(&mut self, agent_id: &str, branch_id: &str) -> Result<()> {
        if !self.agents.contains_key(agent_id) {
            return Err(DomainError::not_found("Agent", agent_id));
        }
        if !self.branches.contains_key(branch_id) {
            return Err(DomainError::not_found("Branch", branch_id));
        }

        if let Some(current) = self.assignments.get(branch_id) {
            if current != agent_id {
                return Err(DomainError::Conflict(format!(
                    "branch {branch_id} is already assigned to agent {current}"
                )));
            }
            return Ok(());
        }

        self.assignments.insert(branch_id.to_string(), agent_id.to_string());
        if let Some(branch) = self.branches.get_mut(branch_id) {
            branch.assigned_agent_id = Some(agent_id.to_string());
        }
        self.touch();
        Ok(())
    }

    pub fn unassign_agent_from_branch(&mut self, branch_id: &str) -> Result<()> {
        if !self.branches.contains_key(branch_id) {
            return Err(DomainError::not_found("Branch", branch_id));
        }
        self.assignments.remove(branch_id);
        if let Some(branch) = self.branches.get_mut(branch_id) {
            branch.assigned_agent_id = None;
        }
        self.touch();
        Ok(())
    }

    /// Find the branch owning a task.
    pub fn find_branch_of_task(&self, task_id: &str) -> Option<&GitBranch> {
        let normalized = normalize_id(task_id).ok()?;
        self.branches.values().find(|b| b.has_task(&normalized))
    }

    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        let normalized = normalize_id(task_id).ok()?;
        self.branches.values().find_map(|b| b.get_task(&normalized))
    }

    /// Declare that `dependent_task_id` requires `prerequisite_task_id`,
    /// where the two tasks live in different branches. Same-tree
    /// dependencies belong on the task itself.
    pub fn add_cross_tree_dependency(
        &mut self,
        dependent_task_id: &str,
        prerequisite_task_id: &str,
    ) -> Result<()> {
        let dependent = normalize_id(dependent_task_id)?;
        let prerequisite = normalize_id(prerequisite_task_id)?;

        let dependent_branch = self
            .find_branch_of_task(&dependent)
            .ok_or_else(|| DomainError::not_found("Task", &*dependent))?
            .id
            .clone();
        let prerequisite_branch = self
            .find_branch_of_task(&prerequisite)
            .ok_or_else(|| DomainError::not_found("Task", &*prerequisite))?
            .id
            .clone();

        if dependent_branch == prerequisite_branch {
            return Err(DomainError::Validation(
                "use regular task dependencies for tasks within the same tree".to_string(),
            ));
        }

        self.cross_tree_dependencies.entry(dependent).or_default().insert(prerequisite);
        self.touch();
        Ok(())
    }

    /// A task is ready for work when every cross-tree prerequisite has
    /// status done. Missing prerequisites block the task.
    pub fn is_task_ready_for_work(&self, task_id: &str) -> bool {
        let Ok(normalized) = normalize_id(task_id) else {
            return false;
        };
        let Some(prerequisites) = self.cross_tree_dependencies.get(&normalized) else {
            return true;
        };

        prerequisites.iter().all(|prerequisite| {
            self.find_task(prerequisite).map(|t| t.status.is_done()).unwrap_or(false)
        })
    }

    /// Tasks an agent can pick up now: todo tasks on the agent's assigned
    /// branches whose cross-tree prerequisites are all done.
    pub fn get_available_work_for_agent(&self, agent_id: &str) -> Result<Vec<&Task>> {
        if !self.agents.contains_key(agent_id) {
            return Err(DomainError::not_found("Agent", agent_id));
        }

        let assigned_branches: Vec<&GitBranch> = self
            .assignments
            .iter()
            .filter(|(_, a)| a.as_str() == agent_id)
            .filter_map(|(branch_id, _)| self.branches.get(branch_id))
            .collect();

        let mut available = Vec::new();
        for branch in assigned_branches {
            for task in branch.available_tasks() {
                if self.is_task_ready_for_work(&task.id) {
                    available.push(task);
                }
            }
        }
        Ok(available)
    }

    /// Start a work session for an agent on a task it is entitled to work
    /// on. Fails with NotFound when the task is not in this project and
    /// Forbidden when the task's branch is assigned to a different agent.
    pub fn start_work_session(
        &mut self,
        agent_id: &str,
        task_id: &str,
        max_duration: Option<Duration>,
    ) -> Result<&WorkSession> {
        if !self.agents.contains_key(agent_id) {
            return Err(DomainError::not_found("Agent", agent_id));
        }
        let task_id = normalize_id(task_id)?;
        let branch_id = self
            .find_branch_of_task(&task_id)
            .ok_or_else(|| DomainError::not_found("Task", &*task_id))?
            .id
            .clone();

        match self.assignments.get(&branch_id) {
            Some(assigned) if assigned == agent_id => {}
            _ => {
                return Err(DomainError::Forbidden(format!(
                    "agent {agent_id} is not assigned to branch {branch_id}"
                )))
            }
        }

        let session = WorkSession::create(agent_id, &task_id, &branch_id, max_duration)?;
        let session_id = session.id.clone();
        self.active_sessions.insert(session_id.clone(), session);
        if let Some(agent) = self.agents.get_mut(agent_id) {
            agent.start_task(&task_id);
        }
        self.touch();
        Ok(self.active_sessions.get(&session_id).expect("just inserted"))
    }

    /// Acquire an advisory resource lock for a session. The lock map and the
    /// session's own lock list move together.
    pub fn lock_resource(&mut self, session_id: &str, resource_key: &str) -> Result<()> {
        let session = self
            .active_sessions
            .get_mut(session_id)
            .ok_or_else(|| DomainError::not_found("WorkSession", session_id))?;

        if let Some(holder) = self.resource_locks.get(resource_key) {
            if holder != &session.agent_id {
                return Err(DomainError::Conflict(format!(
                    "resource '{resource_key}' is locked by agent {holder}"
                )));
            }
        }

        self.resource_locks.insert(resource_key.to_string(), session.agent_id.clone());
        session.lock_resource(resource_key);
        self.touch();
        Ok(())
    }

    /// Release every lock a session holds, atomically with the session's
    /// own bookkeeping.
    pub fn release_session_locks(&mut self, session_id: &str) {
        if let Some(session) = self.active_sessions.get_mut(session_id) {
            for resource in session.resources_locked.clone() {
                self.resource_locks.remove(&resource);
            }
            session.unlock_all_resources();
        }
    }

    /// Complete or cancel a session: terminal transition, lock release,
    /// agent bookkeeping, removal from the active map.
    pub fn end_work_session(
        &mut self,
        session_id: &str,
        success: bool,
        notes: &str,
    ) -> Result<WorkSession> {
        if !self.active_sessions.contains_key(session_id) {
            return Err(DomainError::not_found("WorkSession", session_id));
        }
        self.release_session_locks(session_id);

        let mut session = self.active_sessions.remove(session_id).expect("checked above");
        if success {
            session.complete(true, notes)?;
        } else {
            session.cancel(notes)?;
        }
        if let Some(agent) = self.agents.get_mut(&session.agent_id) {
            agent.complete_task(&session.task_id);
        }
        self.touch();
        Ok(session)
    }

    /// Time out every overdue session: terminal transition, lock release,
    /// agent bookkeeping. Idempotent; returns the swept sessions.
    pub fn sweep_timed_out_sessions(&mut self) -> Vec<WorkSession> {
        let due: Vec<String> = self
            .active_sessions
            .values()
            .filter(|s| !s.status.is_terminal() && s.is_timeout_due())
            .map(|s| s.id.clone())
            .collect();

        let mut swept = Vec::new();
        for session_id in due {
            self.release_session_locks(&session_id);
            if let Some(mut session) = self.active_sessions.remove(&session_id) {
                session.timeout();
                if let Some(agent) = self.agents.get_mut(&session.agent_id) {
                    agent.complete_task(&session.task_id);
                }
                swept.push(session);
            }
        }
        if !swept.is_empty() {
            self.touch();
        }
        swept
    }

    /// Deletion safety rule: a project may be deleted only when it has zero
    /// branches, or exactly one branch named `main` that owns zero tasks.
    pub fn can_be_deleted(&self) -> bool {
        match self.branches.len() {
            0 => true,
            1 => {
                let branch = self.branches.values().next().expect("len checked");
                branch.name == "main" && branch.tasks.is_empty()
            }
            _ => false,
        }
    }

    /// Validate and classify the cross-tree dependency graph.
    pub fn coordinate_cross_tree_dependencies(&self) -> CoordinationReport {
        let mut report = CoordinationReport {
            total_dependencies: self.cross_tree_dependencies.values().map(|d| d.len()).sum(),
            ..Default::default()
        };

        for (dependent, prerequisites) in &self.cross_tree_dependencies {
            if self.find_branch_of_task(dependent).is_none() {
                report.missing_prerequisites.push(MissingPrerequisite {
                    task_id: dependent.clone(),
                    issue: "Dependent task not found".to_string(),
                });
                continue;
            }

            let mut all_met = true;
            for prerequisite in prerequisites {
                match self.find_task(prerequisite) {
                    None => {
                        report.missing_prerequisites.push(MissingPrerequisite {
                            task_id: prerequisite.clone(),
                            issue: "Prerequisite task not found".to_string(),
                        });
                        all_met = false;
                    }
                    Some(task) if !task.status.is_done() => all_met = false,
                    Some(_) => {}
                }
            }

            if all_met {
                report.ready_tasks.push(dependent.clone());
            } else {
                report.blocked_tasks.push(dependent.clone());
            }
            report.validated_dependencies += 1;
        }

        report
    }

    /// Dashboard projection of the whole aggregate.
    pub fn orchestration_status(&self) -> Value {
        json!({
            "project_id": self.id,
            "project_name": self.name,
            "total_branches": self.branches.len(),
            "registered_agents": self.agents.len(),
            "active_assignments": self.assignments.len(),
            "active_sessions": self.active_sessions.len(),
            "cross_tree_dependencies": self.cross_tree_dependencies.values().map(|d| d.len()).sum::<usize>(),
            "resource_locks": self.resource_locks.len(),
            "branches": self.branches.values().map(|branch| {
                (branch.id.clone(), json!({
                    "name": branch.name,
                    "assigned_agent": self.assignments.get(&branch.id),
                    "total_tasks": branch.task_count,
                    "completed_tasks": branch.completed_task_count,
                    "progress": branch.progress_percentage(),
                }))
            }).collect::<BTreeMap<_, _>>(),
            "agents": self.agents.values().map(|agent| {
                (agent.id.clone(), json!({
                    "name": agent.name,
                    "capabilities": agent.capabilities.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                    "assigned_branches": self.assignments.iter()
                        .filter(|(_, a)| a.as_str() == agent.id)
                        .map(|(b, _)| b.clone())
                        .collect::<Vec<_>>(),
                    "active_sessions": self.active_sessions.values()
                        .filter(|s| s.agent_id == agent.id)
                        .map(|s| s.id.clone())
                        .collect::<Vec<_>>(),
                }))
            }).collect::<BTreeMap<_, _>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::agent::AgentCapability;
    use crate::models::status::{Priority, TaskStatus};

    fn project() -> Project {
        Project::create("Alpha", "demo project").unwrap()
    }

    fn agent(id: &str) -> Agent {
        Agent::new(
            id.to_string(),
            id.to_string(),
            [AgentCapability::BackendDevelopment].into_iter().collect(),
        )
    }

    fn task_in(branch: &mut GitBranch, title: &str) -> String {
        let task = Task::create(
            new_id(),
            branch.id.clone(),
            title.to_string(),
            "work".to_string(),
            Priority::Medium,
            vec!["@coding-agent".to_string()],
        )
        .unwrap();
        let id = task.id.clone();
        branch.add_task(task);
        id
    }

    #[test]
    fn test_create_requires_name() {
        assert!(Project::create("", "x").is_err());
        assert!(Project::create("   ", "x").is_err());
    }

    #[test]
    fn test_branch_name_unique_within_project() {
        let mut p = project();
        p.create_branch("main", "").unwrap();
        let err = p.create_branch("main", "").unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn test_register_agent_idempotent() {
        let mut p = project();
        p.register_agent(agent("a1"));
        let before = p.agents.len();
        p.register_agent(agent("a1"));
        assert_eq!(p.agents.len(), before);
    }

    #[test]
    fn test_assignment_rules() {
        let mut p = project();
        let branch_id = p.create_branch("main", "").unwrap().id.clone();
        p.register_agent(agent("a1"));
        p.register_agent(agent("a2"));

        assert!(matches!(
            p.assign_agent_to_branch("ghost", &branch_id),
            Err(DomainError::NotFound(_, _))
        ));
        assert!(matches!(
            p.assign_agent_to_branch("a1", "ghost-branch"),
            Err(DomainError::NotFound(_, _))
        ));

        p.assign_agent_to_branch("a1", &branch_id).unwrap();
        // same agent again is fine
        p.assign_agent_to_branch("a1", &branch_id).unwrap();
        // different agent conflicts
        assert!(matches!(
            p.assign_agent_to_branch("a2", &branch_id),
            Err(DomainError::Conflict(_))
        ));
        assert_eq!(
            p.branches.get(&branch_id).unwrap().assigned_agent_id.as_deref(),
            Some("a1")
        );
    }

    #[test]
    fn test_cross_tree_dependency_rules() {
        let mut p = project();
        let b1 = p.create_branch("b1", "").unwrap().id.clone();
        let b2 = p.create_branch("b2", "").unwrap().id.clone();

        let t1 = {
            let branch = p.branches.get_mut(&b1).unwrap();
            task_in(branch, "T1")
        };
        let t2 = {
            let branch = p.branches.get_mut(&b2).unwrap();
            task_in(branch, "T2")
        };
        let t1b = {
            let branch = p.branches.get_mut(&b1).unwrap();
            task_in(branch, "T1b")
        };

        // same tree -> validation error
        let err = p.add_cross_tree_dependency(&t1, &t1b).unwrap_err();
        assert!(err.is_validation());

        // unknown task -> not found
        assert!(p.add_cross_tree_dependency(&t2, &new_id()).is_err());

        // cross tree works, and hex input is normalised
        let hex = t1.replace('-', "");
        p.add_cross_tree_dependency(&t2, &hex).unwrap();
        assert!(p.cross_tree_dependencies.get(&t2).unwrap().contains(&t1));
    }

    #[test]
    fn test_available_work_respects_cross_tree_dependencies() {
        let mut p = project();
        let b1 = p.create_branch("b1", "").unwrap().id.clone();
        let b2 = p.create_branch("b2", "").unwrap().id.clone();
        let t1 = {
            let branch = p.branches.get_mut(&b1).unwrap();
            task_in(branch, "T1")
        };
        let t2 = {
            let branch = p.branches.get_mut(&b2).unwrap();
            task_in(branch, "T2")
        };

        p.register_agent(agent("a2"));
        p.assign_agent_to_branch("a2", &b2).unwrap();
        p.add_cross_tree_dependency(&t2, &t1).unwrap();

        // prerequisite incomplete -> T2 not offered
        let work = p.get_available_work_for_agent("a2").unwrap();
        assert!(work.is_empty());

        // complete T1 -> T2 offered
        {
            let branch = p.branches.get_mut(&b1).unwrap();
            let task = branch.tasks.get_mut(&t1).unwrap();
            task.update_status(TaskStatus::InProgress).unwrap();
            task.complete("done", None, None, true).unwrap();
            branch.sync_counters();
        }
        let work = p.get_available_work_for_agent("a2").unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].id, t2);
    }

    #[test]
    fn test_start_session_authorization() {
        let mut p = project();
        let b1 = p.create_branch("b1", "").unwrap().id.clone();
        let t1 = {
            let branch = p.branches.get_mut(&b1).unwrap();
            task_in(branch, "T1")
        };
        p.register_agent(agent("a1"));
        p.register_agent(agent("a2"));
        p.assign_agent_to_branch("a1", &b1).unwrap();

        // unknown task
        assert!(p.start_work_session("a1", &new_id(), None).is_err());
        // wrong agent
        assert!(matches!(
            p.start_work_session("a2", &t1, None),
            Err(DomainError::Forbidden(_))
        ));

        let session_id = p.start_work_session("a1", &t1, None).unwrap().id.clone();
        assert!(p.active_sessions.contains_key(&session_id));
        assert!(p.agents.get("a1").unwrap().active_tasks.contains(&t1));
    }

    #[test]
    fn test_resource_locks_follow_sessions() {
        let mut p = project();
        let b1 = p.create_branch("b1", "").unwrap().id.clone();
        let t1 = {
            let branch = p.branches.get_mut(&b1).unwrap();
            task_in(branch, "T1")
        };
        p.register_agent(agent("a1"));
        p.assign_agent_to_branch("a1", &b1).unwrap();
        let session_id = p.start_work_session("a1", &t1, None).unwrap().id.clone();

        p.lock_resource(&session_id, "db:users").unwrap();
        assert_eq!(p.resource_locks.get("db:users").map(String::as_str), Some("a1"));

        let ended = p.end_work_session(&session_id, true, "").unwrap();
        assert_eq!(ended.status, crate::models::session::SessionStatus::Completed);
        assert!(p.resource_locks.is_empty());
        assert!(!p.agents.get("a1").unwrap().active_tasks.contains(&t1));
        assert!(p.active_sessions.is_empty());
    }

    #[test]
    fn test_sweep_times_out_overdue_sessions() {
        let mut p = project();
        let b1 = p.create_branch("b1", "").unwrap().id.clone();
        let t1 = {
            let branch = p.branches.get_mut(&b1).unwrap();
            task_in(branch, "T1")
        };
        p.register_agent(agent("a1"));
        p.assign_agent_to_branch("a1", &b1).unwrap();
        let session_id = p
            .start_work_session("a1", &t1, Some(Duration::seconds(1)))
            .unwrap()
            .id
            .clone();
        p.lock_resource(&session_id, "db:users").unwrap();

        // Backdate the session so it is overdue
        p.active_sessions.get_mut(&session_id).unwrap().started_at =
            Utc::now() - Duration::seconds(10);

        let swept = p.sweep_timed_out_sessions();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].status, crate::models::session::SessionStatus::Timeout);
        assert!(swept[0].ended_at.is_some());
        assert!(p.resource_locks.is_empty());
        assert!(!p.agents.get("a1").unwrap().active_tasks.contains(&t1));

        // idempotent
        assert!(p.sweep_timed_out_sessions().is_empty());
    }

    #[test]
    fn test_deletion_safety_rule() {
        let mut p = project();
        assert!(p.can_be_deleted());

        p.create_branch("main", "").unwrap();
        assert!(p.can_be_deleted());

        let main_id = p.get_branch_by_name("main").unwrap().id.clone();
        {
            let branch = p.branches.get_mut(&main_id).unwrap();
            task_in(branch, "T1");
        }
        assert!(!p.can_be_deleted());

        let mut p2 = project();
        p2.create_branch("feature", "").unwrap();
        assert!(!p2.can_be_deleted());

        let mut p3 = project();
        p3.create_branch("main", "").unwrap();
        p3.create_branch("dev", "").unwrap();
        assert!(!p3.can_be_deleted());
    }

    #[test]
    fn test_coordination_report() {
        let mut p = project();
        let b1 = p.create_branch("b1", "").unwrap().id.clone();
        let b2 = p.create_branch("b2", "").unwrap().id.clone();
        let t1 = {
            let branch = p.branches.get_mut(&b1).unwrap();
            task_in(branch, "T1")
        };
        let t2 = {
            let branch = p.branches.get_mut(&b2).unwrap();
            task_in(branch, "T2")
        };
        p.add_cross_tree_dependency(&t2, &t1).unwrap();

        let report = p.coordinate_cross_tree_dependencies();
        assert_eq!(report.total_dependencies, 1);
        assert_eq!(report.validated_dependencies, 1);
        assert_eq!(report.blocked_tasks, vec![t2.clone()]);

        {
            let branch = p.branches.get_mut(&b1).unwrap();
            let task = branch.tasks.get_mut(&t1).unwrap();
            task.update_status(TaskStatus::InProgress).unwrap();
            task.complete("done", None, None, true).unwrap();
        }
        let report = p.coordinate_cross_tree_dependencies();
        assert_eq!(report.ready_tasks, vec![t2]);
    }

    #[test]
    fn test_orchestration_status_shape() {
        let mut p = project();
        p.create_branch("main", "").unwrap();
        p.register_agent(agent("a1"));
        let status = p.orchestration_status();
        assert_eq!(status["total_branches"], 1);
        assert_eq!(status["registered_agents"], 1);
        assert_eq!(status["project_name"], "Alpha");
    }
}
