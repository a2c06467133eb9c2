//! Orchestration: branch assignment strategy, conflict handling, timeout
//! sweep and workload balancing over a project aggregate.

use crate::models::agent::{Agent, AgentCapability};
use crate::models::branch::GitBranch;
use crate::models::project::Project;
use crate::models::session::WorkSession;
use crate::models::task::Task;
use crate::scoring;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Requirements detected from a branch's task text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchRequirements {
    pub capabilities: BTreeSet<AgentCapability>,
    pub languages: BTreeSet<String>,
}

/// Keyword detection over task titles and descriptions.
pub fn detect_requirements(text: &str) -> BranchRequirements {
    let text = text.to_lowercase();
    let mut requirements = BranchRequirements::default();

    let mentions = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    if mentions(&["frontend", "ui", "react", "vue", "angular"]) {
        requirements.capabilities.insert(AgentCapability::FrontendDevelopment);
        for lang in ["javascript", "typescript", "html", "css"] {
            requirements.languages.insert(lang.to_string());
        }
    }
    if mentions(&["backend", "api", "server", "database"]) {
        requirements.capabilities.insert(AgentCapability::BackendDevelopment);
        for lang in ["rust", "python", "java"] {
            requirements.languages.insert(lang.to_string());
        }
    }
    if mentions(&["deploy", "docker", "kubernetes", "ci/cd", "ci"]) {
        requirements.capabilities.insert(AgentCapability::Devops);
    }
    if mentions(&["test", "testing", "qa", "quality"]) {
        requirements.capabilities.insert(AgentCapability::Testing);
    }

    requirements
}

/// Strategy deciding which agent works each unassigned branch.
pub trait OrchestrationStrategy: Send + Sync {
    /// Propose `branch_id -> agent_id` assignments for unassigned branches.
    fn assign_work(&self, project: &Project, available_agents: &[&Agent]) -> BTreeMap<String, String>;
}

/// Default strategy: score each available agent against the branch's
/// detected requirements.
///
/// score = 50 + 30·capability_match + 10·language_match + 10·(1 − workload)
///
/// The branch goes to the highest positive scorer; ties break on lower
/// workload.
#[derive(Debug, Default, Clone)]
pub struct CapabilityBasedStrategy;

impl CapabilityBasedStrategy {
    fn agent_branch_score(agent: &Agent, requirements: &BranchRequirements) -> f64 {
        let base_score = 50.0;

        let capability_match = requirements
            .capabilities
            .iter()
            .filter(|c| agent.has_capability(**c))
            .count() as f64;
        let capability_score =
            capability_match / (requirements.capabilities.len().max(1) as f64) * 30.0;

        let language_match = requirements
            .languages
            .iter()
            .filter(|l| agent.preferred_languages.iter().any(|p| p == *l))
            .count() as f64;
        let language_score = language_match / (requirements.languages.len().max(1) as f64) * 10.0;

        let workload_score = (1.0 - agent.workload_percentage() / 100.0) * 10.0;

        base_score + capability_score + language_score + workload_score
    }

    fn best_agent_for_branch<'a>(
        &self,
        branch: &GitBranch,
        agents: &[&'a Agent],
    ) -> Option<&'a Agent> {
        let available: Vec<&Agent> = agents.iter().copied().filter(|a| a.is_available()).collect();
        if available.is_empty() {
            return None;
        }

        let requirements = detect_requirements(&branch.requirements_text());
        let mut scored: Vec<(&Agent, f64)> = available
            .into_iter()
            .map(|agent| (agent, Self::agent_branch_score(agent, &requirements)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.0.workload_percentage()
                        .partial_cmp(&b.0.workload_percentage())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        scored.first().filter(|(_, score)| *score > 0.0).map(|(agent, _)| *agent)
    }
}

impl OrchestrationStrategy for CapabilityBasedStrategy {
    fn assign_work(&self, project: &Project, available_agents: &[&Agent]) -> BTreeMap<String, String> {
        let mut assignments = BTreeMap::new();

        for (branch_id, branch) in &project.branches {
            if project.assignments.contains_key(branch_id) {
                continue;
            }
            if let Some(agent) = self.best_agent_for_branch(branch, available_agents) {
                assignments.insert(branch_id.clone(), agent.id.clone());
            }
        }

        assignments
    }
}

/// A detected resource conflict between two sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConflict {
    pub resource: String,
    /// Session ids in acquisition order: older first
    pub conflicting_sessions: Vec<String>,
}

/// A proposed task reassignment from the workload balancer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReassignmentProposal {
    pub from_agent: String,
    pub to_agent: String,
    pub task_id: String,
    pub branch_id: String,
}

/// Workload analysis report. Proposals are advisory: the balancer never
/// performs the reassignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkloadReport {
    pub overloaded_agents: Vec<String>,
    pub underloaded_agents: Vec<String>,
    pub average_workload: f64,
    pub workload_distribution: Vec<(String, f64)>,
    pub rebalancing_recommendations: Vec<ReassignmentProposal>,
}

/// Domain service orchestrating multi-agent work on a project.
pub struct Orchestrator {
    strategy: Box<dyn OrchestrationStrategy>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(Box::new(CapabilityBasedStrategy))
    }
}

impl Orchestrator {
    pub fn new(strategy: Box<dyn OrchestrationStrategy>) -> Orchestrator {
        Orchestrator { strategy }
    }

    /// One orchestration pass: sweep timed-out sessions, resolve resource
    /// conflicts, assign unassigned branches, and recommend the next task
    /// per available agent. Returns a timestamped summary.
    pub fn orchestrate(&self, project: &mut Project) -> Value {
        info!(project_id = %project.id, "starting orchestration pass");

        let swept = self.handle_timeouts(project);

        let conflicts = self.detect_conflicts(project);
        let conflicts_detected = conflicts.len();
        self.resolve_conflicts(project, &conflicts);

        let available_agents: Vec<Agent> =
            project.agents.values().filter(|a| a.is_available()).cloned().collect();
        let agent_refs: Vec<&Agent> = available_agents.iter().collect();

        let new_assignments = self.strategy.assign_work(project, &agent_refs);
        for (branch_id, agent_id) in &new_assignments {
            if let Err(error) = project.assign_agent_to_branch(agent_id, branch_id) {
                warn!(%branch_id, %agent_id, %error, "strategy assignment rejected");
            } else {
                info!(%branch_id, %agent_id, "assigned branch to agent");
            }
        }

        let mut recommendations = BTreeMap::new();
        for agent_id in project.agents.keys().cloned().collect::<Vec<_>>() {
            if !project.agents.get(&agent_id).map(|a| a.is_available()).unwrap_or(false) {
                continue;
            }
            if let Ok(tasks) = project.get_available_work_for_agent(&agent_id) {
                let deps = scoring::dependency_counts(&tasks);
                if let Some(rec) = scoring::recommend_next_task(&tasks, |id| {
                    deps.get(id).copied().unwrap_or_default()
                }) {
                    recommendations.insert(agent_id, rec.task_id);
                }
            }
        }

        json!({
            "orchestration_timestamp": Utc::now().to_rfc3339(),
            "project_id": project.id,
            "new_assignments": new_assignments,
            "agent_recommendations": recommendations,
            "conflicts_detected": conflicts_detected,
            "conflicts_resolved": conflicts_detected,
            "sessions_timed_out": swept.len(),
            "active_sessions": project.active_sessions.len(),
            "available_agents": project.agents.values().filter(|a| a.is_available()).count(),
        })
    }

    /// Sweep sessions past their max duration. Idempotent.
    pub fn handle_timeouts(&self, project: &mut Project) -> Vec<WorkSession> {
        let swept = project.sweep_timed_out_sessions();
        for session in &swept {
            warn!(session_id = %session.id, agent_id = %session.agent_id, "session timed out");
        }
        swept
    }

    /// Two sessions holding the same resource key constitute a conflict.
    pub fn detect_conflicts(&self, project: &Project) -> Vec<ResourceConflict> {
        let mut conflicts = Vec::new();
        let mut holders: BTreeMap<&str, &WorkSession> = BTreeMap::new();

        let mut sessions: Vec<&WorkSession> = project.active_sessions.values().collect();
        sessions.sort_by_key(|s| s.started_at);

        for session in sessions {
            for resource in &session.resources_locked {
                match holders.get(resource.as_str()) {
                    Some(holder) => conflicts.push(ResourceConflict {
                        resource: resource.clone(),
                        conflicting_sessions: vec![holder.id.clone(), session.id.clone()],
                    }),
                    None => {
                        holders.insert(resource, session);
                    }
                }
            }
        }

        conflicts
    }

    /// Resolution policy: the older session releases the resource, the
    /// newer keeps it.
    pub fn resolve_conflicts(&self, project: &mut Project, conflicts: &[ResourceConflict]) {
        for conflict in conflicts {
            let Some(older_id) = conflict.conflicting_sessions.first() else {
                continue;
            };
            if let Some(older) = project.active_sessions.get_mut(older_id) {
                older.unlock_resource(&conflict.resource);
                info!(resource = %conflict.resource, session = %older_id, "resolved resource conflict");
            }
            if let Some(newer_id) = conflict.conflicting_sessions.get(1) {
                if let Some(newer) = project.active_sessions.get(newer_id) {
                    project.resource_locks.insert(conflict.resource.clone(), newer.agent_id.clone());
                }
            }
        }
    }

    /// Analyse agent workloads. Agents above 80% are overloaded, below 50%
    /// underloaded. Proposes reassignments of overloaded agents' active
    /// tasks to underloaded agents whose capabilities match. Proposal only.
    pub fn balance_workload(&self, project: &Project) -> WorkloadReport {
        let mut workloads: Vec<(String, f64)> = project
            .agents
            .values()
            .map(|a| (a.id.clone(), a.workload_percentage()))
            .collect();
        workloads.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let overloaded: Vec<String> =
            workloads.iter().filter(|(_, w)| *w > 80.0).map(|(id, _)| id.clone()).collect();
        let underloaded: Vec<String> =
            workloads.iter().filter(|(_, w)| *w < 50.0).map(|(id, _)| id.clone()).collect();

        let average = if workloads.is_empty() {
            0.0
        } else {
            workloads.iter().map(|(_, w)| w).sum::<f64>() / workloads.len() as f64
        };

        let mut proposals = Vec::new();
        for overloaded_id in &overloaded {
            let Some(agent) = project.agents.get(overloaded_id) else {
                continue;
            };
            for task_id in &agent.active_tasks {
                let Some(branch) = project.find_branch_of_task(task_id) else {
                    continue;
                };
                let Some(task) = branch.get_task(task_id) else {
                    continue;
                };
                for underloaded_id in &underloaded {
                    let Some(candidate) = project.agents.get(underloaded_id) else {
                        continue;
                    };
                    if can_agent_handle_task(candidate, task) {
                        proposals.push(ReassignmentProposal {
                            from_agent: overloaded_id.clone(),
                            to_agent: underloaded_id.clone(),
                            task_id: task_id.clone(),
                            branch_id: branch.id.clone(),
                        });
                        break;
                    }
                }
            }
        }

        WorkloadReport {
            overloaded_agents: overloaded,
            underloaded_agents: underloaded,
            average_workload: average,
            workload_distribution: workloads,
            rebalancing_recommendations: proposals,
        }
    }
}

/// Keyword-driven check whether an agent can take over a task.
pub fn can_agent_handle_task(agent: &Agent, task: &Task) -> bool {
    let requirements = detect_requirements(&format!("{} {}", task.title, task.description));
    if requirements.capabilities.is_empty() {
        return true;
    }
    requirements.capabilities.iter().any(|c| agent.has_capability(*c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::new_id;
    use crate::models::status::Priority;

    fn agent_with(id: &str, caps: &[AgentCapability]) -> Agent {
        Agent::new(id.to_string(), id.to_string(), caps.iter().copied().collect())
    }

    fn project_with_branch(branch_name: &str, task_title: &str) -> (Project, String, String) {
        let mut project = Project::create("Alpha", "").unwrap();
        let branch_id = project.create_branch(branch_name, "").unwrap().id.clone();
        let task = Task::create(
            new_id(),
            branch_id.clone(),
            task_title.to_string(),
            task_title.to_string(),
            Priority::Medium,
            vec!["@coding-agent".to_string()],
        )
        .unwrap();
        let task_id = task.id.clone();
        project.branches.get_mut(&branch_id).unwrap().add_task(task);
        (project, branch_id, task_id)
    }

    #[test]
    fn test_keyword_detection() {
        let reqs = detect_requirements("Build the backend API server");
        assert!(reqs.capabilities.contains(&AgentCapability::BackendDevelopment));

        let reqs = detect_requirements("React UI for the dashboard");
        assert!(reqs.capabilities.contains(&AgentCapability::FrontendDevelopment));
        assert!(reqs.languages.contains("typescript"));

        let reqs = detect_requirements("Deploy with docker and kubernetes");
        assert!(reqs.capabilities.contains(&AgentCapability::Devops));

        let reqs = detect_requirements("QA the release");
        assert!(reqs.capabilities.contains(&AgentCapability::Testing));

        assert!(detect_requirements("write a poem").capabilities.is_empty());
    }

    #[test]
    fn test_strategy_assigns_matching_agent() {
        let (mut project, branch_id, _) = project_with_branch("api", "Build backend API");
        let backend = agent_with("backend", &[AgentCapability::BackendDevelopment]);
        let frontend = agent_with("frontend", &[AgentCapability::FrontendDevelopment]);
        project.register_agent(backend.clone());
        project.register_agent(frontend.clone());

        let strategy = CapabilityBasedStrategy;
        let refs: Vec<&Agent> = project.agents.values().collect();
        let assignments = strategy.assign_work(&project, &refs);
        assert_eq!(assignments.get(&branch_id).map(String::as_str), Some("backend"));
    }

    #[test]
    fn test_strategy_skips_assigned_branches_and_offline_agents() {
        let (mut project, branch_id, _) = project_with_branch("api", "Build backend API");
        let mut backend = agent_with("backend", &[AgentCapability::BackendDevelopment]);
        backend.go_offline();
        project.register_agent(backend);

        let strategy = CapabilityBasedStrategy;
        let refs: Vec<&Agent> = project.agents.values().collect();
        assert!(strategy.assign_work(&project, &refs).is_empty());

        // already-assigned branches are skipped
        let online = agent_with("online", &[AgentCapability::BackendDevelopment]);
        project.register_agent(online);
        project.assign_agent_to_branch("online", &branch_id).unwrap();
        let refs: Vec<&Agent> = project.agents.values().collect();
        assert!(strategy.assign_work(&project, &refs).is_empty());
    }

    #[test]
    fn test_tie_breaks_on_lower_workload() {
        let (project, _, _) = project_with_branch("api", "Build backend API");
        let mut busy = agent_with("busy", &[AgentCapability::BackendDevelopment]);
        busy.start_task("other-task");
        let idle = agent_with("idle", &[AgentCapability::BackendDevelopment]);

        let strategy = CapabilityBasedStrategy;
        let agents = vec![&busy, &idle];
        let best = strategy.best_agent_for_branch(
            project.branches.values().next().unwrap(),
            &agents,
        );
        assert_eq!(best.map(|a| a.id.as_str()), Some("idle"));
    }

    #[test]
    fn test_conflict_detection_and_resolution() {
        let (mut project, branch_id, task_id) = project_with_branch("api", "Build backend API");
        project.register_agent(agent_with("a1", &[AgentCapability::BackendDevelopment]));
        project.assign_agent_to_branch("a1", &branch_id).unwrap();

        let first = project.start_work_session("a1", &task_id, None).unwrap().id.clone();
        project.lock_resource(&first, "db:users").unwrap();

        // A second session by the same agent grabbing the same key
        let second = project.start_work_session("a1", &task_id, None).unwrap().id.clone();
        project.active_sessions.get_mut(&second).unwrap().lock_resource("db:users");

        let orchestrator = Orchestrator::default();
        let conflicts = orchestrator.detect_conflicts(&project);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].resource, "db:users");
        // older session listed first
        assert_eq!(conflicts[0].conflicting_sessions[0], first);

        orchestrator.resolve_conflicts(&mut project, &conflicts);
        let older = project.active_sessions.get(&first).unwrap();
        let newer = project.active_sessions.get(&second).unwrap();
        assert!(!older.resources_locked.contains(&"db:users".to_string()));
        assert!(newer.resources_locked.contains(&"db:users".to_string()));
    }

    #[test]
    fn test_workload_report_thresholds() {
        let mut project = Project::create("Alpha", "").unwrap();
        let mut overloaded = agent_with("overloaded", &[AgentCapability::BackendDevelopment]);
        overloaded.start_task("t1");
        overloaded.start_task("t2");
        overloaded.start_task("t3"); // 100%
        let underloaded = agent_with("underloaded", &[AgentCapability::BackendDevelopment]);
        project.register_agent(overloaded);
        project.register_agent(underloaded);

        let report = Orchestrator::default().balance_workload(&project);
        assert_eq!(report.overloaded_agents, vec!["overloaded"]);
        assert_eq!(report.underloaded_agents, vec!["underloaded"]);
        assert!(report.average_workload > 0.0);
    }

    #[test]
    fn test_balance_proposes_capable_reassignments() {
        let (mut project, branch_id, task_id) = project_with_branch("api", "Build backend API");
        let mut overloaded = agent_with("overloaded", &[AgentCapability::BackendDevelopment]);
        overloaded.max_concurrent_tasks = 1;
        project.register_agent(overloaded);
        project.assign_agent_to_branch("overloaded", &branch_id).unwrap();
        project.start_work_session("overloaded", &task_id, None).unwrap();

        let capable = agent_with("capable", &[AgentCapability::BackendDevelopment]);
        let incapable = agent_with("incapable", &[AgentCapability::FrontendDevelopment]);
        project.register_agent(capable);
        project.register_agent(incapable);

        let report = Orchestrator::default().balance_workload(&project);
        assert_eq!(report.rebalancing_recommendations.len(), 1);
        let proposal = &report.rebalancing_recommendations[0];
        assert_eq!(proposal.from_agent, "overloaded");
        assert_eq!(proposal.to_agent, "capable");
        assert_eq!(proposal.task_id, task_id);

        // proposal only: nothing changed on the aggregate
        assert_eq!(project.assignments.get(&branch_id).map(String::as_str), Some("overloaded"));
    }

    #[test]
    fn test_orchestrate_pass_summary() {
        let (mut project, _, _) = project_with_branch("api", "Build backend API");
        project.register_agent(agent_with("a1", &[AgentCapability::BackendDevelopment]));

        let summary = Orchestrator::default().orchestrate(&mut project);
        assert_eq!(summary["project_id"], project.id);
        assert_eq!(summary["conflicts_detected"], 0);
        // the one branch got assigned
        assert_eq!(summary["new_assignments"].as_object().unwrap().len(), 1);
        // and the agent received a recommendation for the branch's task
        assert_eq!(summary["agent_recommendations"].as_object().unwrap().len(), 1);
    }
}
