use crate::models::status::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Capabilities an agent can advertise. Branch requirements are detected
/// from task text and matched against these.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentCapability {
    FrontendDevelopment,
    BackendDevelopment,
    Devops,
    Testing,
    Documentation,
    Architecture,
    SecurityAuditing,
}

impl AgentCapability {
    pub fn parse(value: &str) -> Option<AgentCapability> {
        match value.trim().to_lowercase().as_str() {
            "frontend_development" | "frontend" => Some(AgentCapability::FrontendDevelopment),
            "backend_development" | "backend" => Some(AgentCapability::BackendDevelopment),
            "devops" => Some(AgentCapability::Devops),
            "testing" => Some(AgentCapability::Testing),
            "documentation" => Some(AgentCapability::Documentation),
            "architecture" => Some(AgentCapability::Architecture),
            "security_auditing" | "security" => Some(AgentCapability::SecurityAuditing),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentCapability::FrontendDevelopment => "frontend_development",
            AgentCapability::BackendDevelopment => "backend_development",
            AgentCapability::Devops => "devops",
            AgentCapability::Testing => "testing",
            AgentCapability::Documentation => "documentation",
            AgentCapability::Architecture => "architecture",
            AgentCapability::SecurityAuditing => "security_auditing",
        }
    }
}

/// Agent availability.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Available,
    Busy,
    Offline,
}

/// An autonomous agent registered on a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub capabilities: BTreeSet<AgentCapability>,
    pub preferred_languages: Vec<String>,
    pub status: AgentStatus,
    /// Task ids the agent is actively working on
    pub active_tasks: BTreeSet<String>,
    /// Priority level this agent prefers to pick up
    pub priority_preference: Option<Priority>,
    /// Maximum concurrent tasks before the agent counts as fully loaded
    pub max_concurrent_tasks: u32,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: String, name: String, capabilities: BTreeSet<AgentCapability>) -> Agent {
        let now = Utc::now();
        Agent {
            id,
            name,
            capabilities,
            preferred_languages: Vec::new(),
            status: AgentStatus::Available,
            active_tasks: BTreeSet::new(),
            priority_preference: None,
            max_concurrent_tasks: 3,
            registered_at: now,
            updated_at: now,
        }
    }

    pub fn has_capability(&self, capability: AgentCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// An agent is available for assignment when it is not offline.
    pub fn is_available(&self) -> bool {
        self.status != AgentStatus::Offline
    }

    /// Current workload as a percentage of the agent's capacity, 0-100.
    pub fn workload_percentage(&self) -> f64 {
        if self.max_concurrent_tasks == 0 {
            return 100.0;
        }
        let load = self.active_tasks.len() as f64 / self.max_concurrent_tasks as f64 * 100.0;
        load.min(100.0)
    }

    /// Record that the agent started working on a task.
    pub fn start_task(&mut self, task_id: &str) {
        self.active_tasks.insert(task_id.to_string());
        if self.active_tasks.len() as u32 >= self.max_concurrent_tasks {
            self.status = AgentStatus::Busy;
        }
        self.updated_at = Utc::now();
    }

    /// Record that the agent stopped working on a task (completion, cancel,
    /// or timeout).
    pub fn complete_task(&mut self, task_id: &str) {
        self.active_tasks.remove(task_id);
        if self.status == AgentStatus::Busy
            && (self.active_tasks.len() as u32) < self.max_concurrent_tasks
        {
            self.status = AgentStatus::Available;
        }
        self.updated_at = Utc::now();
    }

    pub fn go_offline(&mut self) {
        self.status = AgentStatus::Offline;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> Agent {
        Agent::new(
            crate::id::new_id(),
            "worker-1".to_string(),
            [AgentCapability::BackendDevelopment].into_iter().collect(),
        )
    }

    #[test]
    fn test_availability() {
        let mut a = agent();
        assert!(a.is_available());
        a.status = AgentStatus::Busy;
        assert!(a.is_available());
        a.go_offline();
        assert!(!a.is_available());
    }

    #[test]
    fn test_workload_tracking() {
        let mut a = agent();
        assert_eq!(a.workload_percentage(), 0.0);

        a.start_task("t1");
        a.start_task("t2");
        assert!((a.workload_percentage() - 66.66).abs() < 1.0);
        assert_eq!(a.status, AgentStatus::Available);

        a.start_task("t3");
        assert_eq!(a.workload_percentage(), 100.0);
        assert_eq!(a.status, AgentStatus::Busy);

        a.complete_task("t3");
        assert_eq!(a.status, AgentStatus::Available);
        assert!(!a.active_tasks.contains("t3"));
    }

    #[test]
    fn test_capability_check() {
        let a = agent();
        assert!(a.has_capability(AgentCapability::BackendDevelopment));
        assert!(!a.has_capability(AgentCapability::FrontendDevelopment));
    }
}
