//! Canned aggregates for scenario tests.

use crate::builders::{ProjectBuilder, TaskBuilder};
use hive_core::models::{AgentCapability, Priority, Project, Task};

/// Ready-made test scenarios.
pub struct Fixtures;

impl Fixtures {
    /// A project with a `main` branch, one registered backend agent
    /// assigned to it, and one todo task on the branch. Returns the
    /// project, the branch id and the task id.
    pub fn single_branch_project() -> (Project, String, String) {
        let mut project = ProjectBuilder::new()
            .name("Alpha")
            .branch("main")
            .agent("agent-1", &[AgentCapability::BackendDevelopment])
            .build();

        let branch_id = project.get_branch_by_name("main").unwrap().id.clone();
        project.assign_agent_to_branch("agent-1", &branch_id).unwrap();

        let task = TaskBuilder::new()
            .branch(&branch_id)
            .title("Build API")
            .description("Build the backend API")
            .priority(Priority::High)
            .build();
        let task_id = task.id.clone();
        project.branches.get_mut(&branch_id).unwrap().add_task(task);

        (project, branch_id, task_id)
    }

    /// Two branches, one task each, with a cross-tree dependency:
    /// the task in the second branch requires the task in the first.
    /// Returns (project, prerequisite_task_id, dependent_task_id).
    pub fn cross_tree_project() -> (Project, String, String) {
        let mut project = ProjectBuilder::new()
            .name("Beta")
            .branch("b1")
            .branch("b2")
            .agent("agent-1", &[AgentCapability::BackendDevelopment])
            .agent("agent-2", &[AgentCapability::BackendDevelopment])
            .build();

        let b1 = project.get_branch_by_name("b1").unwrap().id.clone();
        let b2 = project.get_branch_by_name("b2").unwrap().id.clone();

        let t1 = TaskBuilder::new().branch(&b1).title("T1").build();
        let t2 = TaskBuilder::new().branch(&b2).title("T2").build();
        let (t1_id, t2_id) = (t1.id.clone(), t2.id.clone());

        project.branches.get_mut(&b1).unwrap().add_task(t1);
        project.branches.get_mut(&b2).unwrap().add_task(t2);
        project.assign_agent_to_branch("agent-1", &b1).unwrap();
        project.assign_agent_to_branch("agent-2", &b2).unwrap();
        project.add_cross_tree_dependency(&t2_id, &t1_id).unwrap();

        (project, t1_id, t2_id)
    }

    /// A spread of tasks across priorities for scoring tests.
    pub fn priority_spread(branch_id: &str) -> Vec<Task> {
        [Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
            .into_iter()
            .map(|priority| {
                TaskBuilder::new()
                    .branch(branch_id)
                    .title(&format!("{priority} work"))
                    .priority(priority)
                    .build()
            })
            .collect()
    }
}
