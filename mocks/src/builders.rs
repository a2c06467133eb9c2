//! Fluent builders for test entities.

use hive_core::id::new_id;
use hive_core::models::{
    Agent, AgentCapability, Priority, Project, Subtask, Task, TaskStatus,
};

/// Builder for [`Task`] test instances.
pub struct TaskBuilder {
    branch_id: String,
    title: String,
    description: String,
    priority: Priority,
    assignees: Vec<String>,
    status: Option<TaskStatus>,
    due_date: Option<String>,
    dependencies: Vec<String>,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            branch_id: new_id(),
            title: "Test task".to_string(),
            description: "A task used in tests".to_string(),
            priority: Priority::Medium,
            assignees: vec!["@coding-agent".to_string()],
            status: None,
            due_date: None,
            dependencies: Vec::new(),
        }
    }

    pub fn branch(mut self, branch_id: &str) -> Self {
        self.branch_id = branch_id.to_string();
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn assignees(mut self, assignees: &[&str]) -> Self {
        self.assignees = assignees.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn due(mut self, due_date: &str) -> Self {
        self.due_date = Some(due_date.to_string());
        self
    }

    pub fn depends_on(mut self, task_id: &str) -> Self {
        self.dependencies.push(task_id.to_string());
        self
    }

    pub fn build(self) -> Task {
        let mut task = Task::create(
            new_id(),
            self.branch_id,
            self.title,
            self.description,
            self.priority,
            self.assignees,
        )
        .expect("builder produces a valid task");

        if let Some(due) = self.due_date {
            task.update_due_date(Some(due)).expect("valid due date");
        }
        for dep in &self.dependencies {
            task.add_dependency(dep).expect("valid dependency");
        }
        if let Some(status) = self.status {
            match status {
                TaskStatus::Todo => {}
                TaskStatus::InProgress => task.update_status(TaskStatus::InProgress).unwrap(),
                TaskStatus::Done => {
                    task.update_status(TaskStatus::InProgress).unwrap();
                    task.complete("completed by builder", None, None, true).unwrap();
                }
                other => {
                    task.update_status(TaskStatus::InProgress).unwrap();
                    task.update_status(other).unwrap();
                }
            }
        }
        task.take_events();
        task
    }
}

/// Builder for [`Subtask`] test instances.
pub struct SubtaskBuilder {
    parent_task_id: String,
    title: String,
    description: String,
    priority: Priority,
    assignees: Vec<String>,
    parent_assignees: Vec<String>,
    progress: Option<i64>,
}

impl Default for SubtaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SubtaskBuilder {
    pub fn new() -> Self {
        Self {
            parent_task_id: new_id(),
            title: "Test subtask".to_string(),
            description: String::new(),
            priority: Priority::Medium,
            assignees: Vec::new(),
            parent_assignees: Vec::new(),
            progress: None,
        }
    }

    pub fn parent(mut self, parent_task_id: &str) -> Self {
        self.parent_task_id = parent_task_id.to_string();
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn assignees(mut self, assignees: &[&str]) -> Self {
        self.assignees = assignees.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn inheriting_from(mut self, parent_assignees: &[&str]) -> Self {
        self.parent_assignees = parent_assignees.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn progress(mut self, percentage: i64) -> Self {
        self.progress = Some(percentage);
        self
    }

    pub fn build(self) -> Subtask {
        let mut subtask = Subtask::create(
            new_id(),
            self.parent_task_id,
            self.title,
            self.description,
            self.priority,
            self.assignees,
            &self.parent_assignees,
        )
        .expect("builder produces a valid subtask");

        if let Some(progress) = self.progress {
            subtask.update_progress_percentage(progress).expect("valid progress");
        }
        subtask.take_events();
        subtask
    }
}

/// Builder for [`Project`] test aggregates.
pub struct ProjectBuilder {
    name: String,
    description: String,
    branch_names: Vec<String>,
    agents: Vec<Agent>,
}

impl Default for ProjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectBuilder {
    pub fn new() -> Self {
        Self {
            name: "Test project".to_string(),
            description: String::new(),
            branch_names: Vec::new(),
            agents: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn branch(mut self, name: &str) -> Self {
        self.branch_names.push(name.to_string());
        self
    }

    pub fn agent(mut self, id: &str, capabilities: &[AgentCapability]) -> Self {
        self.agents.push(Agent::new(
            id.to_string(),
            id.to_string(),
            capabilities.iter().copied().collect(),
        ));
        self
    }

    pub fn build(self) -> Project {
        let mut project = Project::create(&self.name, &self.description)
            .expect("builder produces a valid project");
        for branch_name in &self.branch_names {
            project.create_branch(branch_name, "").expect("unique branch name");
        }
        for agent in self.agents {
            project.register_agent(agent);
        }
        project
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder_defaults() {
        let task = TaskBuilder::new().build();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.assignees, vec!["@coding-agent"]);
        assert!(task.pending_events().is_empty());
    }

    #[test]
    fn test_task_builder_done_status() {
        let task = TaskBuilder::new().status(TaskStatus::Done).build();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.overall_progress, 100);
    }

    #[test]
    fn test_subtask_builder_inheritance() {
        let subtask = SubtaskBuilder::new().inheriting_from(&["@coding-agent"]).build();
        assert_eq!(subtask.assignees, vec!["@coding-agent"]);
    }

    #[test]
    fn test_project_builder() {
        let project = ProjectBuilder::new()
            .name("Alpha")
            .branch("main")
            .agent("a1", &[AgentCapability::BackendDevelopment])
            .build();
        assert_eq!(project.branches.len(), 1);
        assert_eq!(project.agents.len(), 1);
    }
}
