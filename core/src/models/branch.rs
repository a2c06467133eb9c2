use crate::models::status::TaskStatus;
use crate::models::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A branch (task tree) within a project. Owns tasks; receives at most one
/// agent assignment. Branch names are unique within their project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitBranch {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub assigned_agent_id: Option<String>,
    pub status: TaskStatus,
    /// Denormalised counters, kept in step with `tasks`
    pub task_count: u32,
    pub completed_task_count: u32,
    /// Tasks owned by this branch, keyed by task id
    pub tasks: BTreeMap<String, Task>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GitBranch {
    pub fn new(id: String, project_id: String, name: String, description: String) -> GitBranch {
        let now = Utc::now();
        GitBranch {
            id,
            project_id,
            name,
            description,
            assigned_agent_id: None,
            status: TaskStatus::Todo,
            task_count: 0,
            completed_task_count: 0,
            tasks: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_task(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.insert(task.id.clone(), task);
        self.sync_counters();
    }

    pub fn remove_task(&mut self, task_id: &str) -> Option<Task> {
        let removed = self.tasks.remove(task_id);
        if removed.is_some() {
            self.sync_counters();
        }
        removed
    }

    /// Tasks ready to be picked up (todo status). Cross-tree dependency
    /// filtering happens at the project level.
    pub fn available_tasks(&self) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.status == TaskStatus::Todo).collect()
    }

    /// Refresh the denormalised counters from the task map.
    pub fn sync_counters(&mut self) {
        self.task_count = self.tasks.len() as u32;
        self.completed_task_count = self.tasks.values().filter(|t| t.is_completed()).count() as u32;
        self.updated_at = Utc::now();
    }

    /// Completion percentage across owned tasks, 0 when empty.
    pub fn progress_percentage(&self) -> f64 {
        if self.task_count == 0 {
            return 0.0;
        }
        self.completed_task_count as f64 / self.task_count as f64 * 100.0
    }

    /// Combined text of all task titles and descriptions, used by the
    /// capability detector.
    pub fn requirements_text(&self) -> String {
        self.tasks
            .values()
            .map(|t| format!("{} {}", t.title, t.description))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::status::Priority;

    fn branch_with_tasks() -> GitBranch {
        let mut branch = GitBranch::new(
            crate::id::new_id(),
            crate::id::new_id(),
            "main".to_string(),
            String::new(),
        );
        for title in ["Build API", "Write docs"] {
            let task = Task::create(
                crate::id::new_id(),
                branch.id.clone(),
                title.to_string(),
                "work".to_string(),
                Priority::Medium,
                vec!["@coding-agent".to_string()],
            )
            .unwrap();
            branch.add_task(task);
        }
        branch
    }

    #[test]
    fn test_counters_track_tasks() {
        let mut branch = branch_with_tasks();
        assert_eq!(branch.task_count, 2);
        assert_eq!(branch.completed_task_count, 0);
        assert_eq!(branch.progress_percentage(), 0.0);

        let id = branch.tasks.keys().next().unwrap().clone();
        {
            let task = branch.tasks.get_mut(&id).unwrap();
            task.update_status(TaskStatus::InProgress).unwrap();
            task.complete("done", None, None, true).unwrap();
        }
        branch.sync_counters();
        assert_eq!(branch.completed_task_count, 1);
        assert_eq!(branch.progress_percentage(), 50.0);
    }

    #[test]
    fn test_available_tasks_are_todo_only() {
        let mut branch = branch_with_tasks();
        assert_eq!(branch.available_tasks().len(), 2);

        let id = branch.tasks.keys().next().unwrap().clone();
        branch.tasks.get_mut(&id).unwrap().update_status(TaskStatus::InProgress).unwrap();
        assert_eq!(branch.available_tasks().len(), 1);
    }

    #[test]
    fn test_requirements_text_concatenates_tasks() {
        let branch = branch_with_tasks();
        let text = branch.requirements_text();
        assert!(text.contains("Build API"));
        assert!(text.contains("Write docs"));
    }
}
