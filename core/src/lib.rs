//! Taskhive Core Library
//!
//! Foundational domain models, business logic and trait interfaces for the
//! task-orchestration server. All other crates depend on the types and
//! interfaces defined here.
//!
//! # Architecture
//!
//! - [`models`] - Entities and value objects (Project, GitBranch, Task,
//!   Subtask, Agent, WorkSession, progress timeline)
//! - [`context`] - Four-level hierarchical context with inheritance,
//!   delegation and the cache-row model
//! - [`events`] - Task domain events
//! - [`error`] - Error taxonomy and result handling
//! - [`repository`] - Repository traits and tenant scoping
//! - [`protocol`] - Facade traits for the manage_* RPC surfaces
//! - [`orchestration`] / [`scoring`] - Work assignment and next-task scoring
//! - [`validation`] / [`roles`] / [`id`] - Field validation, the agent-role
//!   registry and id normalisation

pub mod context;
pub mod error;
pub mod events;
pub mod id;
pub mod models;
pub mod orchestration;
pub mod protocol;
pub mod repository;
pub mod roles;
pub mod scoring;
pub mod validation;

// Re-export commonly used types at the crate root for convenience
pub use error::{DomainError, Result};
pub use events::TaskEvent;
pub use models::{
    Agent, AgentCapability, AgentStatus, GitBranch, Priority, ProgressState, Project,
    ProjectStatus, SessionStatus, Subtask, SubtaskRollup, Task, TaskStatus, WorkSession,
};
pub use repository::{
    ContextCacheRepository, ContextRepository, DelegationRepository, ProjectRepository, Scope,
    SubtaskRepository, TaskFilter, TaskRepository,
};
pub use validation::TaskValidator;

/// Current version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(CRATE_NAME, "hive-core");
    }

    #[test]
    fn test_re_exports() {
        let status = TaskStatus::Todo;
        assert_eq!(format!("{status}"), "todo");

        let error = DomainError::not_found("Task", "1");
        assert!(error.is_not_found());
    }
}
