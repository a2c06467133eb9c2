//! Mock repositories and test data for the task-orchestration engines.
//!
//! Thread-safe in-memory implementations of every repository trait, with
//! error injection and call tracking, plus builders, fixtures and
//! property-test generators.

pub mod builders;
pub mod fixtures;
pub mod generators;
pub mod repository;

pub use builders::{ProjectBuilder, SubtaskBuilder, TaskBuilder};
pub use fixtures::Fixtures;
pub use repository::{
    MockContextCacheRepository, MockContextRepository, MockDelegationRepository,
    MockProjectRepository, MockSubtaskRepository, MockTaskRepository,
};
