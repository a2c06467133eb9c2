//! Application facades for the manage_* RPC surfaces.
//!
//! The facades are thin adapters: they translate parameters into engine
//! invocations, coordinate repositories, and shape responses. Business
//! logic lives in `hive-core`; the transport sits above and is out of
//! scope.

pub mod agent_facade;
pub mod context_facade;
pub mod context_service;
pub mod project_facade;
pub mod response;
pub mod subtask_facade;
pub mod sweep;
pub mod task_facade;

pub use agent_facade::AgentFacade;
pub use context_facade::ContextFacade;
pub use context_service::ContextService;
pub use project_facade::ProjectFacade;
pub use response::McpResponse;
pub use subtask_facade::SubtaskFacade;
pub use sweep::SessionSweeper;
pub use task_facade::TaskFacade;
