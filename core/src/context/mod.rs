//! Hierarchical context: four levels (global → project → branch → task)
//! with per-user scoping, downward inheritance, upward delegation and a
//! content-hashed inheritance cache.

pub mod delegation;
pub mod inheritance;
pub mod merge;
pub mod models;

pub use delegation::{ContextDelegation, DelegationStatus, DelegationTrigger};
pub use inheritance::{dependencies_hash, resolve_chain, ContextNode, ResolvedContext};
pub use merge::deep_merge;
pub use models::{
    BranchContext, ContextCacheEntry, ContextLevel, GlobalContext, ProjectContext, TaskContext,
    BRANCH_SECTIONS, GLOBAL_SECTIONS, PROJECT_SECTIONS, TASK_SECTIONS,
};
