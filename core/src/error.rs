use crate::models::status::TaskStatus;
use thiserror::Error;

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, DomainError>;

/// Error taxonomy for the task-orchestration core.
///
/// Every engine method returns either its payload or one of these errors.
/// Each variant maps to a structured error code surfaced to RPC clients via
/// [`DomainError::code`] and to an HTTP-equivalent status via
/// [`DomainError::status_code`].
///
/// # Examples
///
/// ```rust
/// use hive_core::error::DomainError;
///
/// let err = DomainError::not_found("Task", "0a4f");
/// assert!(err.is_not_found());
/// assert_eq!(err.code(), "NOT_FOUND");
/// assert_eq!(err.status_code(), 404);
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Entity not found by the given identifier
    #[error("{0} not found: {1}")]
    NotFound(String, String),

    /// Invalid status transition attempted
    #[error("Invalid status transition from {0} to {1}")]
    InvalidStatusTransition(TaskStatus, TaskStatus),

    /// Validation error with details
    #[error("Validation error: {0}")]
    Validation(String),

    /// Duplicate name within a uniqueness scope (e.g. branch name in project)
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Conflicting concurrent state (already assigned, version conflict, lock held)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Cross-user or cross-agent access denied
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Completion attempted while the inherited context lags the task
    #[error("Context for task {task_id} is stale: task was updated {lag_seconds} seconds after the context. Record progress on the context before completing.")]
    StaleContext { task_id: String, lag_seconds: i64 },

    /// Completion attempted without the mandatory summary
    #[error("Task {0} cannot be completed without a completion summary")]
    MissingCompletionSummary(String),

    /// A dependency edge would introduce a cycle or self-reference
    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    /// Database operation error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization / deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal system error; `recoverable` marks transient infrastructure
    /// failures that exhausted their retries
    #[error("Internal error: {message}")]
    Internal { message: String, recoverable: bool },
}

impl DomainError {
    /// Create a not found error for an entity kind and id
    pub fn not_found(kind: &str, id: impl Into<String>) -> Self {
        Self::NotFound(kind.to_string(), id.into())
    }

    /// Create a validation error for an empty required field
    pub fn empty_field(field: &str) -> Self {
        Self::Validation(format!("Field '{field}' cannot be empty"))
    }

    /// Create a validation error naming the offending field
    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::Validation(format!("Field '{field}' is invalid: {reason}"))
    }

    /// Create a status transition error
    pub fn invalid_transition(from: TaskStatus, to: TaskStatus) -> Self {
        Self::InvalidStatusTransition(from, to)
    }

    /// Create a non-recoverable internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            recoverable: false,
        }
    }

    /// Create a recoverable internal error (transient infrastructure)
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            recoverable: true,
        }
    }

    /// Check if this error indicates a not found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound(_, _))
    }

    /// Check if this error indicates a validation problem
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DomainError::Validation(_) | DomainError::InvalidStatusTransition(_, _)
        )
    }

    /// Check if this error indicates a conflict (duplicate or locked)
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::Conflict(_) | DomainError::Duplicate(_))
    }

    /// Check if the failure is worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DomainError::Internal { recoverable: true, .. })
    }

    /// Structured error code surfaced to RPC clients
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound(_, _) => "NOT_FOUND",
            DomainError::Validation(_) => "VALIDATION_ERROR",
            DomainError::InvalidStatusTransition(_, _) => "VALIDATION_ERROR",
            DomainError::Duplicate(_) => "CONFLICT",
            DomainError::Conflict(_) => "CONFLICT",
            DomainError::Forbidden(_) => "FORBIDDEN",
            DomainError::StaleContext { .. } => "STALE_CONTEXT",
            DomainError::MissingCompletionSummary(_) => "MISSING_COMPLETION_SUMMARY",
            DomainError::DependencyCycle(_) => "DEPENDENCY_CYCLE",
            DomainError::Database(_)
            | DomainError::Serialization(_)
            | DomainError::Configuration(_)
            | DomainError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Convert to appropriate HTTP status code equivalent
    pub fn status_code(&self) -> u16 {
        match self {
            DomainError::NotFound(_, _) => 404,
            DomainError::Validation(_) => 400,
            DomainError::InvalidStatusTransition(_, _) => 422,
            DomainError::Duplicate(_) => 409,
            DomainError::Conflict(_) => 409,
            DomainError::Forbidden(_) => 403,
            DomainError::StaleContext { .. } => 409,
            DomainError::MissingCompletionSummary(_) => 422,
            DomainError::DependencyCycle(_) => 422,
            DomainError::Database(_) => 500,
            DomainError::Serialization(_) => 500,
            DomainError::Configuration(_) => 500,
            DomainError::Internal { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = DomainError::not_found("Task", "42");
        assert_eq!(error, DomainError::NotFound("Task".to_string(), "42".to_string()));
        assert!(error.is_not_found());
        assert_eq!(error.status_code(), 404);

        let error = DomainError::empty_field("title");
        assert!(error.is_validation());
        assert_eq!(error.code(), "VALIDATION_ERROR");
        assert_eq!(error.status_code(), 400);

        let error = DomainError::invalid_transition(TaskStatus::Done, TaskStatus::Todo);
        assert_eq!(error.status_code(), 422);
        assert_eq!(error.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(DomainError::Duplicate("main".into()).code(), "CONFLICT");
        assert_eq!(DomainError::Forbidden("cross-user".into()).code(), "FORBIDDEN");
        assert_eq!(
            DomainError::StaleContext { task_id: "t".into(), lag_seconds: 60 }.code(),
            "STALE_CONTEXT"
        );
        assert_eq!(
            DomainError::MissingCompletionSummary("t".into()).code(),
            "MISSING_COMPLETION_SUMMARY"
        );
        assert_eq!(DomainError::DependencyCycle("a -> a".into()).code(), "DEPENDENCY_CYCLE");
        assert_eq!(DomainError::Database("gone".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_stale_context_display_includes_lag() {
        let error = DomainError::StaleContext { task_id: "abc".into(), lag_seconds: 300 };
        let message = format!("{error}");
        assert!(message.contains("abc"));
        assert!(message.contains("300 seconds"));
    }

    #[test]
    fn test_recoverable_flag() {
        assert!(DomainError::transient("pool exhausted").is_recoverable());
        assert!(!DomainError::internal("bug").is_recoverable());
    }
}
