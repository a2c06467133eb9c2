use hive_core::error::DomainError;
use serde::{Deserialize, Serialize};

/// Structured error body surfaced to RPC clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    /// Transient infrastructure failures may be retried by the client
    pub recoverable: bool,
}

/// The response envelope every manage_* operation returns: a success flag
/// with a payload, or a structured error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> McpResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn err(error: &DomainError) -> Self {
        let message = match error {
            // Programming errors show a generic message; the trace is logged
            DomainError::Internal { recoverable: false, .. } => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: error.code().to_string(),
                message,
                recoverable: error.is_recoverable(),
            }),
        }
    }

    pub fn from_result(result: hive_core::Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::err(&error),
        }
    }
}
