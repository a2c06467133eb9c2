use chrono::{DateTime, NaiveDate, Utc};
use hive_core::error::{DomainError, Result};
use hive_core::models::{
    Priority, ProgressState, ProgressTimeline, Subtask, Task, TaskStatus,
};
use hive_core::models::task::ProgressEntry;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Convert a sqlx error to the domain taxonomy.
pub fn map_sqlx_error(err: sqlx::Error) -> DomainError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                DomainError::Duplicate(format!("unique constraint violated: {}", db_err.message()))
            } else if db_err.is_foreign_key_violation() {
                DomainError::Validation(format!("foreign key violated: {}", db_err.message()))
            } else {
                DomainError::Database(format!("database constraint error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => DomainError::Database("unexpected RowNotFound".to_string()),
        sqlx::Error::PoolTimedOut => DomainError::transient("connection pool timeout"),
        sqlx::Error::Io(io_err) => DomainError::transient(format!("database I/O error: {io_err}")),
        _ => DomainError::Database(format!("database operation failed: {err}")),
    }
}

/// Retry transient failures with exponential backoff: 3 attempts, base 1 s,
/// cap 10 s. Non-transient errors propagate immediately.
pub async fn with_retry<T, F, Fut>(operation: &str, mut run: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match run().await {
            Err(error) if error.is_recoverable() && attempt < 3 => {
                let delay = Duration::from_secs((1u64 << attempt).min(10));
                attempt += 1;
                warn!(%operation, attempt, ?delay, %error, "transient failure, retrying");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// Parse a JSON TEXT column, tolerating NULL as the default.
pub fn json_column<T: serde::de::DeserializeOwned + Default>(
    row: &SqliteRow,
    column: &str,
) -> Result<T> {
    let raw: Option<String> = row.try_get(column).map_err(map_sqlx_error)?;
    match raw {
        None => Ok(T::default()),
        Some(text) if text.is_empty() => Ok(T::default()),
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| DomainError::Serialization(format!("column '{column}': {e}"))),
    }
}

pub fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| DomainError::Serialization(e.to_string()))
}

/// Convert a tasks row to the Task entity.
pub fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let status_str: String = row.get("status");
    let priority_str: String = row.get("priority");
    let progress_state_str: String = row.get("progress_state");
    let status_before_block: Option<String> = row.get("status_before_block");

    let due_date: Option<String> = row.get("due_date");
    let due_date = match due_date {
        Some(raw) => Some(
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|e| DomainError::Serialization(format!("due_date: {e}")))?,
        ),
        None => None,
    };

    let progress_timeline: Option<String> = row.get("progress_timeline");
    let progress_timeline: Option<ProgressTimeline> = match progress_timeline {
        Some(text) if !text.is_empty() => Some(
            serde_json::from_str(&text)
                .map_err(|e| DomainError::Serialization(format!("progress_timeline: {e}")))?,
        ),
        _ => None,
    };

    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");
    let overall_progress: i64 = row.get("overall_progress");

    let progress_history: Vec<ProgressEntry> = json_column(row, "progress_history")?;

    Ok(Task {
        id: row.get("id"),
        branch_id: row.get("branch_id"),
        title: row.get("title"),
        description: row.get("description"),
        status: TaskStatus::parse(&status_str)?,
        priority: Priority::parse(&priority_str)?,
        details: row.get("details"),
        estimated_effort: row.get("estimated_effort"),
        due_date,
        context_id: row.get("context_id"),
        overall_progress: overall_progress.clamp(0, 100) as u8,
        progress_state: match progress_state_str.as_str() {
            "complete" => ProgressState::Complete,
            "in_progress" => ProgressState::InProgress,
            _ => ProgressState::Initial,
        },
        progress_timeline,
        progress_history,
        assignees: json_column(row, "assignees")?,
        labels: json_column(row, "labels")?,
        dependencies: json_column(row, "dependencies")?,
        subtask_ids: json_column(row, "subtask_ids")?,
        status_before_block: match status_before_block {
            Some(raw) => Some(TaskStatus::parse(&raw)?),
            None => None,
        },
        completion_summary: row.get("completion_summary"),
        testing_notes: row.get("testing_notes"),
        created_at,
        updated_at,
        events: Vec::new(),
    })
}

/// Convert a subtasks row to the Subtask entity.
pub fn row_to_subtask(row: &SqliteRow) -> Result<Subtask> {
    let status_str: String = row.get("status");
    let priority_str: String = row.get("priority");
    let progress: i64 = row.get("progress_percentage");

    Ok(Subtask {
        id: row.get("id"),
        parent_task_id: row.get("parent_task_id"),
        title: row.get("title"),
        description: row.get("description"),
        status: TaskStatus::parse(&status_str)?,
        priority: Priority::parse(&priority_str)?,
        assignees: json_column(row, "assignees")?,
        progress_percentage: progress.clamp(0, 100) as u8,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        events: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DomainError::transient("pool exhausted")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4); // initial + 3 retries
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_domain_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DomainError::Validation("bad input".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(DomainError::transient("blip"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}
