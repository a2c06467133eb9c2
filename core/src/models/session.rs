use crate::error::{DomainError, Result};
use crate::id::new_id;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Work session lifecycle.
///
/// `active → {paused, completed, cancelled, timeout}`,
/// `paused → {active, cancelled}`. `ended_at` is set exactly for the three
/// terminal states.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
    Timeout,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Timeout => "timeout",
        }
    }
}

/// A typed entry in the session's append-only progress log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionProgressUpdate {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub update_type: String,
    pub message: String,
    pub metadata: Value,
}

/// An agent's explicit claim on a task: carries timing, progress updates and
/// advisory resource locks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkSession {
    pub id: String,
    pub agent_id: String,
    pub task_id: String,
    pub branch_id: String,
    pub started_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub ended_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    /// Accumulated on resume
    #[serde(with = "duration_seconds")]
    pub total_paused_duration: Duration,
    pub session_notes: String,
    pub progress_updates: Vec<SessionProgressUpdate>,
    pub resources_locked: Vec<String>,
    /// Auto-timeout once total duration exceeds this
    #[serde(with = "opt_duration_seconds")]
    pub max_duration: Option<Duration>,
    pub last_activity: DateTime<Utc>,
}

mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(seconds))
    }
}

mod opt_duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.num_seconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let seconds = Option::<i64>::deserialize(deserializer)?;
        Ok(seconds.map(Duration::seconds))
    }
}

impl WorkSession {
    /// Factory for a new active session.
    pub fn create(
        agent_id: &str,
        task_id: &str,
        branch_id: &str,
        max_duration: Option<Duration>,
    ) -> Result<WorkSession> {
        if agent_id.trim().is_empty() {
            return Err(DomainError::empty_field("agent_id"));
        }
        if task_id.trim().is_empty() {
            return Err(DomainError::empty_field("task_id"));
        }
        if branch_id.trim().is_empty() {
            return Err(DomainError::empty_field("branch_id"));
        }

        let now = Utc::now();
        let mut session = WorkSession {
            id: new_id(),
            agent_id: agent_id.to_string(),
            task_id: task_id.to_string(),
            branch_id: branch_id.to_string(),
            started_at: now,
            status: SessionStatus::Active,
            ended_at: None,
            paused_at: None,
            total_paused_duration: Duration::zero(),
            session_notes: String::new(),
            progress_updates: Vec::new(),
            resources_locked: Vec::new(),
            max_duration,
            last_activity: now,
        };
        session.add_progress_update("session_started", "Work session initiated", None);
        Ok(session)
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Append a typed progress update; advances `last_activity`.
    pub fn add_progress_update(&mut self, update_type: &str, message: &str, metadata: Option<Value>) {
        let now = Utc::now();
        self.progress_updates.push(SessionProgressUpdate {
            timestamp: now,
            update_type: update_type.to_string(),
            message: message.to_string(),
            metadata: metadata.unwrap_or_else(|| json!({})),
        });
        self.last_activity = now;
    }

    pub fn pause(&mut self, reason: &str) -> Result<()> {
        if self.status != SessionStatus::Active {
            return Err(DomainError::Conflict(format!(
                "cannot pause session in {} state",
                self.status.as_str()
            )));
        }
        self.status = SessionStatus::Paused;
        self.paused_at = Some(Utc::now());
        if reason.is_empty() {
            self.add_progress_update("session_paused", "Session paused", None);
        } else {
            self.add_progress_update("session_paused", &format!("Session paused: {reason}"), None);
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.status != SessionStatus::Paused {
            return Err(DomainError::Conflict(format!(
                "cannot resume session in {} state",
                self.status.as_str()
            )));
        }
        if let Some(paused_at) = self.paused_at.take() {
            self.total_paused_duration = self.total_paused_duration + (Utc::now() - paused_at);
        }
        self.status = SessionStatus::Active;
        self.add_progress_update("session_resumed", "Session resumed", None);
        Ok(())
    }

    pub fn complete(&mut self, success: bool, notes: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DomainError::Conflict(format!(
                "cannot complete session in {} state",
                self.status.as_str()
            )));
        }
        self.status = SessionStatus::Completed;
        self.ended_at = Some(Utc::now());
        if !notes.is_empty() {
            self.session_notes.push_str(&format!("\nCompletion notes: {notes}"));
        }
        let kind = if success { "successful" } else { "unsuccessful" };
        self.add_progress_update("session_completed", &format!("Session completed ({kind})"), None);
        Ok(())
    }

    pub fn cancel(&mut self, reason: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DomainError::Conflict(format!(
                "cannot cancel session in {} state",
                self.status.as_str()
            )));
        }
        self.status = SessionStatus::Cancelled;
        self.ended_at = Some(Utc::now());
        if !reason.is_empty() {
            self.session_notes.push_str(&format!("\nCancellation reason: {reason}"));
        }
        self.add_progress_update("session_cancelled", &format!("Session cancelled: {reason}"), None);
        Ok(())
    }

    /// Transition to timeout. A no-op on already-terminal sessions so the
    /// periodic sweep stays idempotent.
    pub fn timeout(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = SessionStatus::Timeout;
        self.ended_at = Some(Utc::now());
        self.add_progress_update("session_timeout", "Session timed out", None);
    }

    pub fn lock_resource(&mut self, resource_key: &str) {
        if !self.resources_locked.iter().any(|r| r == resource_key) {
            self.resources_locked.push(resource_key.to_string());
            self.add_progress_update(
                "resource_locked",
                &format!("Locked resource: {resource_key}"),
                None,
            );
        }
    }

    pub fn unlock_resource(&mut self, resource_key: &str) {
        let before = self.resources_locked.len();
        self.resources_locked.retain(|r| r != resource_key);
        if self.resources_locked.len() != before {
            self.add_progress_update(
                "resource_unlocked",
                &format!("Unlocked resource: {resource_key}"),
                None,
            );
        }
    }

    pub fn unlock_all_resources(&mut self) {
        for resource in self.resources_locked.clone() {
            self.unlock_resource(&resource);
        }
    }

    /// Total wall-clock duration including paused time.
    pub fn total_duration(&self) -> Duration {
        match self.ended_at {
            Some(ended) => ended - self.started_at,
            None => Utc::now() - self.started_at,
        }
    }

    /// Active duration: total minus paused time.
    pub fn active_duration(&self) -> Duration {
        self.total_duration() - self.total_paused_duration
    }

    /// A session is due for timeout when a max duration is configured and
    /// the total duration has exceeded it.
    pub fn is_timeout_due(&self) -> bool {
        match self.max_duration {
            Some(max) => self.total_duration() > max,
            None => false,
        }
    }

    /// Extend the maximum duration (sets it when previously unbounded).
    pub fn extend(&mut self, additional: Duration) {
        self.max_duration = Some(match self.max_duration {
            Some(max) => max + additional,
            None => additional,
        });
        self.add_progress_update(
            "session_extended",
            &format!("Session extended by {}s", additional.num_seconds()),
            None,
        );
    }

    /// Comprehensive summary projection for dashboards.
    pub fn summary(&self) -> Value {
        json!({
            "session_id": self.id,
            "agent_id": self.agent_id,
            "task_id": self.task_id,
            "branch_id": self.branch_id,
            "status": self.status.as_str(),
            "timing": {
                "started_at": self.started_at.to_rfc3339(),
                "ended_at": self.ended_at.map(|t| t.to_rfc3339()),
                "paused_at": self.paused_at.map(|t| t.to_rfc3339()),
                "last_activity": self.last_activity.to_rfc3339(),
                "active_duration_seconds": self.active_duration().num_seconds(),
                "total_duration_seconds": self.total_duration().num_seconds(),
                "total_paused_seconds": self.total_paused_duration.num_seconds(),
            },
            "progress": {
                "total_updates": self.progress_updates.len(),
                "latest_update": self.progress_updates.last(),
                "session_notes": self.session_notes,
            },
            "resources": {
                "locked_resources": self.resources_locked,
                "total_locked": self.resources_locked.len(),
            },
            "configuration": {
                "max_duration_seconds": self.max_duration.map(|d| d.num_seconds()),
                "timeout_due": self.is_timeout_due(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> WorkSession {
        WorkSession::create("agent-1", "task-1", "branch-1", None).unwrap()
    }

    #[test]
    fn test_create_validates_required_fields() {
        assert!(WorkSession::create("", "t", "b", None).is_err());
        assert!(WorkSession::create("a", "", "b", None).is_err());
        assert!(WorkSession::create("a", "t", "", None).is_err());
    }

    #[test]
    fn test_state_machine() {
        let mut s = session();
        assert!(s.is_active());

        s.pause("lunch").unwrap();
        assert_eq!(s.status, SessionStatus::Paused);
        // cannot pause twice
        assert!(s.pause("again").is_err());

        s.resume().unwrap();
        assert!(s.is_active());
        assert!(s.resume().is_err());

        s.complete(true, "wrapped up").unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
        assert!(s.ended_at.is_some());
        // terminal states refuse further transitions
        assert!(s.complete(true, "").is_err());
        assert!(s.cancel("").is_err());
    }

    #[test]
    fn test_ended_at_iff_terminal() {
        let mut s = session();
        assert!(s.ended_at.is_none());
        s.pause("").unwrap();
        assert!(s.ended_at.is_none());
        s.cancel("abandoned").unwrap();
        assert!(s.ended_at.is_some());
    }

    #[test]
    fn test_pause_accounting() {
        let mut s = session();
        s.pause("").unwrap();
        s.resume().unwrap();
        // active + paused == total
        let total = s.total_duration();
        let active = s.active_duration();
        assert_eq!(active + s.total_paused_duration, total);
    }

    #[test]
    fn test_timeout_due_and_idempotent_sweep() {
        let mut s = WorkSession::create("a", "t", "b", Some(Duration::seconds(1))).unwrap();
        // Simulate an old session
        s.started_at = Utc::now() - Duration::seconds(5);
        assert!(s.is_timeout_due());

        s.timeout();
        assert_eq!(s.status, SessionStatus::Timeout);
        let ended = s.ended_at;

        // sweeping again is a no-op
        s.timeout();
        assert_eq!(s.ended_at, ended);
    }

    #[test]
    fn test_no_timeout_without_max_duration() {
        let mut s = session();
        s.started_at = Utc::now() - Duration::days(30);
        assert!(!s.is_timeout_due());
    }

    #[test]
    fn test_resource_locks() {
        let mut s = session();
        s.lock_resource("db:users");
        s.lock_resource("db:users");
        assert_eq!(s.resources_locked.len(), 1);

        s.lock_resource("file:report");
        s.unlock_all_resources();
        assert!(s.resources_locked.is_empty());
    }

    #[test]
    fn test_extend() {
        let mut s = session();
        s.extend(Duration::minutes(30));
        assert_eq!(s.max_duration, Some(Duration::minutes(30)));
        s.extend(Duration::minutes(30));
        assert_eq!(s.max_duration, Some(Duration::minutes(60)));
    }

    #[test]
    fn test_progress_updates_advance_last_activity() {
        let mut s = session();
        let before = s.last_activity;
        s.add_progress_update("note", "pushed a commit", Some(json!({"sha": "abc"})));
        assert!(s.last_activity >= before);
        assert_eq!(s.progress_updates.last().unwrap().update_type, "note");
    }

    #[test]
    fn test_summary_projection() {
        let mut s = session();
        s.lock_resource("db:users");
        let summary = s.summary();
        assert_eq!(summary["session_id"], s.id);
        assert_eq!(summary["resources"]["total_locked"], 1);
        assert_eq!(summary["status"], "active");
    }
}
