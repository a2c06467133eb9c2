//! Task domain events.
//!
//! Events are value-typed and buffered on the emitting entity; the use case
//! drains them after a successful persistence step and hands them to the
//! event-bus sink. Delivery is an external concern.

use crate::models::progress::{ProgressStatus, ProgressType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Domain events emitted by the task engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskCreated {
        task_id: String,
        title: String,
        created_at: DateTime<Utc>,
    },
    TaskUpdated {
        task_id: String,
        field_name: String,
        old_value: Value,
        new_value: Value,
        updated_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    TaskRetrieved {
        task_id: String,
        retrieved_at: DateTime<Utc>,
    },
    TaskDeleted {
        task_id: String,
        title: String,
        deleted_at: DateTime<Utc>,
    },
    ProgressUpdated {
        task_id: String,
        progress_type: ProgressType,
        old_percentage: u8,
        new_percentage: u8,
        status: ProgressStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    ProgressMilestoneReached {
        task_id: String,
        milestone_name: String,
        milestone_percentage: u8,
        current_progress: u8,
    },
    ProgressTypeCompleted {
        task_id: String,
        progress_type: ProgressType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
}

impl TaskEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            TaskEvent::TaskCreated { .. } => "task_created",
            TaskEvent::TaskUpdated { .. } => "task_updated",
            TaskEvent::TaskRetrieved { .. } => "task_retrieved",
            TaskEvent::TaskDeleted { .. } => "task_deleted",
            TaskEvent::ProgressUpdated { .. } => "progress_updated",
            TaskEvent::ProgressMilestoneReached { .. } => "progress_milestone_reached",
            TaskEvent::ProgressTypeCompleted { .. } => "progress_type_completed",
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::TaskCreated { task_id, .. }
            | TaskEvent::TaskUpdated { task_id, .. }
            | TaskEvent::TaskRetrieved { task_id, .. }
            | TaskEvent::TaskDeleted { task_id, .. }
            | TaskEvent::ProgressUpdated { task_id, .. }
            | TaskEvent::ProgressMilestoneReached { task_id, .. }
            | TaskEvent::ProgressTypeCompleted { task_id, .. } => task_id,
        }
    }

    /// Dictionary projection handed to event sinks. All listed fields
    /// survive a JSON round-trip.
    pub fn to_json(&self) -> Value {
        match self {
            TaskEvent::TaskCreated { task_id, title, created_at } => json!({
                "event_type": self.event_type(),
                "task_id": task_id,
                "title": title,
                "created_at": created_at.to_rfc3339(),
            }),
            TaskEvent::TaskUpdated {
                task_id,
                field_name,
                old_value,
                new_value,
                updated_at,
                metadata,
            } => json!({
                "event_type": self.event_type(),
                "task_id": task_id,
                "field_name": field_name,
                "old_value": old_value,
                "new_value": new_value,
                "updated_at": updated_at.to_rfc3339(),
                "metadata": metadata,
            }),
            TaskEvent::TaskRetrieved { task_id, retrieved_at } => json!({
                "event_type": self.event_type(),
                "task_id": task_id,
                "retrieved_at": retrieved_at.to_rfc3339(),
            }),
            TaskEvent::TaskDeleted { task_id, title, deleted_at } => json!({
                "event_type": self.event_type(),
                "task_id": task_id,
                "title": title,
                "deleted_at": deleted_at.to_rfc3339(),
            }),
            TaskEvent::ProgressUpdated {
                task_id,
                progress_type,
                old_percentage,
                new_percentage,
                status,
                description,
                agent_id,
            } => json!({
                "event_type": self.event_type(),
                "task_id": task_id,
                "progress_type": progress_type.as_str(),
                "old_percentage": old_percentage,
                "new_percentage": new_percentage,
                "status": status,
                "description": description,
                "agent_id": agent_id,
            }),
            TaskEvent::ProgressMilestoneReached {
                task_id,
                milestone_name,
                milestone_percentage,
                current_progress,
            } => json!({
                "event_type": self.event_type(),
                "task_id": task_id,
                "milestone_name": milestone_name,
                "milestone_percentage": milestone_percentage,
                "current_progress": current_progress,
            }),
            TaskEvent::ProgressTypeCompleted { task_id, progress_type, agent_id } => json!({
                "event_type": self.event_type(),
                "task_id": task_id,
                "progress_type": progress_type.as_str(),
                "agent_id": agent_id,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_and_task_id() {
        let event = TaskEvent::TaskCreated {
            task_id: "t1".into(),
            title: "Build API".into(),
            created_at: Utc::now(),
        };
        assert_eq!(event.event_type(), "task_created");
        assert_eq!(event.task_id(), "t1");
    }

    #[test]
    fn test_to_json_round_trip_preserves_fields() {
        let event = TaskEvent::TaskUpdated {
            task_id: "t1".into(),
            field_name: "status".into(),
            old_value: json!("todo"),
            new_value: json!("in_progress"),
            updated_at: Utc::now(),
            metadata: Some(json!({"completion_summary": "done it"})),
        };

        let value = event.to_json();
        let text = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(back["event_type"], "task_updated");
        assert_eq!(back["task_id"], "t1");
        assert_eq!(back["field_name"], "status");
        assert_eq!(back["old_value"], "todo");
        assert_eq!(back["new_value"], "in_progress");
        assert_eq!(back["metadata"]["completion_summary"], "done it");
    }

    #[test]
    fn test_milestone_event_projection() {
        let event = TaskEvent::ProgressMilestoneReached {
            task_id: "t9".into(),
            milestone_name: "halfway".into(),
            milestone_percentage: 50,
            current_progress: 55,
        };
        let value = event.to_json();
        assert_eq!(value["milestone_name"], "halfway");
        assert_eq!(value["milestone_percentage"], 50);
        assert_eq!(value["current_progress"], 55);
    }
}
