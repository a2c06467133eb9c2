//! Progress tracking value objects.
//!
//! Tasks carry an append-only timeline of typed progress snapshots plus a
//! named milestone map. Overall timeline progress is the average of the
//! latest snapshot of each type that has been reported.

use crate::error::{DomainError, Result};
use crate::id::new_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kinds of progress that can be tracked on a task.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProgressType {
    Analysis,
    Design,
    Implementation,
    Testing,
    Documentation,
    Review,
    Deployment,
    /// Default catch-all type
    General,
}

impl ProgressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressType::Analysis => "analysis",
            ProgressType::Design => "design",
            ProgressType::Implementation => "implementation",
            ProgressType::Testing => "testing",
            ProgressType::Documentation => "documentation",
            ProgressType::Review => "review",
            ProgressType::Deployment => "deployment",
            ProgressType::General => "general",
        }
    }

    pub fn parse(value: &str) -> Result<ProgressType> {
        match value.trim().to_lowercase().as_str() {
            "analysis" => Ok(ProgressType::Analysis),
            "design" => Ok(ProgressType::Design),
            "implementation" => Ok(ProgressType::Implementation),
            "testing" => Ok(ProgressType::Testing),
            "documentation" => Ok(ProgressType::Documentation),
            "review" => Ok(ProgressType::Review),
            "deployment" => Ok(ProgressType::Deployment),
            "general" => Ok(ProgressType::General),
            other => Err(DomainError::invalid_field(
                "progress_type",
                &format!("unknown progress type '{other}'"),
            )),
        }
    }
}

impl std::fmt::Display for ProgressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status attached to a progress snapshot.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Blocked,
    Completed,
    Paused,
}

impl ProgressStatus {
    /// Derive the snapshot status from the new percentage relative to the
    /// previous one. Backward movement is treated as blocked.
    pub fn from_percentages(new: u8, old: u8) -> ProgressStatus {
        if new == 0 {
            ProgressStatus::NotStarted
        } else if new == 100 {
            ProgressStatus::Completed
        } else if new < old {
            ProgressStatus::Blocked
        } else {
            ProgressStatus::InProgress
        }
    }
}

/// Additional metadata carried on a progress snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressMetadata {
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl Default for ProgressMetadata {
    fn default() -> Self {
        Self {
            blockers: Vec::new(),
            dependencies: Vec::new(),
            confidence_level: default_confidence(),
            notes: None,
            estimated_completion: None,
        }
    }
}

fn default_confidence() -> f64 {
    1.0
}

/// Immutable snapshot of progress at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    pub id: String,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub progress_type: ProgressType,
    /// 0-100
    pub percentage: u8,
    pub status: ProgressStatus,
    pub description: Option<String>,
    pub metadata: ProgressMetadata,
    pub agent_id: Option<String>,
}

impl ProgressSnapshot {
    pub fn new(
        task_id: &str,
        progress_type: ProgressType,
        percentage: u8,
        status: ProgressStatus,
        description: Option<String>,
        metadata: ProgressMetadata,
        agent_id: Option<String>,
    ) -> Result<Self> {
        if percentage > 100 {
            return Err(DomainError::invalid_field(
                "percentage",
                &format!("must be between 0 and 100, got {percentage}"),
            ));
        }
        Ok(Self {
            id: new_id(),
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            progress_type,
            percentage,
            status,
            description,
            metadata,
            agent_id,
        })
    }
}

/// Append-only timeline of progress snapshots with milestone tracking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProgressTimeline {
    pub task_id: String,
    pub snapshots: Vec<ProgressSnapshot>,
    /// Milestone name -> threshold percentage
    pub milestones: BTreeMap<String, u8>,
}

impl ProgressTimeline {
    pub fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            snapshots: Vec::new(),
            milestones: BTreeMap::new(),
        }
    }

    /// Append a snapshot, keeping the timeline ordered by timestamp.
    pub fn add_snapshot(&mut self, snapshot: ProgressSnapshot) -> Result<()> {
        if snapshot.task_id != self.task_id {
            return Err(DomainError::invalid_field(
                "task_id",
                &format!(
                    "snapshot task {} does not match timeline task {}",
                    snapshot.task_id, self.task_id
                ),
            ));
        }
        self.snapshots.push(snapshot);
        self.snapshots.sort_by_key(|s| s.timestamp);
        Ok(())
    }

    pub fn latest_snapshot(&self) -> Option<&ProgressSnapshot> {
        self.snapshots.last()
    }

    pub fn snapshots_by_type(&self, progress_type: ProgressType) -> Vec<&ProgressSnapshot> {
        self.snapshots.iter().filter(|s| s.progress_type == progress_type).collect()
    }

    /// Latest reported percentage for a specific type, 0 when none.
    pub fn progress_by_type(&self, progress_type: ProgressType) -> u8 {
        self.snapshots_by_type(progress_type).last().map(|s| s.percentage).unwrap_or(0)
    }

    /// Overall timeline progress: average of the latest snapshot per type.
    pub fn overall_progress(&self) -> u8 {
        if self.snapshots.is_empty() {
            return 0;
        }

        let mut latest_by_type: BTreeMap<ProgressType, &ProgressSnapshot> = BTreeMap::new();
        for snapshot in &self.snapshots {
            let replace = latest_by_type
                .get(&snapshot.progress_type)
                .map(|current| snapshot.timestamp >= current.timestamp)
                .unwrap_or(true);
            if replace {
                latest_by_type.insert(snapshot.progress_type, snapshot);
            }
        }

        let total: u32 = latest_by_type.values().map(|s| s.percentage as u32).sum();
        (total / latest_by_type.len() as u32) as u8
    }

    /// Add or update a milestone threshold.
    pub fn add_milestone(&mut self, name: &str, threshold: u8) -> Result<()> {
        if threshold > 100 {
            return Err(DomainError::invalid_field(
                "threshold_percentage",
                &format!("must be between 0 and 100, got {threshold}"),
            ));
        }
        self.milestones.insert(name.to_string(), threshold);
        Ok(())
    }

    pub fn is_milestone_reached(&self, name: &str) -> bool {
        self.milestones
            .get(name)
            .map(|threshold| self.overall_progress() >= *threshold)
            .unwrap_or(false)
    }

    /// Snapshots recorded within the last `hours` hours.
    pub fn trend(&self, hours: i64) -> Vec<&ProgressSnapshot> {
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        self.snapshots.iter().filter(|s| s.timestamp > cutoff).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(task_id: &str, kind: ProgressType, pct: u8) -> ProgressSnapshot {
        ProgressSnapshot::new(
            task_id,
            kind,
            pct,
            ProgressStatus::from_percentages(pct, 0),
            None,
            ProgressMetadata::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_percentage_bounds() {
        assert!(snapshot("t1", ProgressType::General, 0).percentage == 0);
        assert!(snapshot("t1", ProgressType::General, 100).percentage == 100);
        assert!(ProgressSnapshot::new(
            "t1",
            ProgressType::General,
            101,
            ProgressStatus::InProgress,
            None,
            ProgressMetadata::default(),
            None,
        )
        .is_err());
    }

    #[test]
    fn test_status_from_percentages() {
        assert_eq!(ProgressStatus::from_percentages(0, 0), ProgressStatus::NotStarted);
        assert_eq!(ProgressStatus::from_percentages(100, 50), ProgressStatus::Completed);
        assert_eq!(ProgressStatus::from_percentages(30, 50), ProgressStatus::Blocked);
        assert_eq!(ProgressStatus::from_percentages(60, 50), ProgressStatus::InProgress);
    }

    #[test]
    fn test_overall_progress_averages_latest_per_type() {
        let mut timeline = ProgressTimeline::new("t1");
        timeline.add_snapshot(snapshot("t1", ProgressType::Implementation, 20)).unwrap();
        timeline.add_snapshot(snapshot("t1", ProgressType::Implementation, 60)).unwrap();
        timeline.add_snapshot(snapshot("t1", ProgressType::Testing, 40)).unwrap();

        // latest implementation = 60, testing = 40 -> average = 50
        assert_eq!(timeline.overall_progress(), 50);
    }

    #[test]
    fn test_mismatched_task_id_rejected() {
        let mut timeline = ProgressTimeline::new("t1");
        let result = timeline.add_snapshot(snapshot("t2", ProgressType::General, 10));
        assert!(result.is_err());
    }

    #[test]
    fn test_milestones() {
        let mut timeline = ProgressTimeline::new("t1");
        timeline.add_milestone("halfway", 50).unwrap();
        assert!(!timeline.is_milestone_reached("halfway"));

        timeline.add_snapshot(snapshot("t1", ProgressType::General, 75)).unwrap();
        assert!(timeline.is_milestone_reached("halfway"));
        assert!(!timeline.is_milestone_reached("unknown"));
        assert!(timeline.add_milestone("overflow", 101).is_err());
    }

    #[test]
    fn test_progress_by_type() {
        let mut timeline = ProgressTimeline::new("t1");
        assert_eq!(timeline.progress_by_type(ProgressType::Design), 0);
        timeline.add_snapshot(snapshot("t1", ProgressType::Design, 35)).unwrap();
        assert_eq!(timeline.progress_by_type(ProgressType::Design), 35);
    }
}
