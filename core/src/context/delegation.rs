use crate::context::models::ContextLevel;
use crate::error::{DomainError, Result};
use crate::id::new_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What initiated a delegation.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DelegationTrigger {
    /// Recorded by an operator; stays unprocessed until approved
    Manual,
    /// A pattern detector decided; the core records the decision
    AutoPattern,
    /// A configured threshold was crossed
    AutoThreshold,
}

impl DelegationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelegationTrigger::Manual => "manual",
            DelegationTrigger::AutoPattern => "auto_pattern",
            DelegationTrigger::AutoThreshold => "auto_threshold",
        }
    }

    pub fn parse(value: &str) -> Result<DelegationTrigger> {
        match value.trim().to_lowercase().as_str() {
            "manual" => Ok(DelegationTrigger::Manual),
            "auto_pattern" => Ok(DelegationTrigger::AutoPattern),
            "auto_threshold" => Ok(DelegationTrigger::AutoThreshold),
            other => Err(DomainError::invalid_field(
                "trigger_type",
                &format!("unknown trigger '{other}'"),
            )),
        }
    }
}

/// Processing outcome recorded on the delegation row.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Pending,
    Processed,
    Error,
}

/// A request to promote data from a lower context level to a higher one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextDelegation {
    pub id: String,
    pub user_id: String,
    pub source_level: ContextLevel,
    pub source_id: String,
    pub target_level: ContextLevel,
    pub target_id: String,
    pub delegated_data: Value,
    pub delegation_reason: String,
    pub trigger_type: DelegationTrigger,
    pub processed: bool,
    pub approved: Option<bool>,
    pub confidence_score: Option<f64>,
    pub status: DelegationStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContextDelegation {
    /// Record a new delegation. Delegation only moves data upward: the
    /// target level must be strictly above the source level.
    pub fn create(
        user_id: String,
        source_level: ContextLevel,
        source_id: String,
        target_level: ContextLevel,
        target_id: String,
        delegated_data: Value,
        delegation_reason: String,
        trigger_type: DelegationTrigger,
    ) -> Result<ContextDelegation> {
        if target_level >= source_level {
            return Err(DomainError::Validation(format!(
                "delegation must promote data upward: {source_level} -> {target_level} is not allowed"
            )));
        }
        if !delegated_data.is_object() {
            return Err(DomainError::invalid_field(
                "delegated_data",
                "expected a JSON object of section -> data",
            ));
        }

        let now = Utc::now();
        Ok(ContextDelegation {
            id: new_id(),
            user_id,
            source_level,
            source_id,
            target_level,
            target_id,
            delegated_data,
            delegation_reason,
            trigger_type,
            processed: false,
            approved: None,
            confidence_score: None,
            status: DelegationStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Manual delegations wait for operator approval before processing.
    pub fn requires_approval(&self) -> bool {
        self.trigger_type == DelegationTrigger::Manual && self.approved != Some(true)
    }

    pub fn approve(&mut self) {
        self.approved = Some(true);
        self.updated_at = Utc::now();
    }

    pub fn reject(&mut self) {
        self.approved = Some(false);
        self.updated_at = Utc::now();
    }

    pub fn mark_processed(&mut self) {
        self.processed = true;
        self.status = DelegationStatus::Processed;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: &str) {
        self.status = DelegationStatus::Error;
        self.error_message = Some(error.to_string());
        self.updated_at = Utc::now();
    }
}
