use crate::error::{DomainError, Result};
use crate::roles::resolve_legacy_role;
use chrono::NaiveDate;

/// Validation utilities for the task engine.
pub struct TaskValidator;

impl TaskValidator {
    /// Validate a task or subtask title
    ///
    /// Titles must:
    /// - Not be empty or only whitespace
    /// - Be at most 200 characters long
    pub fn validate_title(title: &str) -> Result<()> {
        let trimmed = title.trim();

        if trimmed.is_empty() {
            return Err(DomainError::empty_field("title"));
        }

        if title.chars().count() > 200 {
            return Err(DomainError::Validation(
                "Title must be at most 200 characters long".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate a task description (required, at most 2000 characters)
    pub fn validate_description(description: &str) -> Result<()> {
        let trimmed = description.trim();

        if trimmed.is_empty() {
            return Err(DomainError::empty_field("description"));
        }

        if description.chars().count() > 2000 {
            return Err(DomainError::Validation(
                "Description must be at most 2000 characters long".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate a subtask description (optional, at most 500 characters)
    pub fn validate_subtask_description(description: &str) -> Result<()> {
        if description.chars().count() > 500 {
            return Err(DomainError::Validation(
                "Subtask description must be at most 500 characters long".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a progress percentage (0-100)
    pub fn validate_percentage(percentage: i64) -> Result<u8> {
        if !(0..=100).contains(&percentage) {
            return Err(DomainError::invalid_field(
                "progress_percentage",
                &format!("must be between 0 and 100, got {percentage}"),
            ));
        }
        Ok(percentage as u8)
    }

    /// Validate an ISO-8601 due date (YYYY-MM-DD)
    pub fn validate_due_date(due_date: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(due_date, "%Y-%m-%d").map_err(|_| {
            DomainError::invalid_field("due_date", &format!("'{due_date}' is not an ISO-8601 date"))
        })
    }

    /// Validate a label (non-empty after trimming, at most 50 characters)
    pub fn normalize_labels(labels: &[String]) -> Vec<String> {
        labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && l.chars().count() <= 50)
            .map(|l| l.to_string())
            .collect()
    }

    /// Normalise a single assignee handle (lenient path).
    ///
    /// Strips a leading `@`, resolves legacy aliases against the role
    /// registry and re-prefixes with `@`. Unknown slugs are preserved
    /// verbatim so stored data is never dropped on update.
    pub fn normalize_assignee(assignee: &str) -> Option<String> {
        let trimmed = assignee.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(resolved) = resolve_legacy_role(trimmed) {
            return Some(format!("@{resolved}"));
        }

        if let Some(stripped) = trimmed.strip_prefix('@') {
            if stripped.is_empty() {
                return None;
            }
            return Some(trimmed.to_string());
        }

        Some(trimmed.to_string())
    }

    /// Normalise a list of assignees (lenient path used on update).
    pub fn normalize_assignees(assignees: &[String]) -> Vec<String> {
        assignees.iter().filter_map(|a| Self::normalize_assignee(a)).collect()
    }

    /// Validate and normalise a list of assignees (strict path used on
    /// creation). Unknown slugs are rejected.
    pub fn validate_assignee_list(assignees: &[String]) -> Result<Vec<String>> {
        let mut validated = Vec::new();
        let mut invalid = Vec::new();

        for assignee in assignees {
            let trimmed = assignee.trim();
            if trimmed.is_empty() {
                continue;
            }

            match resolve_legacy_role(trimmed) {
                Some(resolved) => validated.push(format!("@{resolved}")),
                None => invalid.push(trimmed.to_string()),
            }
        }

        if !invalid.is_empty() {
            return Err(DomainError::Validation(format!(
                "Invalid assignees: {invalid:?}. Assignees must resolve against the agent-role registry."
            )));
        }

        Ok(validated)
    }

    /// Check that at least one assignee survives normalisation
    pub fn require_assignees(assignees: &[String]) -> Result<()> {
        if assignees.iter().all(|a| a.trim().is_empty()) {
            return Err(DomainError::empty_field("assignees"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_boundaries() {
        assert!(TaskValidator::validate_title("Build API").is_ok());
        assert!(TaskValidator::validate_title(&"a".repeat(200)).is_ok());
        assert!(TaskValidator::validate_title(&"a".repeat(201)).is_err());
        assert!(TaskValidator::validate_title("").is_err());
        assert!(TaskValidator::validate_title("   ").is_err());
    }

    #[test]
    fn test_description_boundaries() {
        assert!(TaskValidator::validate_description("A thing to build").is_ok());
        assert!(TaskValidator::validate_description(&"d".repeat(2000)).is_ok());
        assert!(TaskValidator::validate_description(&"d".repeat(2001)).is_err());
        assert!(TaskValidator::validate_description("").is_err());

        assert!(TaskValidator::validate_subtask_description("").is_ok());
        assert!(TaskValidator::validate_subtask_description(&"d".repeat(500)).is_ok());
        assert!(TaskValidator::validate_subtask_description(&"d".repeat(501)).is_err());
    }

    #[test]
    fn test_percentage_boundaries() {
        assert_eq!(TaskValidator::validate_percentage(0).unwrap(), 0);
        assert_eq!(TaskValidator::validate_percentage(100).unwrap(), 100);
        assert!(TaskValidator::validate_percentage(-1).is_err());
        assert!(TaskValidator::validate_percentage(101).is_err());
    }

    #[test]
    fn test_due_date_parsing() {
        assert!(TaskValidator::validate_due_date("2026-03-01").is_ok());
        assert!(TaskValidator::validate_due_date("01/03/2026").is_err());
        assert!(TaskValidator::validate_due_date("not a date").is_err());
    }

    #[test]
    fn test_assignee_normalization_lenient() {
        // Canonical role with or without @ resolves to @slug
        assert_eq!(
            TaskValidator::normalize_assignee("coding-agent").as_deref(),
            Some("@coding-agent")
        );
        assert_eq!(
            TaskValidator::normalize_assignee("@coding-agent").as_deref(),
            Some("@coding-agent")
        );
        // Legacy alias resolves
        assert_eq!(
            TaskValidator::normalize_assignee("senior_developer").as_deref(),
            Some("@coding-agent")
        );
        // Unknown with @ prefix kept as is
        assert_eq!(
            TaskValidator::normalize_assignee("@mystery-agent").as_deref(),
            Some("@mystery-agent")
        );
        // Unknown without prefix kept verbatim
        assert_eq!(TaskValidator::normalize_assignee("mystery").as_deref(), Some("mystery"));
        // Empty dropped
        assert_eq!(TaskValidator::normalize_assignee("   "), None);
        assert_eq!(TaskValidator::normalize_assignee("@"), None);
    }

    #[test]
    fn test_assignee_validation_strict() {
        let ok = TaskValidator::validate_assignee_list(&[
            "coding-agent".to_string(),
            "@devops-agent".to_string(),
            "qa_engineer".to_string(),
        ])
        .unwrap();
        assert_eq!(ok, vec!["@coding-agent", "@devops-agent", "@test-orchestrator-agent"]);

        let err = TaskValidator::validate_assignee_list(&["nobody-in-particular".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn test_label_normalization() {
        let labels = vec![
            " backend ".to_string(),
            "".to_string(),
            "x".repeat(51),
            "api".to_string(),
        ];
        assert_eq!(TaskValidator::normalize_labels(&labels), vec!["backend", "api"]);
    }
}
