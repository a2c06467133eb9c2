use crate::error::{DomainError, Result};
use uuid::Uuid;

/// Generate a new canonical entity id (UUID v4, 8-4-4-4-12 form).
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Normalise an entity id to canonical 8-4-4-4-12 UUID form.
///
/// Accepts either the canonical hyphenated form or a bare 32-character hex
/// string, which is expanded. Anything else is a validation error.
pub fn normalize_id(id: &str) -> Result<String> {
    let trimmed = id.trim();
    if trimmed.len() == 32 && !trimmed.contains('-') {
        if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::invalid_field("id", "expected hexadecimal UUID"));
        }
        return Ok(format!(
            "{}-{}-{}-{}-{}",
            &trimmed[..8],
            &trimmed[8..12],
            &trimmed[12..16],
            &trimmed[16..20],
            &trimmed[20..]
        )
        .to_lowercase());
    }

    Uuid::parse_str(trimmed)
        .map(|u| u.to_string())
        .map_err(|_| DomainError::invalid_field("id", "expected UUID in 8-4-4-4-12 form"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_is_canonical() {
        let id = new_id();
        assert_eq!(id.len(), 36);
        assert_eq!(normalize_id(&id).unwrap(), id);
    }

    #[test]
    fn test_hex_input_is_expanded() {
        let canonical = "0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9";
        let hex = canonical.replace('-', "");
        assert_eq!(normalize_id(&hex).unwrap(), canonical);
    }

    #[test]
    fn test_invalid_ids_rejected() {
        assert!(normalize_id("not-a-uuid").is_err());
        assert!(normalize_id("").is_err());
        // 32 chars but not hex
        assert!(normalize_id("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn test_uppercase_hex_lowercased() {
        let canonical = "0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9";
        let upper = canonical.replace('-', "").to_uppercase();
        assert_eq!(normalize_id(&upper).unwrap(), canonical);
    }
}
