//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a display name has at least one non-whitespace character.
///
/// # Examples
///
/// ```ignore
/// validate_display_name("Simran")     // Ok
/// validate_display_name("   ")        // Err - blank
/// ```
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("display_name_blank");
        err.message = Some("Display name must not be blank".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_display_name_valid() {
        assert!(validate_display_name("Simran").is_ok());
        assert!(validate_display_name("  Jas  ").is_ok());
        assert!(validate_display_name(&"ਸ".repeat(40)).is_ok());
    }

    #[test]
    fn test_validate_display_name_blank() {
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name(" \t ").is_err());
    }

    #[test]
    fn test_validate_display_name_has_no_upper_bound() {
        assert!(validate_display_name(&"a".repeat(41)).is_ok());
        assert!(validate_display_name(&"Waheguru ".repeat(50)).is_ok());
    }
}
