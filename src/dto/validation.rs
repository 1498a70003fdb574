//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_NAME_LEN: usize = 32;

/// Validates a contestant display name: 1 to 32 visible characters, no control characters.
///
/// # Examples
///
/// ```ignore
/// validate_contestant_name("Ada")      // Ok
/// validate_contestant_name("   ")      // Err - blank
/// validate_contestant_name("Ada\nBob") // Err - control character
/// ```
pub fn validate_contestant_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        let mut err = ValidationError::new("contestant_name_length");
        err.message = Some(
            format!("Contestant name must be 1 to {MAX_NAME_LEN} characters (got {})", trimmed.chars().count())
                .into(),
        );
        return Err(err);
    }

    if name.chars().any(char::is_control) {
        let mut err = ValidationError::new("contestant_name_format");
        err.message = Some("Contestant name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a text field is not blank.
pub fn validate_not_blank(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}
