//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::services::code_generator::{CODE_LENGTH, is_code_char, normalize};

/// Validates a join code after trimming and uppercasing it.
///
/// # Examples
///
/// ```ignore
/// validate_join_code("ab12cd")   // Ok
/// validate_join_code(" AB12CD ") // Ok
/// validate_join_code("AB12C")    // Err - too short
/// validate_join_code("AB-2CD")   // Err - invalid character
/// ```
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    let code = normalize(code);
    if code.chars().count() != CODE_LENGTH {
        let mut err = ValidationError::new("join_code_length");
        err.message = Some(
            format!(
                "Join code must be exactly {CODE_LENGTH} characters (got {})",
                code.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(is_code_char) {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("Join code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_join_code_valid() {
        assert!(validate_join_code("ABC123").is_ok());
        assert!(validate_join_code("abc123").is_ok());
        assert!(validate_join_code("  Z9Z9Z9 ").is_ok());
    }

    #[test]
    fn test_validate_join_code_invalid_length() {
        assert!(validate_join_code("ABC12").is_err()); // too short
        assert!(validate_join_code("ABC1234").is_err()); // too long
        assert!(validate_join_code("").is_err());
    }

    #[test]
    fn test_validate_join_code_invalid_format() {
        assert!(validate_join_code("ABC-12").is_err());
        assert!(validate_join_code("ABC 12").is_err());
        assert!(validate_join_code("ÀBC123").is_err());
    }
}
