//! Validation helpers for DTOs.

use validator::ValidationError;

/// Shortest accepted display name, after trimming.
pub const NAME_MIN_CHARS: usize = 2;
/// Longest accepted display name, after trimming.
pub const NAME_MAX_CHARS: usize = 20;
/// Longest accepted lobby or player identifier.
pub const IDENTIFIER_MAX_CHARS: usize = 128;
/// Highest avatar index a client may pick.
pub const AVATAR_MAX_INDEX: u32 = 63;

/// Validates a player display name: 2 to 20 characters once trimmed.
///
/// # Examples
///
/// ```ignore
/// validate_display_name("Ada")      // Ok
/// validate_display_name("  A  ")    // Err - too short once trimmed
/// ```
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let count = name.trim().chars().count();
    if count < NAME_MIN_CHARS {
        let mut err = ValidationError::new("name_too_short");
        err.message = Some(format!("Name must be at least {NAME_MIN_CHARS} characters").into());
        return Err(err);
    }
    if count > NAME_MAX_CHARS {
        let mut err = ValidationError::new("name_too_long");
        err.message = Some(format!("Name must be at most {NAME_MAX_CHARS} characters").into());
        return Err(err);
    }
    Ok(())
}

/// Validates a lobby or player identifier: non-empty, bounded, no whitespace.
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    let count = id.chars().count();
    if count == 0 || count > IDENTIFIER_MAX_CHARS {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!("Identifier must be 1 to {IDENTIFIER_MAX_CHARS} characters (got {count})")
                .into(),
        );
        return Err(err);
    }

    if id.chars().any(char::is_whitespace) {
        let mut err = ValidationError::new("identifier_format");
        err.message = Some("Identifier must not contain whitespace".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Ada").is_ok());
        assert!(validate_display_name("  Bo  ").is_ok());
        assert!(validate_display_name("CleverNinja123456789").is_ok()); // 20 chars
        assert!(validate_display_name("A").is_err());
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name("CleverNinja1234567890").is_err()); // 21 chars
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("quiz-42").is_ok());
        assert!(validate_identifier("player_1712_abc123xyz").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("has space").is_err());
        assert!(validate_identifier(&"x".repeat(129)).is_err());
    }
}
