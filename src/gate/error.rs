//! Error types for the admission gate
//!
//! Every gate error is a synchronous input-validation failure. Nothing in the
//! gate performs I/O, so there is no transient category.

use thiserror::Error;

use super::MAX_COOLDOWN_SECS;

/// Errors that can occur during gate bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// User id was zero
    #[error("Invalid user id: {0}")]
    InvalidUserId(u64),

    /// Command name was empty or blank
    #[error("Invalid command name: {0:?}")]
    InvalidCommandName(String),

    /// Cooldown outside the accepted window
    #[error("Invalid cooldown duration: {0}s (must be between 0 and {max}s)", max = MAX_COOLDOWN_SECS)]
    InvalidDuration(u32),

    /// Invocation id was empty
    #[error("Invalid invocation id")]
    InvalidInvocationId,

    /// Removal key was empty
    #[error("Invalid removal key")]
    InvalidKey,
}

/// Result type for gate operations
pub type GateResult<T> = Result<T, GateError>;

pub(crate) fn validate_user(user_id: u64) -> GateResult<()> {
    if user_id == 0 {
        return Err(GateError::InvalidUserId(user_id));
    }
    Ok(())
}

pub(crate) fn validate_command_name(name: &str) -> GateResult<()> {
    if name.trim().is_empty() {
        return Err(GateError::InvalidCommandName(name.to_string()));
    }
    Ok(())
}

pub(crate) fn validate_duration(secs: u32) -> GateResult<()> {
    if secs > MAX_COOLDOWN_SECS {
        return Err(GateError::InvalidDuration(secs));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GateError::InvalidUserId(0);
        assert_eq!(error.to_string(), "Invalid user id: 0");

        let error = GateError::InvalidCommandName("  ".to_string());
        assert_eq!(error.to_string(), "Invalid command name: \"  \"");

        let error = GateError::InvalidDuration(301);
        assert_eq!(
            error.to_string(),
            "Invalid cooldown duration: 301s (must be between 0 and 300s)"
        );
    }

    #[test]
    fn test_validators() {
        assert!(validate_user(1).is_ok());
        assert_eq!(validate_user(0), Err(GateError::InvalidUserId(0)));

        assert!(validate_command_name("ping").is_ok());
        assert!(validate_command_name("").is_err());
        assert!(validate_command_name(" \t").is_err());

        assert!(validate_duration(0).is_ok());
        assert!(validate_duration(MAX_COOLDOWN_SECS).is_ok());
        assert!(validate_duration(MAX_COOLDOWN_SECS + 1).is_err());
    }
}
