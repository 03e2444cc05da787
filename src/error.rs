use thiserror::Error;

/// Central error type for stepchain
///
/// Halting is not represented here: a halted token is a normal outcome and is
/// reported through the token itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepchainError {
    // ============================================================================
    // Run-time Errors
    // ============================================================================
    #[error("step '{step}' returned a value that does not satisfy the token contract: {detail}")]
    ContractViolation { step: String, detail: String },

    // ============================================================================
    // Assembly-time Errors
    // ============================================================================
    #[error("malformed step '{step}': expected a stateful step exposing call, {reason}")]
    MalformedStep { step: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot declare pipeline '{name}': name already in scope from {origin}")]
    NameCollision { name: String, origin: String },

    #[error("Pipeline not found: {0}")]
    UnknownPipeline(String),

    // ============================================================================
    // Token Errors
    // ============================================================================
    #[error("token shape is missing field '{field}'")]
    MissingField { field: String },

    #[error("invalid assign key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },
}

impl StepchainError {
    pub(crate) fn contract_violation(step: impl Into<String>, detail: impl Into<String>) -> Self {
        StepchainError::ContractViolation {
            step: step.into(),
            detail: detail.into(),
        }
    }
}

// Conversion to String for hosts that surface errors as plain messages
impl From<StepchainError> for String {
    fn from(error: StepchainError) -> Self {
        error.to_string()
    }
}

// Helper type alias for Results
pub type StepchainResult<T> = Result<T, StepchainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violation_display() {
        let err = StepchainError::contract_violation("broken", "expected a token, got {}");
        let msg = err.to_string();
        assert!(msg.contains("'broken'"));
        assert!(msg.contains("expected a token, got {}"));
    }

    #[test]
    fn test_name_collision_names_origin() {
        let err = StepchainError::NameCollision {
            name: "browser".to_string(),
            origin: "Router.Helpers".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot declare pipeline 'browser': name already in scope from Router.Helpers"
        );
    }

    #[test]
    fn test_error_conversion_to_string() {
        let err = StepchainError::InvalidConfig("bad init mode".to_string());
        let s: String = err.into();
        assert_eq!(s, "Invalid configuration: bad init mode");
    }

    #[test]
    fn test_invalid_key_display() {
        let err = StepchainError::InvalidKey {
            key: "1abc".to_string(),
            reason: "must start with a letter or underscore".to_string(),
        };
        assert!(err.to_string().contains("\"1abc\""));
    }
}
