//! Error types for the EMQX admission webhook

use thiserror::Error;

/// Errors that can occur while admitting an EMQX resource
#[derive(Error, Debug)]
pub enum WebhookError {
    /// Structural rule violated on the submitted object
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// An update attempted to change a field that is fixed after creation
    #[error("immutable field violation: {0}")]
    ImmutableFieldViolation(String),

    /// Malformed admission review or wrong resource kind
    #[error("invalid admission request: {0}")]
    InvalidRequest(String),

    /// Invalid server configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Patch could not be attached to the admission response
    #[error("Patch error: {0}")]
    Patch(String),

    /// I/O error (listener bind, certificate loading)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for webhook operations
pub type Result<T> = std::result::Result<T, WebhookError>;

impl WebhookError {
    /// Check if this error is an admission rejection the submitter can correct
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            WebhookError::InvalidSpec(_) | WebhookError::ImmutableFieldViolation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WebhookError::ImmutableFieldViolation("refuse to update username".to_string());
        assert!(err.to_string().contains("immutable"));
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn test_rejection_errors() {
        assert!(WebhookError::InvalidSpec("test".to_string()).is_rejection());
        assert!(WebhookError::ImmutableFieldViolation("test".to_string()).is_rejection());
        assert!(!WebhookError::InvalidRequest("test".to_string()).is_rejection());
        assert!(!WebhookError::Patch("test".to_string()).is_rejection());
    }
}
