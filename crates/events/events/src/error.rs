//! Pipeline error types.

use eventgate_core::StoreError;
use eventgate_webhooks::DeliveryError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error raised while processing a single stream record.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The record value is absent or not base64-encoded JSON.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A required envelope field is missing.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Every attempt to reach the partner endpoint failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Forwarding to the egress stream failed.
    #[error("Publish error: {0}")]
    Publish(String),
}

impl PipelineError {
    /// Returns true when redelivering the record may succeed. Decode and
    /// validation failures are properties of the bytes themselves.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PipelineError::Decode(_) | PipelineError::Validation(_))
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Decode(_) => "decode",
            PipelineError::Validation(_) => "validation",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Delivery(_) => "delivery",
            PipelineError::Store(_) => "store",
            PipelineError::Publish(_) => "publish",
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for PipelineError {
    fn from(err: base64::DecodeError) -> Self {
        PipelineError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_input_is_not_retryable() {
        let err = PipelineError::Decode("bad".into());
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "decode");

        let err: PipelineError = StoreError::unavailable("down").into();
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "store");
    }

    #[test]
    fn test_delivery_error_is_transparent() {
        let inner = DeliveryError::Exhausted {
            attempts: 3,
            last_error: "HTTP 500: boom".into(),
        };
        let err = PipelineError::from(inner.clone());
        assert_eq!(err.to_string(), inner.to_string());
        assert!(err.is_retryable());
    }
}
