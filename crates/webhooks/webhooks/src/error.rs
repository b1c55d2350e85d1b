//! Webhook error types.

use thiserror::Error;

/// Result type for webhook operations.
pub type WebhookResult<T> = Result<T, DeliveryError>;

/// Error type for webhook delivery.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Every attempt failed.
    #[error("Delivery failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last_error: String,
    },

    /// The payload could not be serialized.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The client could not be configured.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        DeliveryError::InvalidPayload(err.to_string())
    }
}
