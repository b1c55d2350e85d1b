//! Error types for the durable store gateway.
//!
//! Every gateway operation reports failure through `StoreError`. The gateway
//! never retries on its own; callers decide what a failed read or write means
//! for the record they are processing.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error type for durable store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    // ==================== Connectivity Errors ====================
    /// The backing store could not be reached or rejected the request.
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    // ==================== Data Errors ====================
    /// A stored item could not be encoded or decoded.
    #[error("Serialization error in table '{table}': {message}")]
    Serialization { table: String, message: String },
}

impl StoreError {
    /// Creates a new unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new serialization error for a table.
    pub fn serialization(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serialization {
            table: table.into(),
            message: message.into(),
        }
    }
}
