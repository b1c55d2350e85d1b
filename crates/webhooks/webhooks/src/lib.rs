//! # Eventgate Webhooks
//!
//! Outbound webhook delivery for Eventgate providing:
//! - Exponential backoff with additive jitter
//! - HMAC-SHA256 body signatures (`X-Signature`)
//! - A signed delivery client that retries transient failures
//!
//! ## Example
//!
//! ```rust,ignore
//! use eventgate_webhooks::{ExponentialBackoff, SignedDeliveryClient};
//!
//! let retry = ExponentialBackoff::new().max_attempts(3);
//! let client = SignedDeliveryClient::new(retry, std::time::Duration::from_secs(10))?;
//!
//! let receipt = client
//!     .deliver("https://partner.example.com/hooks", &payload, &headers, Some("secret"))
//!     .await?;
//! ```

mod delivery;
mod error;
mod retry;
mod signature;

pub use delivery::{AttemptOutcome, DeliveryReceipt, SignedDeliveryClient};
pub use error::{DeliveryError, WebhookResult};
pub use retry::{
    compute_backoff, compute_backoff_with, ExponentialBackoff, RetryStrategy,
    MAX_BACKOFF_EXPONENT,
};
pub use signature::{verify_signature, WebhookSigner, SIGNATURE_HEADER};
