//! Signed, retried webhook delivery.

use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{DeliveryError, WebhookResult};
use crate::retry::{ExponentialBackoff, RetryStrategy};
use crate::signature::{WebhookSigner, SIGNATURE_HEADER};

/// Longest slice of a failed response body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Result of a single HTTP attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The endpoint answered with a 2xx status.
    Delivered {
        /// HTTP status code.
        status: u16,
    },
    /// Non-2xx answer or transport failure. Always retryable.
    Failed {
        /// What went wrong.
        error: String,
    },
}

/// Successful delivery summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// HTTP status returned by the endpoint.
    pub status: u16,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// HTTP client that POSTs signed JSON payloads and retries failures.
pub struct SignedDeliveryClient<R: RetryStrategy = ExponentialBackoff> {
    client: reqwest::Client,
    retry_strategy: R,
}

impl<R: RetryStrategy> SignedDeliveryClient<R> {
    /// Creates a new delivery client.
    pub fn new(retry_strategy: R, request_timeout: Duration) -> WebhookResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("eventgate-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retry_strategy,
        })
    }

    /// Delivers `payload` to `url`.
    ///
    /// The payload is serialized once; every attempt sends the same bytes and,
    /// when `secret` is given, the same `X-Signature` computed over them.
    /// Fails with [`DeliveryError::Exhausted`] once the retry strategy runs
    /// out of attempts.
    pub async fn deliver<P: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &P,
        headers: &HashMap<String, String>,
        secret: Option<&str>,
    ) -> WebhookResult<DeliveryReceipt> {
        let body = serde_json::to_vec(payload)?;
        let signature = secret.map(|s| WebhookSigner::new(s).sign(&body));

        let mut attempts = 0;
        loop {
            attempts += 1;

            match self.attempt(url, &body, headers, signature.as_deref()).await {
                AttemptOutcome::Delivered { status } => {
                    tracing::info!(
                        target: "webhook_delivery",
                        url,
                        status,
                        attempts,
                        "Webhook delivered"
                    );
                    return Ok(DeliveryReceipt { status, attempts });
                }
                AttemptOutcome::Failed { error } => {
                    let Some(delay) = self.retry_strategy.next_delay(attempts) else {
                        tracing::warn!(
                            target: "webhook_delivery",
                            url,
                            attempts,
                            error = %error,
                            "Webhook delivery attempts exhausted"
                        );
                        return Err(DeliveryError::Exhausted {
                            attempts,
                            last_error: error,
                        });
                    };

                    tracing::debug!(
                        target: "webhook_delivery",
                        url,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Webhook attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Performs one POST and classifies the result.
    async fn attempt(
        &self,
        url: &str,
        body: &[u8],
        headers: &HashMap<String, String>,
        signature: Option<&str>,
    ) -> AttemptOutcome {
        let start = Instant::now();

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");

        for (key, value) in headers {
            request = request.header(key, value);
        }

        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.body(body.to_vec()).send().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(target: "webhook_delivery", url, duration_ms, "Attempt succeeded");
                AttemptOutcome::Delivered {
                    status: resp.status().as_u16(),
                }
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let text = resp.text().await.unwrap_or_default();
                let snippet: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
                AttemptOutcome::Failed {
                    error: format!("HTTP {status}: {snippet}"),
                }
            }
            Err(e) if e.is_timeout() => AttemptOutcome::Failed {
                error: format!("Request timeout after {duration_ms}ms"),
            },
            Err(e) => AttemptOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}
