//! Delivery execution: performs the network call for one attempt and
//! drives the attempt record's state machine.
//!
//! An attempt either finalizes as `Success`, finalizes as `Failed` (ceiling
//! reached, or fail-closed abort), or transitions to `Retrying` with a
//! one-shot timer handed to the [`RetryScheduler`]. Errors on this path are
//! recorded on the attempt and logged; nothing propagates to callers.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::crypto;
use crate::error::WebhookError;
use crate::models::{DeliveryAttempt, Subscription};
use crate::scheduler::RetryScheduler;
use crate::store::{DeliveryStore, SubscriptionStore};
use crate::validation;

/// Service executing delivery attempts over a shared HTTP client.
#[derive(Clone)]
pub struct DeliveryService {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    scheduler: RetryScheduler,
    http_client: Client,
    config: Arc<EngineConfig>,
    /// Bounds concurrently executing deliveries so an endpoint-outage storm
    /// queues work instead of growing unbounded in-flight I/O.
    permits: Arc<Semaphore>,
}

impl DeliveryService {
    /// Create a delivery service with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
        scheduler: RetryScheduler,
        config: Arc<EngineConfig>,
    ) -> Result<Self, WebhookError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        let permits = Arc::new(Semaphore::new(config.max_concurrent_deliveries));

        Ok(Self {
            subscriptions,
            deliveries,
            scheduler,
            http_client,
            config,
            permits,
        })
    }

    /// Execute one delivery attempt against a subscription's URL.
    ///
    /// Records the outcome on the attempt record; on a non-terminal failure
    /// the next attempt is scheduled before this call returns.
    pub async fn execute(&self, subscription: &Subscription, attempt: &DeliveryAttempt) {
        // Bounded concurrency; the semaphore is never closed.
        let _permit = self.permits.acquire().await;

        let attempt_number = attempt.attempt_count + 1;

        let body = match serde_json::to_vec(&attempt.payload) {
            Ok(b) => b,
            Err(e) => {
                self.record_failure(
                    subscription,
                    attempt,
                    attempt_number,
                    &format!("Failed to serialize payload: {e}"),
                    None,
                    None,
                )
                .await;
                return;
            }
        };

        let headers = match self.build_headers(subscription, attempt, &body) {
            Ok(h) => h,
            Err(e) => {
                self.record_failure(
                    subscription,
                    attempt,
                    attempt_number,
                    &e.to_string(),
                    None,
                    None,
                )
                .await;
                return;
            }
        };

        let start = Instant::now();
        let result = self
            .http_client
            .post(&subscription.url)
            .headers(headers)
            .body(body)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let body_excerpt = truncate_body(
                    &response.text().await.unwrap_or_default(),
                    self.config.response_body_cap,
                );

                if (200..300).contains(&status) {
                    self.record_success(subscription, attempt, attempt_number, status, body_excerpt, latency_ms)
                        .await;
                } else {
                    self.record_failure(
                        subscription,
                        attempt,
                        attempt_number,
                        &format!("HTTP {status}"),
                        Some(status),
                        Some(body_excerpt),
                    )
                    .await;
                }
            }
            Err(e) => {
                let error_msg = if e.is_timeout() {
                    format!(
                        "Request timeout ({}s)",
                        self.config.request_timeout.as_secs()
                    )
                } else if e.is_connect() {
                    format!("Connection failed: {e}")
                } else {
                    format!("Request error: {e}")
                };

                self.record_failure(subscription, attempt, attempt_number, &error_msg, None, None)
                    .await;
            }
        }
    }

    /// Build the outgoing header set: engine headers first, then the
    /// subscription's custom headers. Reserved names are enforced again
    /// here so a stale stored header can never shadow the signature.
    fn build_headers(
        &self,
        subscription: &Subscription,
        attempt: &DeliveryAttempt,
        body: &[u8],
    ) -> Result<HeaderMap, WebhookError> {
        let secret =
            crypto::decrypt_secret(&subscription.secret_encrypted, &self.config.encryption_key)?;
        let signature = crypto::compute_signature(&secret, body);

        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert(
            "X-Webhook-Signature",
            signature
                .parse()
                .map_err(|_| WebhookError::Internal("Invalid signature header".to_string()))?,
        );
        headers.insert(
            "X-Webhook-Event",
            attempt.payload.event.parse().map_err(|_| {
                WebhookError::Internal(format!("Unencodable event type: {}", attempt.payload.event))
            })?,
        );
        headers.insert(
            "X-Webhook-Id",
            attempt
                .payload
                .id
                .to_string()
                .parse()
                .map_err(|_| WebhookError::Internal("Invalid id header".to_string()))?,
        );

        for (name, value) in &subscription.headers {
            if validation::is_reserved_header(name) {
                tracing::warn!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    header = %name,
                    "Skipping stored custom header that shadows a reserved name"
                );
                continue;
            }
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                continue;
            };
            headers.insert(name, value);
        }

        Ok(headers)
    }

    /// Finalize a successful attempt.
    async fn record_success(
        &self,
        subscription: &Subscription,
        attempt: &DeliveryAttempt,
        attempt_number: u32,
        response_code: u16,
        body_excerpt: String,
        latency_ms: u64,
    ) {
        tracing::info!(
            target: "webhook_delivery",
            delivery_id = %attempt.id,
            subscription_id = %subscription.id,
            event_id = %attempt.payload.id,
            event_type = %attempt.payload.event,
            response_code,
            latency_ms,
            attempt_number,
            "Webhook delivery succeeded"
        );

        if let Err(e) = self
            .deliveries
            .mark_success(attempt.id, attempt_number, response_code, Some(body_excerpt))
            .await
        {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %attempt.id,
                error = %e,
                "Failed to record delivery success"
            );
        }
    }

    /// Record a failed attempt: terminal at the ceiling, otherwise schedule
    /// the next attempt.
    async fn record_failure(
        &self,
        subscription: &Subscription,
        attempt: &DeliveryAttempt,
        attempt_number: u32,
        error_message: &str,
        response_code: Option<u16>,
        body_excerpt: Option<String>,
    ) {
        let retries_exhausted = attempt_number >= attempt.max_attempts;

        tracing::warn!(
            target: "webhook_delivery",
            delivery_id = %attempt.id,
            subscription_id = %subscription.id,
            event_id = %attempt.payload.id,
            event_type = %attempt.payload.event,
            error = %error_message,
            attempt_number,
            has_next_retry = !retries_exhausted,
            "Webhook delivery failed"
        );

        if retries_exhausted {
            if let Err(e) = self
                .deliveries
                .mark_failed(
                    attempt.id,
                    attempt_number,
                    error_message,
                    response_code,
                    body_excerpt,
                )
                .await
            {
                tracing::error!(
                    target: "webhook_delivery",
                    delivery_id = %attempt.id,
                    error = %e,
                    "Failed to record terminal delivery failure"
                );
            }
            return;
        }

        let backoff = self.config.backoff_for(attempt_number);
        let next_retry_at = Utc::now()
            + ChronoDuration::from_std(backoff).unwrap_or_else(|_| ChronoDuration::seconds(60));

        if let Err(e) = self
            .deliveries
            .mark_retrying(
                attempt.id,
                attempt_number,
                error_message,
                response_code,
                body_excerpt,
                next_retry_at,
            )
            .await
        {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %attempt.id,
                error = %e,
                "Failed to record retryable delivery failure"
            );
            return;
        }

        // Schedule only after the outcome is recorded so attempts within one
        // chain stay strictly sequential.
        let this = self.clone();
        let attempt_id = attempt.id;
        self.scheduler
            .schedule(attempt.id, subscription.id, backoff, async move {
                this.process_retry(attempt_id).await;
            })
            .await;
    }

    /// Run a scheduled retry for an attempt.
    ///
    /// Fails closed: a subscription deleted or deactivated since the retry
    /// was scheduled finalizes the attempt without delivering.
    // Returns a boxed future rather than using `async fn`: the retry path is
    // recursive (execute -> record_failure -> schedule -> process_retry ->
    // execute), and the boxed return type is what lets the compiler prove the
    // scheduled future is `Send`.
    pub fn process_retry(
        &self,
        attempt_id: Uuid,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(self.process_retry_inner(attempt_id))
    }

    async fn process_retry_inner(&self, attempt_id: Uuid) {
        let attempt = match self.deliveries.get(attempt_id).await {
            Ok(Some(a)) if !a.status.is_terminal() => a,
            Ok(Some(_)) | Ok(None) => return,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    delivery_id = %attempt_id,
                    error = %e,
                    "Failed to load attempt record for retry"
                );
                return;
            }
        };

        match self.subscriptions.get(attempt.subscription_id).await {
            Ok(Some(sub)) if sub.active => self.execute(&sub, &attempt).await,
            Ok(Some(_)) => self.abandon(&attempt, "Subscription deactivated").await,
            Ok(None) => self.abandon(&attempt, "Subscription deleted").await,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    delivery_id = %attempt.id,
                    subscription_id = %attempt.subscription_id,
                    error = %e,
                    "Failed to load subscription for retry"
                );
            }
        }
    }

    /// Finalize an attempt whose subscription vanished or was deactivated.
    async fn abandon(&self, attempt: &DeliveryAttempt, reason: &str) {
        tracing::info!(
            target: "webhook_delivery",
            delivery_id = %attempt.id,
            subscription_id = %attempt.subscription_id,
            reason,
            "Abandoning retry"
        );
        if let Err(e) = self
            .deliveries
            .mark_failed(attempt.id, attempt.attempt_count, reason, None, None)
            .await
        {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %attempt.id,
                error = %e,
                "Failed to record abandoned delivery"
            );
        }
    }
}

/// Truncate a response body to the configured byte cap without splitting a
/// UTF-8 character.
fn truncate_body(body: &str, cap: usize) -> String {
    if body.len() <= cap {
        return body.to_string();
    }
    let mut end = cap;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
