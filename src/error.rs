//! Error types for the webhook engine.

/// Webhook engine error variants.
///
/// Only management-path errors (subscription CRUD, manual test delivery)
/// reach callers. Delivery failures are recorded on the attempt record and
/// drive the retry state machine instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("SSRF protection: {0}")]
    SsrfDetected(String),

    #[error("Subscription not found")]
    SubscriptionNotFound,

    #[error("Delivery not found")]
    DeliveryNotFound,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
