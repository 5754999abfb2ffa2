//! Data model for webhook subscriptions, delivery attempts, and payloads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A registered webhook subscription as held by the store.
///
/// The secret is stored AES-256-GCM encrypted and is never serialized out of
/// the engine; listings expose only `secret_prefix`.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Unique identifier for this subscription.
    pub id: Uuid,

    /// The organization this subscription belongs to.
    pub org_id: Uuid,

    /// Human-readable name.
    pub name: String,

    /// Optional description.
    pub description: Option<String>,

    /// Target URL (http or https).
    pub url: String,

    /// AES-256-GCM encrypted signing secret (write-once; replaced only by
    /// an explicit secret rotation).
    pub secret_encrypted: String,

    /// Masked prefix of the secret for operator identification.
    pub secret_prefix: String,

    /// Subscribed event types, matched exactly against triggered events.
    pub events: Vec<String>,

    /// Whether this subscription receives new events.
    pub active: bool,

    /// Custom headers merged into each delivery request.
    pub headers: HashMap<String, String>,

    /// When an event last matched this subscription (best-effort).
    pub last_triggered_at: Option<DateTime<Utc>>,

    /// When the subscription was created.
    pub created_at: DateTime<Utc>,

    /// When the subscription was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Check whether this subscription is subscribed to a given event type.
    #[must_use]
    pub fn handles_event(&self, event_type: &str) -> bool {
        self.events.iter().any(|e| e == event_type)
    }
}

/// Public view of a subscription. Never carries the raw or encrypted secret.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub secret_prefix: String,
    pub events: Vec<String>,
    pub active: bool,
    pub headers: HashMap<String, String>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionInfo {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            org_id: sub.org_id,
            name: sub.name,
            description: sub.description,
            url: sub.url,
            secret_prefix: sub.secret_prefix,
            events: sub.events,
            active: sub.active,
            headers: sub.headers,
            last_triggered_at: sub.last_triggered_at,
            created_at: sub.created_at,
            updated_at: sub.updated_at,
        }
    }
}

/// Input for creating a subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscription {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Partial update for a subscription. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSubscription {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub active: Option<bool>,
    pub headers: Option<HashMap<String, String>>,
}

/// Result of creating a subscription or rotating its secret.
///
/// This is the only place the raw secret ever appears; no read operation
/// returns it again.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSubscription {
    #[serde(flatten)]
    pub subscription: SubscriptionInfo,
    pub secret: String,
}

// ---------------------------------------------------------------------------
// Delivery attempts
// ---------------------------------------------------------------------------

/// Lifecycle state of a delivery attempt record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created by dispatch, not yet executed.
    #[default]
    Pending,
    /// Failed at least once; a retry is scheduled.
    Retrying,
    /// Delivered and acknowledged with a 2xx response.
    Success,
    /// Exhausted all attempts, or aborted fail-closed.
    Failed,
}

impl DeliveryStatus {
    /// String representation used in stored records and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parse from the stored string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "retrying" => Some(Self::Retrying),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// The persisted state of one delivery's lifecycle, including its retries.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryAttempt {
    /// Unique identifier for this attempt record.
    pub id: Uuid,

    /// The subscription this delivery targets.
    pub subscription_id: Uuid,

    /// Event type being delivered.
    pub event_type: String,

    /// Payload snapshot; immutable once created, identical across retries.
    pub payload: WebhookPayload,

    /// Current lifecycle state.
    pub status: DeliveryStatus,

    /// HTTP status code of the most recent response, if any.
    pub response_code: Option<u16>,

    /// Size-capped excerpt of the most recent response body.
    pub response_body: Option<String>,

    /// Most recent error message (timeout, connection failure, HTTP error).
    pub error: Option<String>,

    /// Number of executed attempts. Never exceeds `max_attempts`.
    pub attempt_count: u32,

    /// Ceiling on attempts before the record goes terminal.
    pub max_attempts: u32,

    /// When the next retry fires. Non-null iff status is `Retrying`.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// When delivery succeeded. Non-null iff status is `Success`.
    pub delivered_at: Option<DateTime<Utc>>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// Create a fresh `Pending` record for one delivery.
    #[must_use]
    pub fn new(subscription_id: Uuid, payload: WebhookPayload, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            event_type: payload.event.clone(),
            payload,
            status: DeliveryStatus::Pending,
            response_code: None,
            response_body: None,
            error: None,
            attempt_count: 0,
            max_attempts,
            next_retry_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire payload
// ---------------------------------------------------------------------------

/// JSON envelope delivered to subscriber endpoints.
///
/// `id` is unique per logical event occurrence: every subscription notified
/// of that occurrence, and every retry of one delivery, carries the same id,
/// so subscribers can deduplicate on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub id: Uuid,
    pub event: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "organizationId")]
    pub organization_id: Uuid,
    pub data: serde_json::Value,
}

impl WebhookPayload {
    /// Build the envelope for a new logical event occurrence.
    #[must_use]
    pub fn new(org_id: Uuid, event_type: &str, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event: event_type.to_string(),
            timestamp: Utc::now(),
            organization_id: org_id,
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Aggregated delivery statistics for one subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStats {
    pub total_deliveries: u64,
    pub successful: u64,
    pub failed: u64,
    pub retrying: u64,
    pub pending: u64,
    /// Fraction of terminal deliveries that succeeded, in [0, 1].
    /// Zero when nothing has been delivered yet.
    pub success_rate: f64,
    pub last_delivery_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
