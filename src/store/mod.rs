//! Persistence seam for subscriptions and delivery attempt records.
//!
//! The engine consumes storage through these traits and assumes nothing
//! about the backing technology beyond atomic per-record updates. The
//! bundled [`MemoryStore`] backs tests and in-process embedding; a
//! relational implementation lives with the host application.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{DeliveryAttempt, Subscription};

/// Storage operations for webhook subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Persist a new subscription.
    async fn insert(&self, subscription: Subscription) -> Result<()>;

    /// Fetch a subscription by id.
    async fn get(&self, id: Uuid) -> Result<Option<Subscription>>;

    /// List an organization's subscriptions, newest first, optionally
    /// filtered by active flag.
    async fn list(
        &self,
        org_id: Uuid,
        active: Option<bool>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Subscription>>;

    /// Resolve the active subscriptions of an organization whose event set
    /// contains `event_type` exactly.
    async fn find_active_by_event(
        &self,
        org_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<Subscription>>;

    /// Replace a subscription record wholesale.
    async fn update(&self, subscription: Subscription) -> Result<()>;

    /// Delete a subscription. Returns false if it did not exist.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Best-effort update of the last-triggered timestamp.
    async fn touch_last_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

/// Storage operations for delivery attempt records.
///
/// Lifecycle updates are the only mutations; a record in a terminal state
/// (`Success`/`Failed`) is immutable and updates against it are an error.
/// Each attempt record is only ever mutated by the executor/scheduler pair
/// that owns it, so implementations need no record-level locking beyond
/// their own atomic update semantics.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Persist a new attempt record (status `Pending`).
    async fn insert(&self, attempt: DeliveryAttempt) -> Result<()>;

    /// Fetch an attempt record by id.
    async fn get(&self, id: Uuid) -> Result<Option<DeliveryAttempt>>;

    /// List a subscription's attempt records, newest first.
    async fn list_by_subscription(
        &self,
        subscription_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DeliveryAttempt>>;

    /// Record a successful delivery: status `Success`, response stored,
    /// `delivered_at` set, `next_retry_at` cleared.
    async fn mark_success(
        &self,
        id: Uuid,
        attempt_count: u32,
        response_code: u16,
        response_body: Option<String>,
    ) -> Result<DeliveryAttempt>;

    /// Record a failed attempt with retries remaining: status `Retrying`
    /// and `next_retry_at` set.
    #[allow(clippy::too_many_arguments)]
    async fn mark_retrying(
        &self,
        id: Uuid,
        attempt_count: u32,
        error: &str,
        response_code: Option<u16>,
        response_body: Option<String>,
        next_retry_at: DateTime<Utc>,
    ) -> Result<DeliveryAttempt>;

    /// Record a terminal failure: status `Failed`, `next_retry_at` cleared.
    async fn mark_failed(
        &self,
        id: Uuid,
        attempt_count: u32,
        error: &str,
        response_code: Option<u16>,
        response_body: Option<String>,
    ) -> Result<DeliveryAttempt>;

    /// Cascade-delete all attempt records for a subscription. Returns the
    /// number of deleted records.
    async fn delete_by_subscription(&self, subscription_id: Uuid) -> Result<u64>;
}
