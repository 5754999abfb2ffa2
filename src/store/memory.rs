//! In-process store over `tokio::sync::RwLock`-guarded maps.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, WebhookError};
use crate::models::{DeliveryAttempt, DeliveryStatus, Subscription};
use crate::store::{DeliveryStore, SubscriptionStore};

/// In-memory implementation of both store traits.
///
/// Suitable for tests and single-process embedding; nothing survives a
/// restart.
#[derive(Default)]
pub struct MemoryStore {
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
    deliveries: RwLock<HashMap<Uuid, DeliveryAttempt>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn insert(&self, subscription: Subscription) -> Result<()> {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Subscription>> {
        Ok(self.subscriptions.read().await.get(&id).cloned())
    }

    async fn list(
        &self,
        org_id: Uuid,
        active: Option<bool>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Subscription>> {
        let guard = self.subscriptions.read().await;
        let mut subs: Vec<Subscription> = guard
            .values()
            .filter(|s| s.org_id == org_id)
            .filter(|s| active.map_or(true, |a| s.active == a))
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subs.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_active_by_event(
        &self,
        org_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<Subscription>> {
        let guard = self.subscriptions.read().await;
        Ok(guard
            .values()
            .filter(|s| s.org_id == org_id && s.active && s.handles_event(event_type))
            .cloned()
            .collect())
    }

    async fn update(&self, subscription: Subscription) -> Result<()> {
        let mut guard = self.subscriptions.write().await;
        if !guard.contains_key(&subscription.id) {
            return Err(WebhookError::SubscriptionNotFound);
        }
        guard.insert(subscription.id, subscription);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.subscriptions.write().await.remove(&id).is_some())
    }

    async fn touch_last_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(sub) = self.subscriptions.write().await.get_mut(&id) {
            sub.last_triggered_at = Some(at);
        }
        Ok(())
    }
}

impl MemoryStore {
    /// Apply a lifecycle update to a non-terminal attempt record.
    async fn update_attempt<F>(&self, id: Uuid, apply: F) -> Result<DeliveryAttempt>
    where
        F: FnOnce(&mut DeliveryAttempt),
    {
        let mut guard = self.deliveries.write().await;
        let attempt = guard.get_mut(&id).ok_or(WebhookError::DeliveryNotFound)?;
        if attempt.status.is_terminal() {
            return Err(WebhookError::Storage(format!(
                "Delivery {id} is already {}",
                attempt.status.as_str()
            )));
        }
        apply(attempt);
        attempt.updated_at = Utc::now();
        Ok(attempt.clone())
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn insert(&self, attempt: DeliveryAttempt) -> Result<()> {
        self.deliveries.write().await.insert(attempt.id, attempt);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeliveryAttempt>> {
        Ok(self.deliveries.read().await.get(&id).cloned())
    }

    async fn list_by_subscription(
        &self,
        subscription_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DeliveryAttempt>> {
        let guard = self.deliveries.read().await;
        let mut attempts: Vec<DeliveryAttempt> = guard
            .values()
            .filter(|d| d.subscription_id == subscription_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        attempts.truncate(limit);
        Ok(attempts)
    }

    async fn mark_success(
        &self,
        id: Uuid,
        attempt_count: u32,
        response_code: u16,
        response_body: Option<String>,
    ) -> Result<DeliveryAttempt> {
        self.update_attempt(id, |attempt| {
            attempt.status = DeliveryStatus::Success;
            attempt.attempt_count = attempt_count;
            attempt.response_code = Some(response_code);
            attempt.response_body = response_body;
            attempt.error = None;
            attempt.next_retry_at = None;
            attempt.delivered_at = Some(Utc::now());
        })
        .await
    }

    async fn mark_retrying(
        &self,
        id: Uuid,
        attempt_count: u32,
        error: &str,
        response_code: Option<u16>,
        response_body: Option<String>,
        next_retry_at: DateTime<Utc>,
    ) -> Result<DeliveryAttempt> {
        let error = error.to_string();
        self.update_attempt(id, move |attempt| {
            attempt.status = DeliveryStatus::Retrying;
            attempt.attempt_count = attempt_count;
            attempt.response_code = response_code;
            attempt.response_body = response_body;
            attempt.error = Some(error);
            attempt.next_retry_at = Some(next_retry_at);
        })
        .await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        attempt_count: u32,
        error: &str,
        response_code: Option<u16>,
        response_body: Option<String>,
    ) -> Result<DeliveryAttempt> {
        let error = error.to_string();
        self.update_attempt(id, move |attempt| {
            attempt.status = DeliveryStatus::Failed;
            attempt.attempt_count = attempt_count;
            attempt.response_code = response_code;
            attempt.response_body = response_body;
            attempt.error = Some(error);
            attempt.next_retry_at = None;
        })
        .await
    }

    async fn delete_by_subscription(&self, subscription_id: Uuid) -> Result<u64> {
        let mut guard = self.deliveries.write().await;
        let before = guard.len();
        guard.retain(|_, d| d.subscription_id != subscription_id);
        Ok((before - guard.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WebhookPayload;
    use std::collections::HashMap as StdHashMap;

    fn subscription(org_id: Uuid, events: &[&str], active: bool) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: Uuid::new_v4(),
            org_id,
            name: "test".to_string(),
            description: None,
            url: "https://example.com/hook".to_string(),
            secret_encrypted: "enc".to_string(),
            secret_prefix: "abcd1234\u{2026}".to_string(),
            events: events.iter().map(|e| (*e).to_string()).collect(),
            active,
            headers: StdHashMap::new(),
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn attempt(subscription_id: Uuid) -> DeliveryAttempt {
        let payload =
            WebhookPayload::new(Uuid::new_v4(), "report.created", serde_json::json!({}));
        DeliveryAttempt::new(subscription_id, payload, 3)
    }

    #[tokio::test]
    async fn test_find_active_by_event_filters() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let matching = subscription(org, &["report.created"], true);
        let inactive = subscription(org, &["report.created"], false);
        let other_event = subscription(org, &["comment.created"], true);
        let other_org = subscription(Uuid::new_v4(), &["report.created"], true);

        for sub in [&matching, &inactive, &other_event, &other_org] {
            SubscriptionStore::insert(&store, sub.clone()).await.unwrap();
        }

        let found = store.find_active_by_event(org, "report.created").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, matching.id);
    }

    #[tokio::test]
    async fn test_list_respects_active_filter_and_pagination() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        for i in 0..5 {
            let mut sub = subscription(org, &["report.created"], i % 2 == 0);
            sub.created_at = Utc::now() + chrono::Duration::seconds(i);
            SubscriptionStore::insert(&store, sub).await.unwrap();
        }

        let active = store.list(org, Some(true), 100, 0).await.unwrap();
        assert_eq!(active.len(), 3);

        let page = store.list(org, None, 2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_terminal_attempt_is_immutable() {
        let store = MemoryStore::new();
        let record = attempt(Uuid::new_v4());
        let id = record.id;
        DeliveryStore::insert(&store, record).await.unwrap();

        store.mark_success(id, 1, 200, None).await.unwrap();

        let result = store.mark_failed(id, 2, "late failure", None, None).await;
        assert!(result.is_err());

        let stored = DeliveryStore::get(&store, id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Success);
        assert_eq!(stored.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_mark_retrying_sets_next_retry() {
        let store = MemoryStore::new();
        let record = attempt(Uuid::new_v4());
        let id = record.id;
        DeliveryStore::insert(&store, record).await.unwrap();

        let when = Utc::now() + chrono::Duration::seconds(60);
        let updated = store
            .mark_retrying(id, 1, "HTTP 500", Some(500), None, when)
            .await
            .unwrap();
        assert_eq!(updated.status, DeliveryStatus::Retrying);
        assert_eq!(updated.next_retry_at, Some(when));
        assert_eq!(updated.error.as_deref(), Some("HTTP 500"));
    }

    #[tokio::test]
    async fn test_cascade_delete_by_subscription() {
        let store = MemoryStore::new();
        let sub_id = Uuid::new_v4();
        for _ in 0..3 {
            DeliveryStore::insert(&store, attempt(sub_id)).await.unwrap();
        }
        DeliveryStore::insert(&store, attempt(Uuid::new_v4())).await.unwrap();

        let deleted = store.delete_by_subscription(sub_id).await.unwrap();
        assert_eq!(deleted, 3);
        assert!(store
            .list_by_subscription(sub_id, 100)
            .await
            .unwrap()
            .is_empty());
    }
}
