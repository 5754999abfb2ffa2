//! Retry scheduling for failed delivery attempts.
//!
//! Each retry is an independent one-shot tokio task keyed by attempt id, so
//! one subscription's backlog never blocks another's. Deleting a
//! subscription cancels its scheduled tasks outright.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A scheduled one-shot retry task.
struct RetryTask {
    subscription_id: Uuid,
    handle: JoinHandle<()>,
}

/// Owns the set of pending retry timers, keyed by attempt id.
#[derive(Clone, Default)]
pub struct RetryScheduler {
    tasks: Arc<RwLock<HashMap<Uuid, RetryTask>>>,
}

impl RetryScheduler {
    /// Create a scheduler with no pending tasks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrange for `retry` to run after `delay`.
    ///
    /// Scheduling a second task for the same attempt id replaces (and
    /// cancels) the first; within one delivery's retry chain this never
    /// happens because attempt N+1 is only scheduled after attempt N's
    /// outcome is recorded.
    pub async fn schedule<F>(&self, attempt_id: Uuid, subscription_id: Uuid, delay: Duration, retry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Take the lock before spawning: the task's self-removal waits on
        // it, so even a zero-delay task cannot race past its own insert.
        let mut guard = self.tasks.write().await;

        let tasks = Arc::clone(&self.tasks);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            retry.await;
            tasks.write().await.remove(&attempt_id);
        });

        if let Some(stale) = guard.insert(
            attempt_id,
            RetryTask {
                subscription_id,
                handle,
            },
        ) {
            stale.handle.abort();
        }
    }

    /// Cancel the scheduled retry for one attempt, if any.
    pub async fn cancel(&self, attempt_id: Uuid) {
        if let Some(task) = self.tasks.write().await.remove(&attempt_id) {
            task.handle.abort();
        }
    }

    /// Cancel every scheduled retry belonging to a subscription.
    ///
    /// Called on subscription delete; anything already past its timer still
    /// fails closed when the executor re-loads the subscription.
    pub async fn cancel_for_subscription(&self, subscription_id: Uuid) {
        let mut guard = self.tasks.write().await;
        let ids: Vec<Uuid> = guard
            .iter()
            .filter(|(_, t)| t.subscription_id == subscription_id)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(task) = guard.remove(&id) {
                task.handle.abort();
            }
        }
    }

    /// Number of currently scheduled retries.
    pub async fn scheduled_count(&self) -> usize {
        self.tasks.read().await.len()
    }
}
