//! Waiters for queued operations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex, MutexGuard};

use crate::api::ApiResponse;
use crate::error::{Error, Result};
use crate::models::QueuedOperation;

pub(crate) type Waiters = HashMap<i64, oneshot::Sender<Result<ApiResponse>>>;

/// Maps queued operation ids to the callers waiting on their outcome
#[derive(Clone, Default)]
pub struct CompletionRegistry {
    waiters: Arc<Mutex<Waiters>>,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the registry while enqueueing so the driver cannot settle the
    /// new id before its waiter is inserted.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().await
    }

    /// Register a waiter for an operation that is already queued
    pub async fn register(&self, operation: QueuedOperation) -> PendingOperation {
        let mut waiters = self.lock().await;
        PendingOperation::register(&mut waiters, operation)
    }

    /// Deliver the final outcome of `id`; returns whether anyone was waiting
    pub async fn settle(&self, id: i64, outcome: Result<ApiResponse>) -> bool {
        let Some(sender) = self.lock().await.remove(&id) else {
            return false;
        };
        if sender.send(outcome).is_err() {
            tracing::debug!("Waiter for operation #{id} went away before settlement");
            return false;
        }
        true
    }

    pub async fn waiting(&self) -> usize {
        self.lock().await.len()
    }

    /// Drop every waiter; their handles resolve to [`Error::Abandoned`]
    pub async fn clear(&self) {
        self.lock().await.clear();
    }
}

/// Handle returned for an operation queued instead of executed
#[derive(Debug)]
pub struct PendingOperation {
    operation: QueuedOperation,
    receiver: oneshot::Receiver<Result<ApiResponse>>,
}

impl PendingOperation {
    pub(crate) fn register(waiters: &mut Waiters, operation: QueuedOperation) -> Self {
        let (sender, receiver) = oneshot::channel();
        waiters.insert(operation.id, sender);
        Self {
            operation,
            receiver,
        }
    }

    pub const fn id(&self) -> i64 {
        self.operation.id
    }

    /// The queue record as it was when the operation was enqueued
    pub const fn operation(&self) -> &QueuedOperation {
        &self.operation
    }

    /// Resolve once the driver completes or terminally fails the operation
    pub async fn wait(self) -> Result<ApiResponse> {
        let id = self.operation.id;
        self.receiver
            .await
            .unwrap_or_else(|_| Err(Error::Abandoned(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OperationKind, OperationStatus};
    use serde_json::json;

    fn queued(id: i64) -> QueuedOperation {
        QueuedOperation {
            id,
            kind: OperationKind::Create,
            endpoint: "/alerts".to_string(),
            method: "POST".to_string(),
            payload: json!({}),
            idempotency_key: format!("key-{id}"),
            depends_on: None,
            created_at: 0,
            status: OperationStatus::Pending,
            retries: 0,
            max_retries: 3,
            last_error: None,
            last_attempt: None,
            completed_at: None,
            next_attempt_at: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn settle_delivers_to_waiter() {
        let registry = CompletionRegistry::new();
        let pending = registry.register(queued(4)).await;
        assert_eq!(registry.waiting().await, 1);

        assert!(
            registry
                .settle(4, Ok(ApiResponse::new(201, json!({"id": 9}))))
                .await
        );
        let response = pending.wait().await.unwrap();
        assert_eq!(response.data, json!({"id": 9}));
        assert_eq!(registry.waiting().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn settle_without_waiter_is_noop() {
        let registry = CompletionRegistry::new();
        assert!(!registry.settle(1, Ok(ApiResponse::new(200, json!(null)))).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cleared_waiter_reports_abandoned() {
        let registry = CompletionRegistry::new();
        let pending = registry.register(queued(2)).await;
        registry.clear().await;

        let error = pending.wait().await.unwrap_err();
        assert!(matches!(error, Error::Abandoned(2)));
    }
}
