//! Single entry point for mutating calls against the backend.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;

use crate::api::{request_with_timeout, ApiError, ApiRequest, ApiResponse, RemoteApi};
use crate::config::SyncSettings;
use crate::connectivity::ConnectivityMonitor;
use crate::db::{ConflictLog, LocalCache, Store, SyncQueue};
use crate::error::{Error, Result};
use crate::models::{NewOperation, OperationStatus};
use crate::state::SyncState;
use crate::sync::{CompletionRegistry, DriverParts, PendingOperation, SyncDriver};

/// Where the durable store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Path(PathBuf),
    InMemory,
}

/// Outcome of [`OfflineSyncService::execute`]
#[derive(Debug)]
pub enum Execution {
    /// The backend accepted the call right away
    Completed(ApiResponse),
    /// The call was queued; await the handle for its eventual outcome
    Queued(PendingOperation),
}

impl Execution {
    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub is_online: bool,
}

/// Offline-first front door to the backend
///
/// Online calls go straight to the API; offline calls are queued and replayed
/// by the background driver. The store and driver are created on first use.
pub struct OfflineSyncService<A: RemoteApi> {
    inner: Arc<ServiceInner<A>>,
}

impl<A: RemoteApi> Clone for OfflineSyncService<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct ServiceInner<A: RemoteApi> {
    api: Arc<A>,
    location: StoreLocation,
    settings: SyncSettings,
    connectivity: ConnectivityMonitor,
    completions: CompletionRegistry,
    background_sync: AtomicBool,
    components: OnceCell<Components<A>>,
}

struct Components<A: RemoteApi> {
    store: Store,
    queue: SyncQueue,
    cache: LocalCache,
    conflicts: ConflictLog,
    driver: SyncDriver<A>,
}

impl<A: RemoteApi> OfflineSyncService<A> {
    pub fn new(api: A, location: StoreLocation, settings: SyncSettings) -> Result<Self> {
        Self::with_connectivity(api, location, settings, ConnectivityMonitor::default())
    }

    /// Build the service around an existing connectivity monitor
    pub fn with_connectivity(
        api: A,
        location: StoreLocation,
        settings: SyncSettings,
        connectivity: ConnectivityMonitor,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            inner: Arc::new(ServiceInner {
                api: Arc::new(api),
                location,
                settings,
                connectivity,
                completions: CompletionRegistry::new(),
                background_sync: AtomicBool::new(true),
                components: OnceCell::new(),
            }),
        })
    }

    /// Skip the timer and connectivity listener at initialization
    ///
    /// Queued work then only drains through explicit [`SyncDriver::sync`]
    /// calls. Has no effect once the service is initialized.
    pub fn disable_background_sync(&self) {
        self.inner.background_sync.store(false, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.components.initialized()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.inner.connectivity
    }

    pub fn api(&self) -> &A {
        &self.inner.api
    }

    async fn components(&self) -> Result<&Components<A>> {
        self.inner
            .components
            .get_or_try_init(|| async { self.initialize() })
            .await
    }

    fn initialize(&self) -> Result<Components<A>> {
        let inner = &self.inner;
        let store = match &inner.location {
            StoreLocation::Path(path) => Store::open(path)?,
            StoreLocation::InMemory => Store::open_in_memory()?,
        };
        let queue = SyncQueue::new(store.clone(), &inner.settings);
        let cache = LocalCache::new(store.clone());
        let conflicts = ConflictLog::new(store.clone());
        let driver = SyncDriver::new(DriverParts {
            api: inner.api.clone(),
            queue: queue.clone(),
            conflicts: conflicts.clone(),
            connectivity: inner.connectivity.clone(),
            completions: inner.completions.clone(),
            request_timeout: inner.settings.request_timeout(),
            sync_interval: inner.settings.sync_interval(),
        });

        if inner.background_sync.load(Ordering::SeqCst) {
            driver.spawn_connectivity_listener();
            if inner.connectivity.is_online() {
                driver.start_sync(inner.settings.sync_interval());
            }
        }
        tracing::info!("Offline sync service initialized");

        Ok(Components {
            store,
            queue,
            cache,
            conflicts,
            driver,
        })
    }

    /// Run `operation` now when online, otherwise queue it
    ///
    /// An online attempt that fails is queued for retry and the failure is
    /// still returned. A conflict is recorded in the conflict log and
    /// returned as [`Error::Conflict`] without queueing. An operation whose
    /// predecessor is still queued is queued behind it, and one whose
    /// predecessor failed is rejected without a call.
    pub async fn execute(&self, operation: NewOperation) -> Result<Execution> {
        let components = self.components().await?;

        if !self.inner.connectivity.is_online() {
            tracing::debug!("Offline; queueing {} {}", operation.method, operation.endpoint);
            return self.enqueue_with_waiter(components, operation).await;
        }

        if let Some(predecessor) = operation.depends_on {
            let status = components
                .queue
                .get(predecessor)
                .await?
                .map(|record| record.status);
            match status {
                Some(OperationStatus::Pending) => {
                    tracing::debug!("Predecessor #{predecessor} still queued; queueing behind it");
                    return self.enqueue_with_waiter(components, operation).await;
                }
                Some(OperationStatus::Failed) => {
                    return Err(Error::DependencyFailed { predecessor });
                }
                Some(OperationStatus::Completed) => {}
                None => {
                    return Err(Error::InvalidInput(format!(
                        "operation depends on unknown operation #{predecessor}"
                    )));
                }
            }
        }

        let outcome = request_with_timeout(
            self.inner.api.as_ref(),
            ApiRequest::from(&operation),
            self.inner.settings.request_timeout(),
        )
        .await;

        match outcome {
            Ok(response) => Ok(Execution::Completed(response)),
            Err(ApiError::Conflict { server_data }) => {
                let context = json!({
                    "kind": operation.kind,
                    "method": operation.method,
                    "endpoint": operation.endpoint,
                });
                let conflict_id = components
                    .conflicts
                    .record_conflict(&operation.payload, &server_data, &context)
                    .await?;
                Err(Error::Conflict { conflict_id })
            }
            Err(error) => {
                let queued = components.queue.enqueue(operation).await?;
                tracing::warn!(
                    "Direct call failed ({error}); queued as operation #{} for retry",
                    queued.id
                );
                Err(error.into())
            }
        }
    }

    // The registry stays locked across the insert so the driver cannot settle
    // the new id before its waiter exists
    async fn enqueue_with_waiter(
        &self,
        components: &Components<A>,
        operation: NewOperation,
    ) -> Result<Execution> {
        let mut waiters = self.inner.completions.lock().await;
        let queued = components.queue.enqueue(operation).await?;
        tracing::debug!("Queued operation #{}", queued.id);
        Ok(Execution::Queued(PendingOperation::register(
            &mut waiters,
            queued,
        )))
    }

    pub async fn get_queue_status(&self) -> Result<QueueStatus> {
        let components = self.components().await?;
        Ok(QueueStatus {
            pending: components.queue.pending_count().await?,
            is_online: self.inner.connectivity.is_online(),
        })
    }

    pub async fn sync_state(&self) -> Result<SyncState> {
        if !self.inner.connectivity.is_online() {
            return Ok(SyncState::Offline);
        }
        let driver = &self.components().await?.driver;
        let state = if driver.is_draining() {
            SyncState::Syncing
        } else if driver.last_pass_failed() {
            SyncState::Error
        } else {
            SyncState::Synced
        };
        Ok(state)
    }

    pub async fn store(&self) -> Result<&Store> {
        Ok(&self.components().await?.store)
    }

    pub async fn queue(&self) -> Result<&SyncQueue> {
        Ok(&self.components().await?.queue)
    }

    pub async fn cache(&self) -> Result<&LocalCache> {
        Ok(&self.components().await?.cache)
    }

    pub async fn conflicts(&self) -> Result<&ConflictLog> {
        Ok(&self.components().await?.conflicts)
    }

    pub async fn driver(&self) -> Result<&SyncDriver<A>> {
        Ok(&self.components().await?.driver)
    }

    /// Stop background work and release pending waiters
    ///
    /// Returns once any pass in flight has finished. Queued operations stay
    /// in the store and are replayed by the next service built over it.
    pub async fn shutdown(&self) {
        if let Some(components) = self.inner.components.get() {
            components.driver.shutdown().await;
        }
        self.inner.completions.clear().await;
        tracing::info!("Offline sync service shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::Connectivity;
    use crate::models::OperationStatus;
    use crate::testing::ScriptedApi;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn service(api: &ScriptedApi, online: bool) -> OfflineSyncService<ScriptedApi> {
        OfflineSyncService::with_connectivity(
            api.clone(),
            StoreLocation::InMemory,
            SyncSettings::default(),
            ConnectivityMonitor::new(Connectivity::from_online(online)),
        )
        .unwrap()
    }

    fn expect_queued(execution: Execution) -> PendingOperation {
        match execution {
            Execution::Queued(pending) => pending,
            Execution::Completed(response) => panic!("expected a queued operation, got {response:?}"),
        }
    }

    async fn wait_for<T>(future: impl std::future::Future<Output = T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), future)
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn initializes_lazily() {
        let api = ScriptedApi::new();
        let service = service(&api, false);
        assert!(!service.is_initialized());

        let status = service.get_queue_status().await.unwrap();
        assert!(service.is_initialized());
        assert_eq!(
            status,
            QueueStatus {
                pending: 0,
                is_online: false
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_execute_queues_without_network_call() {
        let api = ScriptedApi::new();
        let service = service(&api, false);

        let pending = expect_queued(
            service
                .execute(NewOperation::create("/alerts", json!({"level": "high"})))
                .await
                .unwrap(),
        );

        assert_eq!(api.call_count(), 0);
        assert_eq!(pending.operation().status, OperationStatus::Pending);
        let status = service.get_queue_status().await.unwrap();
        assert_eq!(status.pending, 1);
        assert!(!status.is_online);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_execute_returns_response() {
        let api = ScriptedApi::new();
        api.push_ok(json!({"id": 12}));
        let service = service(&api, true);

        let execution = service
            .execute(NewOperation::create("/shipments", json!({"sku": "X"})))
            .await
            .unwrap();

        match execution {
            Execution::Completed(response) => assert_eq!(response.data, json!({"id": 12})),
            Execution::Queued(_) => panic!("expected a direct completion"),
        }
        assert_eq!(service.get_queue_status().await.unwrap().pending, 0);
        assert_eq!(api.requests()[0].idempotency_key, None);
        service.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_failure_is_queued_and_reported() {
        let api = ScriptedApi::new();
        api.push_network_error();
        let service = service(&api, true);

        let error = service
            .execute(NewOperation::update("/sensors/3", json!({"temp_c": 5})))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Network(_)));
        // The background timer may already have replayed it
        let queue = service.queue().await.unwrap();
        let queued = queue.list(None, 10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].endpoint, "/sensors/3");
        assert_eq!(queued[0].payload, json!({"temp_c": 5}));
        service.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_conflict_is_recorded_not_queued() {
        let api = ScriptedApi::new();
        api.push_conflict(json!({"temp_c": 9}));
        let service = service(&api, true);

        let error = service
            .execute(NewOperation::update("/sensors/3", json!({"temp_c": 5})))
            .await
            .unwrap_err();

        let Error::Conflict { conflict_id } = error else {
            panic!("expected a conflict, got {error:?}");
        };
        let record = service
            .conflicts()
            .await
            .unwrap()
            .get(conflict_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.local_data, json!({"temp_c": 5}));
        assert_eq!(record.server_data, json!({"temp_c": 9}));
        assert_eq!(service.get_queue_status().await.unwrap().pending, 0);
        service.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queued_operations_settle_in_order_after_reconnect() {
        let api = ScriptedApi::new();
        let service = service(&api, false);

        let a = expect_queued(
            service
                .execute(NewOperation::create("/shipments", json!({"sku": "A"})))
                .await
                .unwrap(),
        );
        let b = expect_queued(
            service
                .execute(NewOperation::update("/shipments/1", json!({"temp_c": 2})))
                .await
                .unwrap(),
        );
        let c = expect_queued(
            service
                .execute(NewOperation::delete("/alerts/5"))
                .await
                .unwrap(),
        );
        let ids = [a.id(), b.id(), c.id()];

        service.connectivity().set_online(true);
        for pending in [a, b, c] {
            wait_for(pending.wait()).await.unwrap();
        }

        assert_eq!(api.endpoints(), vec!["/shipments", "/shipments/1", "/alerts/5"]);
        let queue = service.queue().await.unwrap();
        for id in ids {
            let record = queue.get(id).await.unwrap().unwrap();
            assert_eq!(record.status, OperationStatus::Completed);
        }
        service.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_abandons_waiters() {
        let api = ScriptedApi::new();
        let service = service(&api, false);
        let pending = expect_queued(
            service
                .execute(NewOperation::create("/alerts", json!({})))
                .await
                .unwrap(),
        );
        let id = pending.id();

        service.shutdown().await;
        assert!(matches!(pending.wait().await, Err(Error::Abandoned(abandoned)) if abandoned == id));
        // The operation itself survives for the next session
        assert_eq!(service.get_queue_status().await.unwrap().pending, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queued_work_survives_restart_without_double_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let location = StoreLocation::Path(dir.path().join("coldsync.db"));

        let api = ScriptedApi::new();
        let first = OfflineSyncService::with_connectivity(
            api.clone(),
            location.clone(),
            SyncSettings::default(),
            ConnectivityMonitor::new(Connectivity::Offline),
        )
        .unwrap();
        first
            .execute(NewOperation::create("/readings", json!({"c": 3})))
            .await
            .unwrap();
        first.shutdown().await;
        drop(first);

        let second = OfflineSyncService::with_connectivity(
            api.clone(),
            location,
            SyncSettings::default(),
            ConnectivityMonitor::new(Connectivity::Offline),
        )
        .unwrap();
        assert_eq!(second.get_queue_status().await.unwrap().pending, 1);

        second.connectivity().set_online(true);
        wait_for(async {
            while second.get_queue_status().await.unwrap().pending > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        let driver = second.driver().await.unwrap();
        driver.stop_sync();
        while driver.is_draining() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        driver.sync().await.unwrap();
        assert_eq!(api.call_count(), 1);
        second.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_state_follows_connectivity() {
        let api = ScriptedApi::new();
        let service = service(&api, false);
        assert_eq!(service.sync_state().await.unwrap(), SyncState::Offline);

        service.connectivity().set_online(true);
        let driver = service.driver().await.unwrap();
        wait_for(async {
            while driver.is_draining() || !driver.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert_eq!(service.sync_state().await.unwrap(), SyncState::Synced);
        service.shutdown().await;
    }

    #[test]
    fn rejects_invalid_settings() {
        let settings = SyncSettings {
            request_timeout_ms: 0,
            ..SyncSettings::default()
        };
        let result = OfflineSyncService::new(ScriptedApi::new(), StoreLocation::InMemory, settings);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_dependent_queues_behind_pending_predecessor() {
        let api = ScriptedApi::new();
        let service = service(&api, true);
        service.disable_background_sync();

        // Predecessor left pending with a retry backoff ahead of it
        let queue = service.queue().await.unwrap();
        let first = queue
            .enqueue(NewOperation::create("/shipments", json!({"sku": "A"})))
            .await
            .unwrap();
        queue.mark_failed(first.id, "refused").await.unwrap();

        let execution = service
            .execute(NewOperation::update("/shipments/1", json!({"temp_c": 2})).after(first.id))
            .await
            .unwrap();

        let pending = expect_queued(execution);
        assert_eq!(pending.operation().depends_on, Some(first.id));
        assert_eq!(api.call_count(), 0);
        assert_eq!(service.get_queue_status().await.unwrap().pending, 2);
        service.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_dependent_of_failed_predecessor_is_rejected() {
        let api = ScriptedApi::new();
        let service = service(&api, true);
        service.disable_background_sync();

        let queue = service.queue().await.unwrap();
        let first = queue
            .enqueue(NewOperation::create("/shipments", json!({})))
            .await
            .unwrap();
        queue.mark_abandoned(first.id, "rejected").await.unwrap();

        let error = service
            .execute(NewOperation::update("/shipments/1", json!({})).after(first.id))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::DependencyFailed { predecessor } if predecessor == first.id));
        assert_eq!(api.call_count(), 0);
        assert_eq!(service.get_queue_status().await.unwrap().pending, 0);
        service.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_dependent_of_completed_predecessor_goes_direct() {
        let api = ScriptedApi::new();
        let service = service(&api, true);
        service.disable_background_sync();

        let queue = service.queue().await.unwrap();
        let first = queue
            .enqueue(NewOperation::create("/shipments", json!({})))
            .await
            .unwrap();
        queue.mark_completed(first.id).await.unwrap();

        let execution = service
            .execute(NewOperation::update("/shipments/1", json!({})).after(first.id))
            .await
            .unwrap();

        assert!(!execution.is_queued());
        assert_eq!(api.endpoints(), vec!["/shipments/1"]);
        service.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabled_background_sync_leaves_queue_alone() {
        let api = ScriptedApi::new();
        api.push_network_error();
        let service = service(&api, true);
        service.disable_background_sync();

        let error = service
            .execute(NewOperation::create("/alerts", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Network(_)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let driver = service.driver().await.unwrap();
        assert!(!driver.is_running());
        assert_eq!(api.call_count(), 1);
        assert_eq!(service.get_queue_status().await.unwrap().pending, 1);
        service.shutdown().await;
    }
}
