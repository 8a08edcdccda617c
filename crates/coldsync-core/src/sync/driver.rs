//! Background drain of the sync queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::CompletionRegistry;
use crate::api::{request_with_timeout, ApiError, ApiRequest, RemoteApi};
use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::db::{ConflictLog, SyncQueue};
use crate::error::{Error, Result};
use crate::models::{OperationStatus, QueuedOperation};
use crate::util::unix_millis_now;

const MIN_SYNC_INTERVAL: Duration = Duration::from_millis(10);

/// Counters for one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Operations sent to the remote API
    pub attempted: usize,
    pub completed: usize,
    /// Failed attempts that stay pending for another pass
    pub retried: usize,
    /// Operations that became terminally `failed` in this pass
    pub failed: usize,
    pub conflicts: usize,
    /// Skipped because of backoff or a pending predecessor
    pub deferred: usize,
}

impl SyncReport {
    pub const fn is_empty(&self) -> bool {
        self.attempted == 0 && self.deferred == 0 && self.failed == 0
    }
}

enum Gate {
    Ready,
    Deferred,
    Blocked { predecessor: i64 },
}

/// Replays queued operations against a [`RemoteApi`]
///
/// Cloning is cheap; clones share the timer, listener and drain guard.
pub struct SyncDriver<A: RemoteApi> {
    inner: Arc<DriverInner<A>>,
}

impl<A: RemoteApi> Clone for SyncDriver<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct DriverInner<A> {
    api: Arc<A>,
    queue: SyncQueue,
    conflicts: ConflictLog,
    connectivity: ConnectivityMonitor,
    completions: CompletionRegistry,
    request_timeout: Duration,
    sync_interval: Duration,
    drain_lock: Mutex<()>,
    last_pass_failed: AtomicBool,
    closed: AtomicBool,
    timer: StdMutex<Option<JoinHandle<()>>>,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

/// Collaborators and timings a [`SyncDriver`] is built from
pub struct DriverParts<A> {
    pub api: Arc<A>,
    pub queue: SyncQueue,
    pub conflicts: ConflictLog,
    pub connectivity: ConnectivityMonitor,
    pub completions: CompletionRegistry,
    pub request_timeout: Duration,
    pub sync_interval: Duration,
}

impl<A: RemoteApi> SyncDriver<A> {
    pub fn new(parts: DriverParts<A>) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                api: parts.api,
                queue: parts.queue,
                conflicts: parts.conflicts,
                connectivity: parts.connectivity,
                completions: parts.completions,
                request_timeout: parts.request_timeout,
                sync_interval: parts.sync_interval,
                drain_lock: Mutex::new(()),
                last_pass_failed: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                timer: StdMutex::new(None),
                listener: StdMutex::new(None),
            }),
        }
    }

    /// Interval used when connectivity returns
    pub fn sync_interval(&self) -> Duration {
        self.inner.sync_interval
    }

    pub fn is_running(&self) -> bool {
        is_live(&lock_slot(&self.inner.timer))
    }

    /// Whether a drain pass is in progress right now
    pub fn is_draining(&self) -> bool {
        self.inner.drain_lock.try_lock().is_err()
    }

    /// Whether the most recent pass stopped on a storage error
    pub fn last_pass_failed(&self) -> bool {
        self.inner.last_pass_failed.load(Ordering::SeqCst)
    }

    /// Start the repeating timer; the first pass runs immediately
    ///
    /// Returns `false` when a timer is already running or the driver has been
    /// shut down. Ticks that find the service offline are skipped.
    pub fn start_sync(&self, interval: Duration) -> bool {
        let mut timer = lock_slot(&self.inner.timer);
        if is_live(&timer) || self.is_closed() {
            return false;
        }

        let period = interval.max(MIN_SYNC_INTERVAL);
        let weak = Arc::downgrade(&self.inner);
        *timer = Some(tokio::spawn(run_timer(weak, period)));
        tracing::info!("Sync timer started (every {}ms)", period.as_millis());
        true
    }

    /// Cancel the timer; a pass already underway runs to completion
    ///
    /// Returns whether a timer was running.
    pub fn stop_sync(&self) -> bool {
        let Some(handle) = lock_slot(&self.inner.timer).take() else {
            return false;
        };
        let was_running = !handle.is_finished();
        handle.abort();
        if was_running {
            tracing::info!("Sync timer stopped");
        }
        was_running
    }

    /// Follow connectivity transitions: online starts the timer, offline stops it
    ///
    /// Returns `false` when a listener is already running.
    pub fn spawn_connectivity_listener(&self) -> bool {
        let mut listener = lock_slot(&self.inner.listener);
        if is_live(&listener) {
            return false;
        }

        let mut receiver = self.inner.connectivity.subscribe();
        let baseline = *receiver.borrow_and_update();
        let weak = Arc::downgrade(&self.inner);
        *listener = Some(tokio::spawn(follow_connectivity(weak, receiver, baseline)));
        true
    }

    /// Stop the timer and the listener, then wait out any pass in flight
    ///
    /// The driver runs no further passes afterwards.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.stop_sync();
        if let Some(handle) = lock_slot(&self.inner.listener).take() {
            handle.abort();
        }
        let _guard = self.inner.drain_lock.lock().await;
        tracing::debug!("Sync driver shut down");
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Run one drain pass
    ///
    /// Returns an empty report when offline or when another pass holds the
    /// drain guard. Per-operation API failures are recorded on the queue and
    /// never returned; storage errors abort the pass.
    pub async fn sync(&self) -> Result<SyncReport> {
        let Ok(_guard) = self.inner.drain_lock.try_lock() else {
            tracing::debug!("Drain pass already running; skipping");
            return Ok(SyncReport::default());
        };
        if self.is_closed() {
            return Ok(SyncReport::default());
        }
        if !self.inner.connectivity.is_online() {
            tracing::debug!("Offline; skipping drain pass");
            return Ok(SyncReport::default());
        }

        let result = self.drain().await;
        self.inner
            .last_pass_failed
            .store(result.is_err(), Ordering::SeqCst);
        result
    }

    async fn drain(&self) -> Result<SyncReport> {
        let inner = &self.inner;
        let pending = inner.queue.get_pending().await?;
        let mut report = SyncReport::default();

        for operation in pending {
            if !inner.connectivity.is_online() {
                tracing::info!("Went offline mid-pass; leaving the rest queued");
                break;
            }

            match self.gate(&operation).await? {
                Gate::Ready => {}
                Gate::Deferred => {
                    report.deferred += 1;
                    continue;
                }
                Gate::Blocked { predecessor } => {
                    let message = format!("predecessor #{predecessor} failed");
                    if inner.queue.mark_abandoned(operation.id, &message).await? {
                        tracing::warn!("Abandoned operation #{}: {message}", operation.id);
                        report.failed += 1;
                        inner
                            .completions
                            .settle(
                                operation.id,
                                Err(Error::DependencyFailed { predecessor }),
                            )
                            .await;
                    }
                    continue;
                }
            }

            report.attempted += 1;
            self.replay(&operation, &mut report).await?;
        }

        inner.queue.cleanup_completed().await?;
        if !report.is_empty() {
            tracing::info!(
                "Drain pass finished: {} attempted, {} completed, {} retried, {} failed, {} conflicts, {} deferred",
                report.attempted,
                report.completed,
                report.retried,
                report.failed,
                report.conflicts,
                report.deferred
            );
        }
        Ok(report)
    }

    async fn gate(&self, operation: &QueuedOperation) -> Result<Gate> {
        if !operation.is_due(unix_millis_now()) {
            return Ok(Gate::Deferred);
        }
        let Some(predecessor) = operation.depends_on else {
            return Ok(Gate::Ready);
        };

        // Completed predecessors may already have been cleaned up
        let gate = match self.inner.queue.get(predecessor).await? {
            Some(record) if record.status == OperationStatus::Pending => Gate::Deferred,
            Some(record) if record.status == OperationStatus::Failed => {
                Gate::Blocked { predecessor }
            }
            _ => Gate::Ready,
        };
        Ok(gate)
    }

    async fn replay(&self, operation: &QueuedOperation, report: &mut SyncReport) -> Result<()> {
        let inner = &self.inner;
        let id = operation.id;
        tracing::debug!(
            "Replaying operation #{id}: {} {}",
            operation.method,
            operation.endpoint
        );

        let outcome = request_with_timeout(
            inner.api.as_ref(),
            ApiRequest::from(operation),
            inner.request_timeout,
        )
        .await;

        match outcome {
            Ok(response) => {
                if inner.queue.mark_completed(id).await? {
                    report.completed += 1;
                    inner.completions.settle(id, Ok(response)).await;
                }
            }
            Err(ApiError::Conflict { server_data }) => {
                let context = json!({
                    "id": id,
                    "kind": operation.kind,
                    "method": operation.method,
                    "endpoint": operation.endpoint,
                    "idempotency_key": operation.idempotency_key,
                });
                let conflict_id = inner
                    .conflicts
                    .record_conflict(&operation.payload, &server_data, &context)
                    .await?;
                let message = format!("conflict #{conflict_id} recorded");
                if inner.queue.mark_abandoned(id, &message).await? {
                    report.conflicts += 1;
                    inner
                        .completions
                        .settle(id, Err(Error::Conflict { conflict_id }))
                        .await;
                }
            }
            Err(error) => {
                tracing::warn!("Replay of operation #{id} failed: {error}");
                match inner.queue.mark_failed(id, &error.to_string()).await? {
                    Some(updated) if updated.status == OperationStatus::Failed => {
                        tracing::warn!(
                            "Operation #{id} failed permanently after {} attempts",
                            updated.retries
                        );
                        report.failed += 1;
                        inner.completions.settle(id, Err(error.into())).await;
                    }
                    Some(_) => report.retried += 1,
                    None => {}
                }
            }
        }
        Ok(())
    }
}

async fn run_timer<A: RemoteApi>(weak: Weak<DriverInner<A>>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
            break;
        };
        if !inner.connectivity.is_online() {
            continue;
        }

        // Detached so that aborting the timer never cuts a pass short
        let driver = SyncDriver { inner };
        let pass = tokio::spawn(async move { driver.sync().await });
        match pass.await {
            Ok(Ok(_)) => {}
            Ok(Err(error)) => tracing::warn!("Background drain pass failed: {error}"),
            Err(error) => tracing::warn!("Background drain task ended abnormally: {error}"),
        }
    }
}

async fn follow_connectivity<A: RemoteApi>(
    weak: Weak<DriverInner<A>>,
    mut receiver: tokio::sync::watch::Receiver<Connectivity>,
    mut previous: Connectivity,
) {
    while receiver.changed().await.is_ok() {
        let current = *receiver.borrow_and_update();
        if current == previous {
            continue;
        }
        previous = current;

        let Some(inner) = weak.upgrade() else {
            break;
        };
        let driver = SyncDriver { inner };
        match current {
            Connectivity::Online => {
                driver.start_sync(driver.sync_interval());
            }
            Connectivity::Offline => {
                driver.stop_sync();
            }
        }
    }
}

fn lock_slot<T>(slot: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_live(slot: &Option<JoinHandle<()>>) -> bool {
    slot.as_ref().is_some_and(|handle| !handle.is_finished())
}
