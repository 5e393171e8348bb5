//! Dispatch orchestration.
//!
//! [`Dispatcher::send`] validates the request, opens a delivery log and hands
//! the fan-out to a background task. Once the log exists it is always driven to
//! `completed` or `failed`, whatever happens to the fan-out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use pushwire_storage::{
    DeliveryCounts, DeliveryLog, DeliveryStatus, DynApplicationRegistry, DynDeliveryLogStore,
    DynSubscriptionStore, LogTransition, NewDeliveryLog, NotificationPayload, VapidCredentials,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::executor::{BatchExecutor, DeliveryOutcome};
use crate::reaper::{StaleReaper, Verdict};
use crate::transport::DynPushTransport;

/// Acknowledgement returned to the caller once the delivery log is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub log_id: Uuid,
    pub total_subscribers: u32,
}

/// Handle to a dispatch running in the background.
///
/// Dropping the ticket detaches the dispatch; it still runs to completion.
#[derive(Debug)]
pub struct DispatchTicket {
    pub log_id: Uuid,
    pub total_subscribers: u32,
    handle: JoinHandle<Result<DeliveryLog, DispatchError>>,
}

impl DispatchTicket {
    #[must_use]
    pub fn receipt(&self) -> SendReceipt {
        SendReceipt {
            log_id: self.log_id,
            total_subscribers: self.total_subscribers,
        }
    }

    /// Waits for the dispatch to finish and returns the terminal log.
    pub async fn wait(self) -> Result<DeliveryLog, DispatchError> {
        self.handle
            .await
            .map_err(|e| DispatchError::Aborted(e.to_string()))?
    }
}

/// Counters shared between the fan-out task and its supervisor, so a failed
/// dispatch can still record how far it got.
#[derive(Debug, Default)]
struct DispatchProgress {
    success: AtomicU32,
    failed: AtomicU32,
    stale_removed: AtomicU32,
}

impl DispatchProgress {
    fn record(&self, outcome: &DeliveryOutcome) {
        if outcome.is_delivered() {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_stale(&self) {
        self.stale_removed.fetch_add(1, Ordering::Relaxed);
    }

    fn counts(&self) -> DeliveryCounts {
        DeliveryCounts {
            success_count: self.success.load(Ordering::Relaxed),
            fail_count: self.failed.load(Ordering::Relaxed),
            stale_removed: self.stale_removed.load(Ordering::Relaxed),
        }
    }
}

/// Terminal status for a dispatch that ran to the end.
///
/// A dispatch fails only when it attempted at least one subscriber and none
/// of them was delivered. The decision is taken over the subscribers actually
/// attempted, not the snapshot total, which may have drifted.
#[must_use]
pub fn final_status(counts: &DeliveryCounts) -> DeliveryStatus {
    if counts.attempted() > 0 && counts.success_count == 0 {
        DeliveryStatus::Failed
    } else {
        DeliveryStatus::Completed
    }
}

/// Counts written when the dispatch aborts: everything not delivered is a failure.
fn aborted_counts(total_subscribers: u32, so_far: DeliveryCounts) -> DeliveryCounts {
    DeliveryCounts {
        fail_count: total_subscribers.saturating_sub(so_far.success_count),
        ..so_far
    }
}

struct DispatcherInner {
    subscriptions: DynSubscriptionStore,
    registry: DynApplicationRegistry,
    logs: DynDeliveryLogStore,
    transport: DynPushTransport,
    executor: BatchExecutor,
}

/// Entry point of the notification dispatch engine.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new(
        subscriptions: DynSubscriptionStore,
        registry: DynApplicationRegistry,
        logs: DynDeliveryLogStore,
        transport: DynPushTransport,
        config: DispatchConfig,
    ) -> Result<Self, DispatchError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(DispatcherInner {
                subscriptions,
                registry,
                logs,
                transport,
                executor: BatchExecutor::new(config.batch_size),
            }),
        })
    }

    /// Opens a delivery log for `payload` and starts the fan-out in the background.
    ///
    /// # Errors
    ///
    /// Fails without creating a log when the payload has no title, when the
    /// application does not exist, or when the stores cannot be read. Failures
    /// after the log is opened are reported through the log only.
    #[instrument(skip(self, payload), fields(app_id = %app_id))]
    pub async fn send(
        &self,
        app_id: Uuid,
        payload: NotificationPayload,
    ) -> Result<DispatchTicket, DispatchError> {
        payload.validate()?;
        let wire: Arc<str> = Arc::from(payload.to_wire()?);

        let credentials = self
            .inner
            .registry
            .get_credentials(app_id)
            .await?
            .ok_or(DispatchError::AppNotFound(app_id))?;

        let total_subscribers = self.inner.subscriptions.count_by_app(app_id).await?;
        let log = self
            .inner
            .logs
            .create(NewDeliveryLog {
                app_id,
                payload,
                total_subscribers,
            })
            .await?;

        info!(
            log_id = %log.id,
            total_subscribers,
            "Dispatch accepted"
        );

        let log_id = log.id;
        let dispatcher = self.clone();
        let handle = tokio::spawn(async move {
            dispatcher
                .drive(log, Arc::new(credentials), wire)
                .await
        });

        Ok(DispatchTicket {
            log_id,
            total_subscribers,
            handle,
        })
    }

    /// Reads a delivery log.
    pub async fn get_log(&self, log_id: Uuid) -> Result<DeliveryLog, DispatchError> {
        self.inner
            .logs
            .get(log_id)
            .await?
            .ok_or(DispatchError::LogNotFound(log_id))
    }

    /// Most recent delivery logs of an application, newest first.
    pub async fn recent_logs(
        &self,
        app_id: Uuid,
        limit: u32,
    ) -> Result<Vec<DeliveryLog>, DispatchError> {
        Ok(self.inner.logs.list_by_app(app_id, limit).await?)
    }

    /// Runs the fan-out for an already opened log and returns it in its
    /// terminal state.
    ///
    /// This is the body `send` spawns. It is public so a caller that opened a
    /// log itself can drive it in the foreground.
    pub async fn run(
        &self,
        log_id: Uuid,
        app_id: Uuid,
        credentials: VapidCredentials,
        payload: &NotificationPayload,
    ) -> Result<DeliveryLog, DispatchError> {
        let log = self.get_log(log_id).await?;
        if log.app_id != app_id {
            return Err(DispatchError::LogNotFound(log_id));
        }
        let wire: Arc<str> = match payload.to_wire() {
            Ok(wire) => Arc::from(wire),
            Err(e) => {
                error!(log_id = %log_id, error = %e, "Payload cannot be serialized");
                return self
                    .finalize_failed(log_id, log.total_subscribers, DeliveryCounts::default())
                    .await;
            }
        };
        self.drive(log, Arc::new(credentials), wire).await
    }

    /// Supervises one dispatch. The fan-out runs in its own task so that a
    /// panic inside it still reaches the failure path below.
    #[instrument(skip_all, fields(log_id = %log.id, app_id = %log.app_id))]
    async fn drive(
        &self,
        log: DeliveryLog,
        credentials: Arc<VapidCredentials>,
        payload: Arc<str>,
    ) -> Result<DeliveryLog, DispatchError> {
        let log_id = log.id;
        let total_subscribers = log.total_subscribers;
        let progress = Arc::new(DispatchProgress::default());

        let worker = {
            let dispatcher = self.clone();
            let progress = Arc::clone(&progress);
            tokio::spawn(async move {
                dispatcher
                    .fan_out(&log, credentials, payload, &progress)
                    .await
            })
        };

        let failure = match worker.await {
            Ok(Ok(finished)) => return Ok(finished),
            Ok(Err(e)) => e.to_string(),
            Err(join_error) => format!("dispatch task aborted: {join_error}"),
        };

        error!(error = %failure, "Dispatch failed, finalizing log as failed");
        self.finalize_failed(log_id, total_subscribers, progress.counts())
            .await
    }

    async fn fan_out(
        &self,
        log: &DeliveryLog,
        credentials: Arc<VapidCredentials>,
        payload: Arc<str>,
        progress: &DispatchProgress,
    ) -> Result<DeliveryLog, DispatchError> {
        let inner = &self.inner;
        inner
            .logs
            .update(log.id, LogTransition::start_now())
            .await?;

        let subscriptions = inner.subscriptions.list_by_app(log.app_id).await?;
        if subscriptions.len() != log.total_subscribers as usize {
            debug!(
                snapshot = log.total_subscribers,
                live = subscriptions.len(),
                "Subscriber set changed since the snapshot"
            );
        }

        let reaper = StaleReaper::new(Arc::clone(&inner.subscriptions));
        for (index, batch) in inner.executor.batches(&subscriptions).enumerate() {
            debug!(batch = index, size = batch.len(), "Dispatching batch");
            let outcomes = inner
                .executor
                .run_batch(&inner.transport, &credentials, &payload, batch)
                .await;

            for outcome in &outcomes {
                progress.record(outcome);
                if let DeliveryOutcome::Failed {
                    subscription_id,
                    status,
                    reason,
                } = outcome
                {
                    warn!(
                        subscription_id = %subscription_id,
                        status = ?status,
                        reason = %reason,
                        "Delivery failed"
                    );
                    if reaper.reap(outcome).await? == Verdict::Remove {
                        progress.record_stale();
                    }
                }
            }
        }

        let counts = progress.counts();
        let status = final_status(&counts);
        let finished = inner
            .logs
            .update(log.id, LogTransition::finish_now(status, counts))
            .await?;

        info!(
            status = %status,
            success_count = counts.success_count,
            fail_count = counts.fail_count,
            stale_removed = counts.stale_removed,
            "Dispatch finished"
        );
        Ok(finished)
    }

    /// Moves a log to `failed`, walking through `sending` if it never started.
    /// A log that is already terminal is returned unchanged.
    async fn finalize_failed(
        &self,
        log_id: Uuid,
        total_subscribers: u32,
        so_far: DeliveryCounts,
    ) -> Result<DeliveryLog, DispatchError> {
        let logs = &self.inner.logs;
        let current = self.get_log(log_id).await?;
        if current.status.is_terminal() {
            return Ok(current);
        }
        if current.status == DeliveryStatus::Pending {
            logs.update(log_id, LogTransition::start_now()).await?;
        }

        let counts = aborted_counts(total_subscribers, so_far);
        let failed = logs
            .update(
                log_id,
                LogTransition::finish_now(DeliveryStatus::Failed, counts),
            )
            .await?;
        info!(
            success_count = counts.success_count,
            fail_count = counts.fail_count,
            stale_removed = counts.stale_removed,
            "Delivery log finalized as failed"
        );
        Ok(failed)
    }
}
