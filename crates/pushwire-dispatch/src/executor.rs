//! Batched fan-out of one payload to many subscriptions.
//!
//! Subscriptions are split into fixed-size batches. Batches run one after the
//! other; inside a batch every send runs as its own task and the batch only
//! settles once all of them have finished. The number of in-flight sends is
//! therefore never larger than the batch size.

use std::collections::HashMap;
use std::sync::Arc;

use pushwire_storage::{Subscription, VapidCredentials};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::DynPushTransport;

/// Result of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        subscription_id: Uuid,
    },
    Failed {
        subscription_id: Uuid,
        /// HTTP status from the push service, if one was received.
        status: Option<u16>,
        reason: String,
    },
}

impl DeliveryOutcome {
    #[must_use]
    pub fn subscription_id(&self) -> Uuid {
        match self {
            Self::Delivered { subscription_id } | Self::Failed { subscription_id, .. } => {
                *subscription_id
            }
        }
    }

    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Delivered { .. } => None,
            Self::Failed { status, .. } => *status,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchExecutor {
    batch_size: usize,
}

impl BatchExecutor {
    /// Creates an executor. A zero batch size is treated as one.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Splits `subscriptions` into batches in input order.
    pub fn batches<'a>(
        &self,
        subscriptions: &'a [Subscription],
    ) -> impl Iterator<Item = &'a [Subscription]> {
        subscriptions.chunks(self.batch_size)
    }

    /// Sends to every subscription of one batch concurrently and waits for
    /// all of them. A send that panics is reported as a failure without a
    /// status; it never takes the rest of the batch down.
    pub async fn run_batch(
        &self,
        transport: &DynPushTransport,
        credentials: &Arc<VapidCredentials>,
        payload: &Arc<str>,
        batch: &[Subscription],
    ) -> Vec<DeliveryOutcome> {
        debug!(batch_len = batch.len(), "Sending batch");

        let mut join_set = JoinSet::new();
        let mut slots: HashMap<tokio::task::Id, (usize, Uuid)> = HashMap::with_capacity(batch.len());

        for (index, subscription) in batch.iter().enumerate() {
            let transport = Arc::clone(transport);
            let credentials = Arc::clone(credentials);
            let payload = Arc::clone(payload);
            let subscription = subscription.clone();
            let subscription_id = subscription.id;

            let handle = join_set.spawn(async move {
                let keys = subscription.client_keys();
                match transport
                    .send(&subscription.endpoint, &keys, &credentials, &payload)
                    .await
                {
                    Ok(()) => DeliveryOutcome::Delivered {
                        subscription_id: subscription.id,
                    },
                    Err(e) => DeliveryOutcome::Failed {
                        subscription_id: subscription.id,
                        status: e.status_code(),
                        reason: e.to_string(),
                    },
                }
            });
            slots.insert(handle.id(), (index, subscription_id));
        }

        let mut ordered: Vec<Option<DeliveryOutcome>> = vec![None; batch.len()];
        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((task_id, outcome)) => {
                    if let Some((index, _)) = slots.get(&task_id) {
                        ordered[*index] = Some(outcome);
                    }
                }
                Err(join_error) => {
                    let Some((index, subscription_id)) = slots.get(&join_error.id()) else {
                        continue;
                    };
                    warn!(
                        subscription_id = %subscription_id,
                        error = %join_error,
                        "Send task did not complete"
                    );
                    ordered[*index] = Some(DeliveryOutcome::Failed {
                        subscription_id: *subscription_id,
                        status: None,
                        reason: format!("send task aborted: {join_error}"),
                    });
                }
            }
        }

        ordered.into_iter().flatten().collect()
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BATCH_SIZE)
    }
}
