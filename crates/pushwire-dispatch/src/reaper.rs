//! Removal of subscriptions the push service reports as permanently gone.

use pushwire_storage::{DynSubscriptionStore, StorageError};
use tracing::{debug, warn};

use crate::executor::DeliveryOutcome;

/// Push service statuses that mean the endpoint will never accept another
/// message: 404 Not Found and 410 Gone.
pub const STALE_STATUS_CODES: [u16; 2] = [404, 410];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Remove,
}

/// Decides whether the subscription behind `outcome` must be deleted.
///
/// Only a failure with a 404 or 410 status is stale. Failures without a status
/// (timeouts, connection errors, encryption errors) are kept.
#[must_use]
pub fn classify(outcome: &DeliveryOutcome) -> Verdict {
    match outcome {
        DeliveryOutcome::Failed {
            status: Some(status),
            ..
        } if STALE_STATUS_CODES.contains(status) => Verdict::Remove,
        _ => Verdict::Keep,
    }
}

pub struct StaleReaper {
    store: DynSubscriptionStore,
}

impl StaleReaper {
    pub fn new(store: DynSubscriptionStore) -> Self {
        Self { store }
    }

    /// Classifies `outcome` and deletes the subscription when it is stale.
    ///
    /// Deletion is by subscription id. A subscription that is already gone
    /// still yields `Verdict::Remove`.
    pub async fn reap(&self, outcome: &DeliveryOutcome) -> Result<Verdict, StorageError> {
        let verdict = classify(outcome);
        if verdict == Verdict::Remove {
            let subscription_id = outcome.subscription_id();
            let deleted = self.store.delete(subscription_id).await?;
            if deleted {
                warn!(
                    subscription_id = %subscription_id,
                    status = ?outcome.status(),
                    "Removed stale subscription"
                );
            } else {
                debug!(subscription_id = %subscription_id, "Stale subscription already removed");
            }
        }
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushwire_db_memory::InMemoryStorage;
    use pushwire_storage::{ClientKeys, NewSubscription, SubscriptionStore};
    use std::sync::Arc;
    use uuid::Uuid;

    fn failed(status: Option<u16>) -> DeliveryOutcome {
        DeliveryOutcome::Failed {
            subscription_id: Uuid::new_v4(),
            status,
            reason: "x".into(),
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify(&failed(Some(404))), Verdict::Remove);
        assert_eq!(classify(&failed(Some(410))), Verdict::Remove);
        assert_eq!(classify(&failed(Some(500))), Verdict::Keep);
        assert_eq!(classify(&failed(Some(429))), Verdict::Keep);
        assert_eq!(classify(&failed(None)), Verdict::Keep);
        assert_eq!(
            classify(&DeliveryOutcome::Delivered {
                subscription_id: Uuid::new_v4()
            }),
            Verdict::Keep
        );
    }

    #[tokio::test]
    async fn test_reap_deletes_by_id_only() {
        let storage = Arc::new(InMemoryStorage::new());
        let app_id = Uuid::new_v4();
        let new = |endpoint: &str| NewSubscription {
            app_id,
            endpoint: endpoint.to_string(),
            keys: ClientKeys {
                p256dh: "p".into(),
                auth: "a".into(),
            },
            user_agent: None,
        };
        let gone = storage.upsert(new("https://push.test/gone")).await.unwrap();
        let kept = storage.upsert(new("https://push.test/kept")).await.unwrap();

        let reaper = StaleReaper::new(storage.clone());
        let outcome = DeliveryOutcome::Failed {
            subscription_id: gone.id,
            status: Some(410),
            reason: "gone".into(),
        };
        assert_eq!(reaper.reap(&outcome).await.unwrap(), Verdict::Remove);
        // Second reap of the same subscription is still a removal.
        assert_eq!(reaper.reap(&outcome).await.unwrap(), Verdict::Remove);

        let transient = DeliveryOutcome::Failed {
            subscription_id: kept.id,
            status: Some(503),
            reason: "busy".into(),
        };
        assert_eq!(reaper.reap(&transient).await.unwrap(), Verdict::Keep);

        assert!(!storage.contains_subscription(gone.id));
        assert!(storage.contains_subscription(kept.id));
    }
}
