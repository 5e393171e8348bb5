use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use pushwire_storage::{
    ApplicationRegistry, DeliveryLog, DeliveryLogStore, LogTransition, NewDeliveryLog,
    NewSubscription, StorageError, Subscription, SubscriptionStore, VapidCredentials,
};
use time::OffsetDateTime;
use uuid::Uuid;

/// In-memory backend implementing every pushwire store trait.
///
/// This storage implementation provides:
/// - Concurrent access via sharded `DashMap`s
/// - `(app_id, endpoint)` uniqueness for subscriptions
/// - Delivery log state machine enforcement on every update
///
/// Cloning is cheap and clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    apps: Arc<DashMap<Uuid, VapidCredentials>>,
    subscriptions: Arc<DashMap<Uuid, Subscription>>,
    /// `(app_id, endpoint)` -> subscription id
    endpoints: Arc<DashMap<(Uuid, String), Uuid>>,
    logs: Arc<DashMap<Uuid, DeliveryLog>>,
}

impl InMemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an application and returns its generated ID.
    pub fn register_app(&self, credentials: VapidCredentials) -> Uuid {
        let id = Uuid::new_v4();
        self.apps.insert(id, credentials);
        id
    }

    /// Returns `true` if the subscription is currently stored.
    pub fn contains_subscription(&self, subscription_id: Uuid) -> bool {
        self.subscriptions.contains_key(&subscription_id)
    }

    /// Total number of stored subscriptions across all applications.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Total number of delivery logs across all applications.
    pub fn log_count(&self) -> usize {
        self.logs.len()
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStorage {
    async fn list_by_app(&self, app_id: Uuid) -> Result<Vec<Subscription>, StorageError> {
        let mut subs: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.app_id == app_id)
            .map(|entry| entry.value().clone())
            .collect();
        subs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(subs)
    }

    async fn count_by_app(&self, app_id: Uuid) -> Result<u32, StorageError> {
        let count = self
            .subscriptions
            .iter()
            .filter(|entry| entry.app_id == app_id)
            .count();
        u32::try_from(count).map_err(|_| StorageError::internal("subscriber count overflow"))
    }

    async fn upsert(&self, new: NewSubscription) -> Result<Subscription, StorageError> {
        if new.endpoint.is_empty() || new.keys.p256dh.is_empty() || new.keys.auth.is_empty() {
            return Err(StorageError::invalid_record("Invalid subscription data"));
        }

        let key = (new.app_id, new.endpoint.clone());
        // The endpoint index entry is held for the whole upsert so two
        // concurrent subscribes of the same endpoint cannot both insert.
        match self.endpoints.entry(key) {
            Entry::Occupied(slot) => {
                let id = *slot.get();
                let mut existing = self
                    .subscriptions
                    .get_mut(&id)
                    .ok_or_else(|| StorageError::internal("endpoint index out of sync"))?;
                existing.key_p256dh = new.keys.p256dh;
                existing.key_auth = new.keys.auth;
                existing.user_agent = new.user_agent;
                Ok(existing.clone())
            }
            Entry::Vacant(slot) => {
                let subscription = Subscription {
                    id: Uuid::new_v4(),
                    app_id: new.app_id,
                    endpoint: new.endpoint,
                    key_p256dh: new.keys.p256dh,
                    key_auth: new.keys.auth,
                    user_agent: new.user_agent,
                    created_at: OffsetDateTime::now_utc(),
                };
                self.subscriptions
                    .insert(subscription.id, subscription.clone());
                slot.insert(subscription.id);
                Ok(subscription)
            }
        }
    }

    async fn delete(&self, subscription_id: Uuid) -> Result<bool, StorageError> {
        match self.subscriptions.remove(&subscription_id) {
            Some((_, removed)) => {
                // Only drop the index entry if it still points at this id; a
                // resubscribe under the same endpoint may already own it.
                self.endpoints
                    .remove_if(&(removed.app_id, removed.endpoint), |_, id| {
                        *id == subscription_id
                    });
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ApplicationRegistry for InMemoryStorage {
    async fn get_credentials(
        &self,
        app_id: Uuid,
    ) -> Result<Option<VapidCredentials>, StorageError> {
        Ok(self.apps.get(&app_id).map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl DeliveryLogStore for InMemoryStorage {
    async fn create(&self, new: NewDeliveryLog) -> Result<DeliveryLog, StorageError> {
        let log = DeliveryLog::open(Uuid::new_v4(), new, OffsetDateTime::now_utc());
        self.logs.insert(log.id, log.clone());
        Ok(log)
    }

    async fn update(
        &self,
        log_id: Uuid,
        transition: LogTransition,
    ) -> Result<DeliveryLog, StorageError> {
        let mut log = self
            .logs
            .get_mut(&log_id)
            .ok_or_else(|| StorageError::not_found("delivery_log", log_id))?;
        log.apply(&transition)?;
        Ok(log.clone())
    }

    async fn get(&self, log_id: Uuid) -> Result<Option<DeliveryLog>, StorageError> {
        Ok(self.logs.get(&log_id).map(|entry| entry.value().clone()))
    }

    async fn list_by_app(
        &self,
        app_id: Uuid,
        limit: u32,
    ) -> Result<Vec<DeliveryLog>, StorageError> {
        let mut logs: Vec<DeliveryLog> = self
            .logs
            .iter()
            .filter(|entry| entry.app_id == app_id)
            .map(|entry| entry.value().clone())
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logs.truncate(limit as usize);
        Ok(logs)
    }
}
