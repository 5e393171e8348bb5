//! Store traits consumed by the dispatch engine.
//!
//! Implementations must be thread-safe (`Send + Sync`); the engine shares them
//! between the caller and the background dispatch task through `Arc`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::types::{
    DeliveryLog, LogTransition, NewDeliveryLog, NewSubscription, Subscription, VapidCredentials,
};

/// Durable record of which endpoints belong to which application.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Lists the current subscribers of an application.
    async fn list_by_app(&self, app_id: Uuid) -> Result<Vec<Subscription>, StorageError>;

    /// Counts the current subscribers of an application.
    async fn count_by_app(&self, app_id: Uuid) -> Result<u32, StorageError>;

    /// Inserts a subscription, or refreshes the keys of the existing one with
    /// the same `(app_id, endpoint)`. The existing id is kept on refresh.
    async fn upsert(&self, subscription: NewSubscription) -> Result<Subscription, StorageError>;

    /// Deletes a subscription by identity.
    ///
    /// Returns `false` if it was already gone.
    async fn delete(&self, subscription_id: Uuid) -> Result<bool, StorageError>;
}

/// Owner of per-application signing credentials.
#[async_trait]
pub trait ApplicationRegistry: Send + Sync {
    /// Returns the VAPID credentials of an application, or `None` if the
    /// application does not exist.
    async fn get_credentials(&self, app_id: Uuid)
    -> Result<Option<VapidCredentials>, StorageError>;
}

/// Durable append/update sink for delivery logs.
///
/// # Errors
///
/// `update` returns `StorageError::InvalidTransition` when the requested
/// transition is not legal from the stored status, and
/// `StorageError::NotFound` when the log does not exist.
#[async_trait]
pub trait DeliveryLogStore: Send + Sync {
    /// Opens a new log in `pending` and returns it.
    async fn create(&self, log: NewDeliveryLog) -> Result<DeliveryLog, StorageError>;

    /// Applies a lifecycle transition and returns the updated log.
    async fn update(
        &self,
        log_id: Uuid,
        transition: LogTransition,
    ) -> Result<DeliveryLog, StorageError>;

    /// Reads a log by ID.
    async fn get(&self, log_id: Uuid) -> Result<Option<DeliveryLog>, StorageError>;

    /// Returns the most recent logs of an application, newest first.
    async fn list_by_app(&self, app_id: Uuid, limit: u32)
    -> Result<Vec<DeliveryLog>, StorageError>;
}
