//! # pushwire-storage
//!
//! Storage abstraction layer for the pushwire notification dispatch engine.
//!
//! This crate defines the records the engine reads and writes and the traits
//! every storage backend implements. It contains no implementations; those
//! live in `pushwire-db-memory` and `pushwire-db-postgres`.
//!
//! - [`SubscriptionStore`]: which endpoints belong to which application
//! - [`ApplicationRegistry`]: per-application VAPID credentials
//! - [`DeliveryLogStore`]: one auditable record per dispatch
//!
//! ## Example
//!
//! ```ignore
//! use pushwire_storage::{DeliveryLogStore, StorageError};
//!
//! async fn is_done(logs: &dyn DeliveryLogStore, id: Uuid) -> Result<bool, StorageError> {
//!     let log = logs
//!         .get(id)
//!         .await?
//!         .ok_or_else(|| StorageError::not_found("delivery_log", id))?;
//!     Ok(log.status.is_terminal())
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::{ApplicationRegistry, DeliveryLogStore, SubscriptionStore};
pub use types::{
    ClientKeys, DeliveryCounts, DeliveryLog, DeliveryStatus, LogTransition, NewDeliveryLog,
    NewSubscription, NotificationPayload, PayloadError, Subscription, VapidCredentials,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared handle to a subscription store.
pub type DynSubscriptionStore = std::sync::Arc<dyn SubscriptionStore>;

/// Shared handle to an application registry.
pub type DynApplicationRegistry = std::sync::Arc<dyn ApplicationRegistry>;

/// Shared handle to a delivery log store.
pub type DynDeliveryLogStore = std::sync::Arc<dyn DeliveryLogStore>;
