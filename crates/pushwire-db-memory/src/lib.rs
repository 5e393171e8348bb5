//! In-memory storage backend for pushwire.
//!
//! This crate provides an in-memory implementation of the `SubscriptionStore`,
//! `ApplicationRegistry` and `DeliveryLogStore` traits from `pushwire-storage`,
//! using `DashMap` for concurrent access.
//!
//! # Example
//!
//! ```ignore
//! use pushwire_db_memory::InMemoryStorage;
//! use pushwire_storage::SubscriptionStore;
//!
//! let storage = InMemoryStorage::new();
//! let app_id = storage.register_app(credentials);
//! let count = storage.count_by_app(app_id).await?;
//! ```

pub mod storage;

pub use pushwire_storage::{
    ApplicationRegistry, DeliveryLogStore, StorageError, SubscriptionStore,
};
pub use storage::InMemoryStorage;

/// Creates a new shareable in-memory storage instance.
pub fn create_storage() -> std::sync::Arc<InMemoryStorage> {
    std::sync::Arc::new(InMemoryStorage::new())
}
