#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pushwire_db_memory::InMemoryStorage;
use pushwire_dispatch::{DispatchConfig, Dispatcher, PushTransport, TransportError};
use pushwire_storage::{
    ClientKeys, NewSubscription, StorageError, Subscription, SubscriptionStore, VapidCredentials,
};
use uuid::Uuid;

/// What the scripted push service does for one endpoint.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Ok,
    Status(u16),
    NoStatus,
    Panic,
}

/// Transport answering from a per-endpoint script; unscripted endpoints succeed.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
    payloads: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, endpoint: &str, reply: Reply) {
        self.script
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn send(
        &self,
        endpoint: &str,
        _keys: &ClientKeys,
        _credentials: &VapidCredentials,
        payload: &str,
    ) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.to_string());
        let reply = self
            .script
            .lock()
            .unwrap()
            .get(endpoint)
            .copied()
            .unwrap_or(Reply::Ok);
        match reply {
            Reply::Ok => Ok(()),
            Reply::Status(status) => Err(TransportError::Rejected {
                status,
                body: String::new(),
            }),
            Reply::NoStatus => Err(TransportError::Request("connection reset".into())),
            Reply::Panic => panic!("scripted transport panic"),
        }
    }
}

/// Transport whose sends block until [`GatedTransport::open`] is called.
pub struct GatedTransport {
    gate: tokio::sync::Semaphore,
    started: AtomicUsize,
}

impl GatedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: tokio::sync::Semaphore::new(0),
            started: AtomicUsize::new(0),
        })
    }

    pub fn open(&self) {
        self.gate.add_permits(1024);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for GatedTransport {
    async fn send(
        &self,
        _endpoint: &str,
        _keys: &ClientKeys,
        _credentials: &VapidCredentials,
        _payload: &str,
    ) -> Result<(), TransportError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(())
    }
}

/// Subscription store that can be told to fail listing or deleting.
pub struct FlakySubscriptions {
    pub inner: Arc<InMemoryStorage>,
    pub fail_list: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FlakySubscriptions {
    pub fn new(inner: Arc<InMemoryStorage>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_list: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SubscriptionStore for FlakySubscriptions {
    async fn list_by_app(&self, app_id: Uuid) -> Result<Vec<Subscription>, StorageError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StorageError::connection_error("subscriber list unavailable"));
        }
        self.inner.list_by_app(app_id).await
    }

    async fn count_by_app(&self, app_id: Uuid) -> Result<u32, StorageError> {
        self.inner.count_by_app(app_id).await
    }

    async fn upsert(&self, subscription: NewSubscription) -> Result<Subscription, StorageError> {
        self.inner.upsert(subscription).await
    }

    async fn delete(&self, subscription_id: Uuid) -> Result<bool, StorageError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StorageError::connection_error("delete failed"));
        }
        self.inner.delete(subscription_id).await
    }
}

pub fn credentials() -> VapidCredentials {
    VapidCredentials {
        public_key: "BPublicKey".into(),
        private_key: "privateKey".into(),
        subject: "mailto:ops@example.com".into(),
    }
}

pub fn endpoint(n: usize) -> String {
    format!("https://push.example.net/send/{n}")
}

pub async fn subscribe(storage: &InMemoryStorage, app_id: Uuid, n: usize) -> Subscription {
    storage
        .upsert(NewSubscription {
            app_id,
            endpoint: endpoint(n),
            keys: ClientKeys {
                p256dh: format!("p256dh-{n}"),
                auth: format!("auth-{n}"),
            },
            user_agent: Some("Mozilla/5.0".into()),
        })
        .await
        .unwrap()
}

/// Registers an app with `count` subscribers at `endpoint(0..count)`.
pub async fn seed_app(storage: &InMemoryStorage, count: usize) -> (Uuid, Vec<Subscription>) {
    let app_id = storage.register_app(credentials());
    let mut subscriptions = Vec::with_capacity(count);
    for n in 0..count {
        subscriptions.push(subscribe(storage, app_id, n).await);
    }
    (app_id, subscriptions)
}

pub fn dispatcher(storage: &Arc<InMemoryStorage>, transport: Arc<dyn PushTransport>) -> Dispatcher {
    Dispatcher::new(
        storage.clone(),
        storage.clone(),
        storage.clone(),
        transport,
        DispatchConfig::default(),
    )
    .unwrap()
}
