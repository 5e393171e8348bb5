//! # pushwire-dispatch
//!
//! The notification dispatch engine. Given an application and a payload it
//! fans the payload out to every subscriber of the application, removes
//! subscriptions the push service reports as gone, and records the result in
//! a delivery log.
//!
//! ## Architecture
//!
//! ```text
//! Dispatcher::send
//!   ├── validate payload, resolve credentials, snapshot count
//!   ├── open delivery log (pending)             ← returns DispatchTicket
//!   └── background task
//!         ├── log → sending, load live subscribers
//!         ├── BatchExecutor: batches of 50, concurrent inside a batch
//!         ├── StaleReaper: delete on 404 / 410
//!         └── log → completed | failed
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use pushwire_dispatch::{DispatchConfig, Dispatcher, WebPushConfig, WebPushTransport};
//!
//! let transport = Arc::new(WebPushTransport::new(WebPushConfig::default())?);
//! let dispatcher = Dispatcher::new(subs, registry, logs, transport, DispatchConfig::default())?;
//! let ticket = dispatcher
//!     .send(app_id, NotificationPayload::titled("Build finished", None))
//!     .await?;
//! println!("log {}", ticket.log_id);
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod reaper;
pub mod transport;

pub use config::{DEFAULT_BATCH_SIZE, DEFAULT_TTL_SECS, DispatchConfig, Urgency, WebPushConfig};
pub use error::{DispatchError, TransportError};
pub use executor::{BatchExecutor, DeliveryOutcome};
pub use orchestrator::{DispatchTicket, Dispatcher, SendReceipt, final_status};
pub use reaper::{STALE_STATUS_CODES, StaleReaper, Verdict, classify};
pub use transport::vapid::{VapidKeyPair, generate_vapid_keys};
pub use transport::{DynPushTransport, PushTransport, WebPushTransport};
