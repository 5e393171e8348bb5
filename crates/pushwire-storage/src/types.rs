//! Core domain types shared by the stores and the dispatch engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StorageError;

// ==================== Applications ====================

/// VAPID sender identity of an application.
///
/// Passed explicitly into every transport call; there is no process-wide
/// sender configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VapidCredentials {
    /// Base64url (unpadded) uncompressed P-256 public key.
    pub public_key: String,
    /// Base64url (unpadded) raw P-256 private scalar.
    pub private_key: String,
    /// Contact URI identifying the sender (`mailto:` or `https:`).
    pub subject: String,
}

// ==================== Subscriptions ====================

/// Client-side encryption material of a push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientKeys {
    /// Base64url P-256 public key of the user agent.
    pub p256dh: String,
    /// Base64url 16-byte authentication secret.
    pub auth: String,
}

/// A browser push subscription registered for an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub app_id: Uuid,
    /// Opaque push service URL, unique per application.
    pub endpoint: String,
    pub key_p256dh: String,
    pub key_auth: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Subscription {
    /// Returns the client encryption keys of this subscription.
    #[must_use]
    pub fn client_keys(&self) -> ClientKeys {
        ClientKeys {
            p256dh: self.key_p256dh.clone(),
            auth: self.key_auth.clone(),
        }
    }
}

/// Data for registering (or refreshing) a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    pub app_id: Uuid,
    pub endpoint: String,
    pub keys: ClientKeys,
    #[serde(default)]
    pub user_agent: Option<String>,
}

// ==================== Payload ====================

/// Reasons a notification payload is rejected before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("title is required in payload")]
    MissingTitle,

    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

/// Opaque structured notification message.
///
/// The only field the engine cares about is `title`; everything else
/// (`body`, `icon`, `url`, `data`, ...) is forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationPayload(Value);

impl NotificationPayload {
    /// Wraps a JSON value without validating it.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Builds a payload with a title and an optional body.
    #[must_use]
    pub fn titled(title: impl Into<String>, body: Option<String>) -> Self {
        let mut map = Map::new();
        map.insert("title".into(), Value::String(title.into()));
        if let Some(body) = body {
            map.insert("body".into(), Value::String(body));
        }
        Self(Value::Object(map))
    }

    /// Checks that the payload is an object carrying a non-empty `title`.
    pub fn validate(&self) -> Result<(), PayloadError> {
        let object = self.0.as_object().ok_or(PayloadError::NotAnObject)?;
        match object.get("title").and_then(Value::as_str) {
            Some(title) if !title.trim().is_empty() => Ok(()),
            _ => Err(PayloadError::MissingTitle),
        }
    }

    /// Returns the title, if present.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(Value::as_str)
    }

    /// Serializes the payload into the bytes sent to every subscriber.
    pub fn to_wire(&self) -> Result<String, PayloadError> {
        serde_json::to_string(&self.0).map_err(|e| PayloadError::Serialization(e.to_string()))
    }

    /// Returns the underlying JSON value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

// ==================== Delivery log ====================

/// Lifecycle status of a delivery log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Completed,
    Failed,
}

impl DeliveryStatus {
    /// Returns `true` for `completed` and `failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The only legal edges are `pending -> sending` and `sending -> completed|failed`.
    #[must_use]
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Sending)
                | (Self::Sending, Self::Completed)
                | (Self::Sending, Self::Failed)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses the storage representation of a status.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "pending" => Ok(Self::Pending),
            "sending" => Ok(Self::Sending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(StorageError::invalid_record(format!(
                "unknown delivery status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-dispatch delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCounts {
    pub success_count: u32,
    pub fail_count: u32,
    pub stale_removed: u32,
}

impl DeliveryCounts {
    /// Number of subscribers that got an outcome (success or failure).
    #[must_use]
    pub fn attempted(&self) -> u32 {
        self.success_count + self.fail_count
    }
}

/// Data needed to open a delivery log.
#[derive(Debug, Clone)]
pub struct NewDeliveryLog {
    pub app_id: Uuid,
    pub payload: NotificationPayload,
    /// Subscriber count snapshot taken before the log is opened.
    pub total_subscribers: u32,
}

/// Durable record of one dispatch invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLog {
    pub id: Uuid,
    pub app_id: Uuid,
    pub payload: NotificationPayload,
    pub total_subscribers: u32,
    #[serde(flatten)]
    pub counts: DeliveryCounts,
    pub status: DeliveryStatus,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl DeliveryLog {
    /// Builds a freshly opened (`pending`) log.
    #[must_use]
    pub fn open(id: Uuid, new: NewDeliveryLog, created_at: OffsetDateTime) -> Self {
        Self {
            id,
            app_id: new.app_id,
            payload: new.payload,
            total_subscribers: new.total_subscribers,
            counts: DeliveryCounts::default(),
            status: DeliveryStatus::Pending,
            started_at: None,
            completed_at: None,
            created_at,
        }
    }

    /// Applies a lifecycle transition in place.
    ///
    /// Terminal logs are never modified.
    pub fn apply(&mut self, transition: &LogTransition) -> Result<(), StorageError> {
        let next = transition.target_status();
        if !self.status.can_transition_to(next) {
            return Err(StorageError::invalid_transition(self.id, self.status, next));
        }
        match *transition {
            LogTransition::Start { started_at } => {
                self.started_at = Some(started_at);
            }
            LogTransition::Finish {
                counts,
                completed_at,
                ..
            } => {
                self.counts = counts;
                self.completed_at = Some(completed_at);
            }
        }
        self.status = next;
        Ok(())
    }
}

/// The only mutations a delivery log accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTransition {
    /// `pending -> sending`.
    Start { started_at: OffsetDateTime },
    /// `sending -> completed | failed`, writing the final counters.
    Finish {
        status: DeliveryStatus,
        counts: DeliveryCounts,
        completed_at: OffsetDateTime,
    },
}

impl LogTransition {
    #[must_use]
    pub fn start_now() -> Self {
        Self::Start {
            started_at: OffsetDateTime::now_utc(),
        }
    }

    #[must_use]
    pub fn finish_now(status: DeliveryStatus, counts: DeliveryCounts) -> Self {
        Self::Finish {
            status,
            counts,
            completed_at: OffsetDateTime::now_utc(),
        }
    }

    /// The status the log ends up in after this transition.
    #[must_use]
    pub fn target_status(&self) -> DeliveryStatus {
        match self {
            Self::Start { .. } => DeliveryStatus::Sending,
            Self::Finish { status, .. } => *status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending_log() -> DeliveryLog {
        DeliveryLog::open(
            Uuid::new_v4(),
            NewDeliveryLog {
                app_id: Uuid::new_v4(),
                payload: NotificationPayload::titled("hello", None),
                total_subscribers: 3,
            },
            OffsetDateTime::now_utc(),
        )
    }

    #[test]
    fn test_payload_requires_title() {
        assert!(NotificationPayload::new(json!({"title": "Hi"})).validate().is_ok());
        assert_eq!(
            NotificationPayload::new(json!({"body": "no title"})).validate(),
            Err(PayloadError::MissingTitle)
        );
        assert_eq!(
            NotificationPayload::new(json!({"title": "   "})).validate(),
            Err(PayloadError::MissingTitle)
        );
        assert_eq!(
            NotificationPayload::new(json!({"title": 42})).validate(),
            Err(PayloadError::MissingTitle)
        );
        assert_eq!(
            NotificationPayload::new(json!(["title"])).validate(),
            Err(PayloadError::NotAnObject)
        );
    }

    #[test]
    fn test_payload_wire_form_keeps_extra_fields() {
        let payload = NotificationPayload::new(json!({"title": "t", "url": "/inbox"}));
        let wire: Value = serde_json::from_str(&payload.to_wire().unwrap()).unwrap();
        assert_eq!(wire["url"], "/inbox");
        assert_eq!(payload.title(), Some("t"));
    }

    #[test]
    fn test_status_transitions() {
        use DeliveryStatus::*;
        assert!(Pending.can_transition_to(Sending));
        assert!(Sending.can_transition_to(Completed));
        assert!(Sending.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Sending.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Sending));

        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Sending.is_terminal());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(DeliveryStatus::parse("sending").unwrap(), DeliveryStatus::Sending);
        assert!(DeliveryStatus::parse("sent").is_err());
    }

    #[test]
    fn test_log_lifecycle() {
        let mut log = pending_log();
        log.apply(&LogTransition::start_now()).unwrap();
        assert_eq!(log.status, DeliveryStatus::Sending);
        assert!(log.started_at.is_some());

        let counts = DeliveryCounts {
            success_count: 1,
            fail_count: 2,
            stale_removed: 1,
        };
        log.apply(&LogTransition::finish_now(DeliveryStatus::Completed, counts))
            .unwrap();
        assert_eq!(log.status, DeliveryStatus::Completed);
        assert_eq!(log.counts, counts);
        assert!(log.completed_at.is_some());
    }

    #[test]
    fn test_terminal_log_is_immutable() {
        let mut log = pending_log();
        log.apply(&LogTransition::start_now()).unwrap();
        log.apply(&LogTransition::finish_now(
            DeliveryStatus::Failed,
            DeliveryCounts::default(),
        ))
        .unwrap();
        let frozen = log.clone();

        let err = log
            .apply(&LogTransition::finish_now(
                DeliveryStatus::Completed,
                DeliveryCounts::default(),
            ))
            .unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(log, frozen);
    }

    #[test]
    fn test_pending_cannot_skip_sending() {
        let mut log = pending_log();
        let err = log
            .apply(&LogTransition::finish_now(
                DeliveryStatus::Completed,
                DeliveryCounts::default(),
            ))
            .unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(log.status, DeliveryStatus::Pending);
    }

    #[test]
    fn test_log_serializes_camel_case() {
        let log = pending_log();
        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["totalSubscribers"], 3);
        assert_eq!(value["successCount"], 0);
        assert!(value["completedAt"].is_null());
    }
}
