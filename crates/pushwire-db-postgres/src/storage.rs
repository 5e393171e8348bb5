//! PostgreSQL implementation of the pushwire stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushwire_storage::{
    ApplicationRegistry, DeliveryCounts, DeliveryLog, DeliveryLogStore, DeliveryStatus,
    LogTransition, NewDeliveryLog, NewSubscription, NotificationPayload, StorageError,
    StorageResult, Subscription, SubscriptionStore, VapidCredentials,
};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result, storage_err};
use crate::{migrations, pool};

type SubscriptionRow = (
    Uuid,
    Uuid,
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
);

type LogRow = (
    Uuid,
    Uuid,
    serde_json::Value,
    i32,
    i32,
    i32,
    i32,
    String,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

const SUBSCRIPTION_COLUMNS: &str =
    "id, app_id, endpoint, key_p256dh, key_auth, user_agent, created_at";

const LOG_COLUMNS: &str = "id, app_id, payload, total_subscribers, success_count, fail_count, \
     stale_removed, status, started_at, completed_at, created_at";

/// Subscription store, application registry and delivery log store backed by
/// one PostgreSQL pool.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connects with `config`, running migrations first if configured.
    pub async fn new(config: &PostgresConfig) -> Result<Self> {
        let pool = pool::create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Wraps an existing pool. Migrations are the caller's responsibility.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts an application with its credentials and returns its id.
    #[instrument(skip(self, credentials))]
    pub async fn register_app(&self, name: &str, credentials: &VapidCredentials) -> Result<Uuid> {
        let id = Uuid::new_v4();
        query(
            r#"
            INSERT INTO apps (id, name, vapid_public_key, vapid_private_key, vapid_subject)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(&credentials.public_key)
        .bind(&credentials.private_key)
        .bind(&credentials.subject)
        .execute(&self.pool)
        .await?;

        info!(app_id = %id, "Registered application");
        Ok(id)
    }

    fn time_to_chrono(t: OffsetDateTime) -> Result<DateTime<Utc>> {
        DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond())
            .ok_or_else(|| PostgresError::decode(format!("timestamp out of range: {t}")))
    }

    fn chrono_to_time(t: DateTime<Utc>) -> Result<OffsetDateTime> {
        let nanos = t
            .timestamp_nanos_opt()
            .ok_or_else(|| PostgresError::decode(format!("timestamp out of range: {t}")))?;
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
            .map_err(|e| PostgresError::decode(e.to_string()))
    }

    fn to_count(value: i32, column: &str) -> Result<u32> {
        u32::try_from(value)
            .map_err(|_| PostgresError::decode(format!("negative {column}: {value}")))
    }

    fn to_db_count(value: u32) -> StorageResult<i32> {
        i32::try_from(value)
            .map_err(|_| StorageError::invalid_record(format!("count {value} out of range")))
    }

    fn subscription_from_row(row: SubscriptionRow) -> Result<Subscription> {
        let (id, app_id, endpoint, key_p256dh, key_auth, user_agent, created_at) = row;
        Ok(Subscription {
            id,
            app_id,
            endpoint,
            key_p256dh,
            key_auth,
            user_agent,
            created_at: Self::chrono_to_time(created_at)?,
        })
    }

    fn log_from_row(row: LogRow) -> StorageResult<DeliveryLog> {
        let (
            id,
            app_id,
            payload,
            total_subscribers,
            success_count,
            fail_count,
            stale_removed,
            status,
            started_at,
            completed_at,
            created_at,
        ) = row;

        Ok(DeliveryLog {
            id,
            app_id,
            payload: NotificationPayload::new(payload),
            total_subscribers: Self::to_count(total_subscribers, "total_subscribers")?,
            counts: DeliveryCounts {
                success_count: Self::to_count(success_count, "success_count")?,
                fail_count: Self::to_count(fail_count, "fail_count")?,
                stale_removed: Self::to_count(stale_removed, "stale_removed")?,
            },
            status: DeliveryStatus::parse(&status)?,
            started_at: started_at.map(Self::chrono_to_time).transpose()?,
            completed_at: completed_at.map(Self::chrono_to_time).transpose()?,
            created_at: Self::chrono_to_time(created_at)?,
        })
    }

    /// The only status a log may be in for `transition` to apply.
    fn required_source(transition: &LogTransition) -> Option<DeliveryStatus> {
        let target = transition.target_status();
        [DeliveryStatus::Pending, DeliveryStatus::Sending]
            .into_iter()
            .find(|from| from.can_transition_to(target))
    }
}

#[async_trait]
impl SubscriptionStore for PostgresStorage {
    #[instrument(skip(self))]
    async fn list_by_app(&self, app_id: Uuid) -> StorageResult<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE app_id = $1 ORDER BY created_at, id"
        ))
        .bind(app_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.into_iter()
            .map(|row| Self::subscription_from_row(row).map_err(StorageError::from))
            .collect()
    }

    #[instrument(skip(self))]
    async fn count_by_app(&self, app_id: Uuid) -> StorageResult<u32> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM subscriptions WHERE app_id = $1")
            .bind(app_id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        u32::try_from(count).map_err(|_| StorageError::internal("subscriber count overflow"))
    }

    #[instrument(skip(self, new), fields(app_id = %new.app_id))]
    async fn upsert(&self, new: NewSubscription) -> StorageResult<Subscription> {
        if new.endpoint.is_empty() || new.keys.p256dh.is_empty() || new.keys.auth.is_empty() {
            return Err(StorageError::invalid_record("Invalid subscription data"));
        }

        let row: SubscriptionRow = query_as(&format!(
            r#"
            INSERT INTO subscriptions (id, app_id, endpoint, key_p256dh, key_auth, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (app_id, endpoint) DO UPDATE
            SET key_p256dh = EXCLUDED.key_p256dh,
                key_auth = EXCLUDED.key_auth,
                user_agent = EXCLUDED.user_agent
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.app_id)
        .bind(&new.endpoint)
        .bind(&new.keys.p256dh)
        .bind(&new.keys.auth)
        .bind(&new.user_agent)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(Self::subscription_from_row(row)?)
    }

    #[instrument(skip(self))]
    async fn delete(&self, subscription_id: Uuid) -> StorageResult<bool> {
        let result = query("DELETE FROM subscriptions WHERE id = $1")
            .bind(subscription_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ApplicationRegistry for PostgresStorage {
    #[instrument(skip(self))]
    async fn get_credentials(
        &self,
        app_id: Uuid,
    ) -> StorageResult<Option<VapidCredentials>> {
        let row: Option<(String, String, String)> = query_as(
            "SELECT vapid_public_key, vapid_private_key, vapid_subject FROM apps WHERE id = $1",
        )
        .bind(app_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|(public_key, private_key, subject)| VapidCredentials {
            public_key,
            private_key,
            subject,
        }))
    }
}

#[async_trait]
impl DeliveryLogStore for PostgresStorage {
    #[instrument(skip(self, log), fields(app_id = %log.app_id))]
    async fn create(&self, log: NewDeliveryLog) -> StorageResult<DeliveryLog> {
        let row: LogRow = query_as(&format!(
            r#"
            INSERT INTO notification_logs (id, app_id, payload, total_subscribers, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING {LOG_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(log.app_id)
        .bind(log.payload.as_value())
        .bind(Self::to_db_count(log.total_subscribers)?)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        let created = Self::log_from_row(row)?;
        debug!(log_id = %created.id, "Opened delivery log");
        Ok(created)
    }

    #[instrument(skip(self, transition), fields(to = %transition.target_status()))]
    async fn update(
        &self,
        log_id: Uuid,
        transition: LogTransition,
    ) -> StorageResult<DeliveryLog> {
        let target = transition.target_status();
        let Some(source) = Self::required_source(&transition) else {
            let current = self
                .get(log_id)
                .await?
                .ok_or_else(|| StorageError::not_found("delivery_log", log_id))?;
            return Err(StorageError::invalid_transition(log_id, current.status, target));
        };

        // Only one of two concurrent writers can match the status guard.
        let row: Option<LogRow> = match transition {
            LogTransition::Start { started_at } => query_as(&format!(
                r#"
                UPDATE notification_logs
                SET status = $3, started_at = $4
                WHERE id = $1 AND status = $2
                RETURNING {LOG_COLUMNS}
                "#
            ))
            .bind(log_id)
            .bind(source.as_str())
            .bind(target.as_str())
            .bind(Self::time_to_chrono(started_at)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?,
            LogTransition::Finish {
                counts,
                completed_at,
                ..
            } => query_as(&format!(
                r#"
                UPDATE notification_logs
                SET status = $3,
                    success_count = $4,
                    fail_count = $5,
                    stale_removed = $6,
                    completed_at = $7
                WHERE id = $1 AND status = $2
                RETURNING {LOG_COLUMNS}
                "#
            ))
            .bind(log_id)
            .bind(source.as_str())
            .bind(target.as_str())
            .bind(Self::to_db_count(counts.success_count)?)
            .bind(Self::to_db_count(counts.fail_count)?)
            .bind(Self::to_db_count(counts.stale_removed)?)
            .bind(Self::time_to_chrono(completed_at)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?,
        };

        match row {
            Some(row) => Self::log_from_row(row),
            None => {
                let current = self
                    .get(log_id)
                    .await?
                    .ok_or_else(|| StorageError::not_found("delivery_log", log_id))?;
                Err(StorageError::invalid_transition(log_id, current.status, target))
            }
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, log_id: Uuid) -> StorageResult<Option<DeliveryLog>> {
        let row: Option<LogRow> = query_as(&format!(
            "SELECT {LOG_COLUMNS} FROM notification_logs WHERE id = $1"
        ))
        .bind(log_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(Self::log_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_by_app(
        &self,
        app_id: Uuid,
        limit: u32,
    ) -> StorageResult<Vec<DeliveryLog>> {
        let rows: Vec<LogRow> = query_as(&format!(
            "SELECT {LOG_COLUMNS} FROM notification_logs WHERE app_id = $1 \
             ORDER BY created_at DESC, id LIMIT $2"
        ))
        .bind(app_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.into_iter().map(Self::log_from_row).collect()
    }
}
