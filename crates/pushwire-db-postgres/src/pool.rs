//! Pool construction for the pushwire stores.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_core::query_as::query_as;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{info, instrument};
use url::Url;

use crate::config::PostgresConfig;
use crate::error::Result;

/// Connection lifetime used when `max_lifetime_secs` is not set.
const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Pool options for a validated `config`.
pub(crate) fn pool_options(config: &PostgresConfig) -> PoolOptions<Postgres> {
    // Keep one connection warm unless told otherwise.
    let min_connections = config.min_connections.unwrap_or(1).min(config.pool_size);

    PoolOptions::<Postgres>::new()
        .max_connections(config.pool_size)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .idle_timeout(config.idle_timeout_ms.map(Duration::from_millis))
        .max_lifetime(
            config
                .max_lifetime_secs
                .map_or(DEFAULT_MAX_LIFETIME, Duration::from_secs),
        )
        .test_before_acquire(false)
}

/// Validates `config`, connects and checks that the server answers.
#[instrument(skip(config), fields(url = %mask_password(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    config.validate()?;

    let pool = pool_options(config).connect(&config.url).await?;
    let version = server_version(&pool).await?;

    info!(
        pool_size = config.pool_size,
        server_version = %version,
        "Connected to PostgreSQL"
    );
    Ok(pool)
}

/// The server's `server_version` setting, e.g. `16.4`.
pub async fn server_version(pool: &PgPool) -> Result<String> {
    let (version,): (String,) = query_as("SHOW server_version").fetch_one(pool).await?;
    Ok(version)
}

/// Replaces the password of a database URL with `****` for log output.
///
/// A URL that does not parse is hidden entirely.
pub fn mask_password(database_url: &str) -> String {
    match Url::parse(database_url) {
        Ok(mut url) if url.password().is_some() => match url.set_password(Some("****")) {
            Ok(()) => url.to_string(),
            Err(()) => "****".to_string(),
        },
        Ok(_) => database_url.to_string(),
        Err(_) => "<invalid database url>".to_string(),
    }
}
