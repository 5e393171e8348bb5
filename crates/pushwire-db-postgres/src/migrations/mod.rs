//! Embedded schema migrations.
//!
//! SQL files live in the crate's `migrations/` directory and are compiled into
//! the binary, so `pushwire migrate` needs no files on disk. Applied versions
//! are tracked in `_sqlx_migrations`.
//!
//! To add a migration, create the SQL file and append it to
//! `embedded_migrations!()` in version order.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::{PostgresError, Result};

/// `(version, description, sql)` in apply order.
macro_rules! embedded_migrations {
    () => {
        &[(
            20260301000001i64,
            "pushwire_schema",
            include_str!("../../migrations/20260301000001_pushwire_schema.sql"),
        )]
    };
}

fn build_migrations() -> Vec<Migration> {
    embedded_migrations!()
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Versions of all embedded migrations, oldest first.
pub fn versions() -> Vec<i64> {
    build_migrations().iter().map(|m| m.version).collect()
}

/// Applies every pending migration.
///
/// # Errors
///
/// Returns `PostgresError::Migration` if a migration fails to execute.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> Result<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running embedded database migrations");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| PostgresError::Migration(format!("Migration failed: {e}")))?;

    info!("Database migrations completed");
    Ok(())
}
