use anyhow::{Context, Result};
use pushwire_db_postgres::{
    PostgresConfig, create_pool, mask_password, migrations, server_version,
};

use crate::output::print_success;

pub async fn migrate(config: &PostgresConfig) -> Result<()> {
    let pool = create_pool(config)
        .await
        .with_context(|| format!("connecting to {}", mask_password(&config.url)))?;
    let version = server_version(&pool).await?;
    migrations::run(&pool).await?;
    print_success(&format!(
        "Applied {} migration(s) on PostgreSQL {version}",
        migrations::versions().len()
    ));
    Ok(())
}
