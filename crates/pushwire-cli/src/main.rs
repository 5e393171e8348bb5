mod cli;
mod commands;
mod config;
mod observability;
mod output;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pushwire_db_postgres::{PostgresStorage, mask_password};
use pushwire_dispatch::{Dispatcher, WebPushTransport};

use cli::{Cli, Commands, OutputFormat};
use config::AppConfig;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    match dotenvy::dotenv() {
        Err(e) if !e.not_found() => return Err(e).context("reading .env"),
        _ => {}
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::VapidKeys => {
            commands::keys::vapid_keys(cli.format.unwrap_or(OutputFormat::Json))?;
        }
        Commands::Migrate => {
            let cfg = load(&cli)?;
            commands::migrate::migrate(&cfg.database).await?;
        }
        Commands::Send(args) => {
            let dispatcher = make_dispatcher(load(&cli)?).await?;
            let format = cli.format.unwrap_or(OutputFormat::Table);
            commands::send::send(&dispatcher, args, format).await?;
        }
        Commands::Log(args) => {
            let dispatcher = make_dispatcher(load(&cli)?).await?;
            let format = cli.format.unwrap_or(OutputFormat::Json);
            commands::logs::show(&dispatcher, args.id, format).await?;
        }
        Commands::Logs(args) => {
            let dispatcher = make_dispatcher(load(&cli)?).await?;
            let format = cli.format.unwrap_or(OutputFormat::Table);
            commands::logs::list(&dispatcher, args.app, args.limit, format).await?;
        }
    }

    Ok(())
}

/// Loads configuration and installs logging for commands that touch the database.
fn load(cli: &Cli) -> Result<AppConfig> {
    let cfg = config::loader::load_config(cli.config.as_deref()).map_err(anyhow::Error::msg)?;
    observability::init_tracing_with_level(&cfg.logging.level);
    Ok(cfg)
}

async fn make_dispatcher(cfg: AppConfig) -> Result<Dispatcher> {
    tracing::debug!(database = %mask_password(&cfg.database.url), "Opening storage");
    let storage = PostgresStorage::new(&cfg.database)
        .await
        .with_context(|| format!("connecting to {}", mask_password(&cfg.database.url)))?;
    let storage = Arc::new(storage);
    let transport = Arc::new(WebPushTransport::new(cfg.transport)?);

    Ok(Dispatcher::new(
        storage.clone(),
        storage.clone(),
        storage,
        transport,
        cfg.dispatch,
    )?)
}
