use anyhow::Result;
use pushwire_dispatch::Dispatcher;
use uuid::Uuid;

use crate::cli::OutputFormat;
use crate::output::{print_log, print_logs};

pub async fn show(dispatcher: &Dispatcher, log_id: Uuid, format: OutputFormat) -> Result<()> {
    let log = dispatcher.get_log(log_id).await?;
    print_log(&log, format)
}

pub async fn list(
    dispatcher: &Dispatcher,
    app_id: Uuid,
    limit: u32,
    format: OutputFormat,
) -> Result<()> {
    let logs = dispatcher.recent_logs(app_id, limit).await?;
    print_logs(&logs, format)
}
