use anyhow::{Context, Result, bail};
use pushwire_dispatch::Dispatcher;
use pushwire_storage::{DeliveryLog, DeliveryStatus, NotificationPayload};
use serde_json::{Map, Value};

use crate::cli::{OutputFormat, SendArgs};
use crate::output::{print_json, print_log, print_success};

/// Builds the notification payload from command line flags.
pub fn build_payload(args: &SendArgs) -> Result<NotificationPayload> {
    let mut map = Map::new();
    map.insert("title".into(), Value::String(args.title.clone()));
    for (key, value) in [("body", &args.body), ("icon", &args.icon), ("url", &args.url)] {
        if let Some(value) = value {
            map.insert(key.into(), Value::String(value.clone()));
        }
    }
    if let Some(raw) = &args.data {
        let data: Value = serde_json::from_str(raw).context("--data is not valid JSON")?;
        if !data.is_object() {
            bail!("--data must be a JSON object");
        }
        map.insert("data".into(), data);
    }
    Ok(NotificationPayload::new(Value::Object(map)))
}

pub async fn send(dispatcher: &Dispatcher, args: &SendArgs, format: OutputFormat) -> Result<()> {
    let payload = build_payload(args)?;
    let ticket = dispatcher.send(args.app, payload).await?;
    print_json(&ticket.receipt())?;

    // Keep the runtime alive until the dispatch is terminal.
    let log = ticket.wait().await?;
    if args.wait {
        print_log(&log, format)?;
    }
    print_success(&summarize(&log)?);
    Ok(())
}

/// One-line summary of a finished dispatch. A failed dispatch is an error.
fn summarize(log: &DeliveryLog) -> Result<String> {
    let counts = &log.counts;
    match log.status {
        DeliveryStatus::Completed => Ok(format!(
            "Delivered to {}/{} subscriber(s), {} stale removed",
            counts.success_count, log.total_subscribers, counts.stale_removed
        )),
        status => bail!(
            "dispatch {} ended as {status}: {} of {} deliveries failed",
            log.id,
            counts.fail_count,
            counts.attempted()
        ),
    }
}
