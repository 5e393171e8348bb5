use colored::Colorize;
use pushwire_storage::{DeliveryLog, DeliveryStatus};
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::cli::OutputFormat;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_time(t: Option<OffsetDateTime>) -> String {
    t.and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".to_string())
}

fn colored_status(status: DeliveryStatus) -> String {
    match status {
        DeliveryStatus::Completed => status.as_str().green().to_string(),
        DeliveryStatus::Failed => status.as_str().red().to_string(),
        DeliveryStatus::Pending | DeliveryStatus::Sending => status.as_str().yellow().to_string(),
    }
}

pub fn print_log(log: &DeliveryLog, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(log),
        OutputFormat::Table => {
            let mut builder = Builder::default();
            let rows = [
                ("ID", log.id.to_string()),
                ("App", log.app_id.to_string()),
                ("Status", colored_status(log.status)),
                ("Title", log.payload.title().unwrap_or("-").to_string()),
                ("Total", log.total_subscribers.to_string()),
                ("Success", log.counts.success_count.to_string()),
                ("Failed", log.counts.fail_count.to_string()),
                ("Stale removed", log.counts.stale_removed.to_string()),
                ("Created", format_time(Some(log.created_at))),
                ("Started", format_time(log.started_at)),
                ("Completed", format_time(log.completed_at)),
            ];
            for (key, value) in rows {
                builder.push_record([key.to_string(), value]);
            }
            println!("{}", builder.build().with(Style::rounded()));
            Ok(())
        }
    }
}

pub fn print_logs(logs: &[DeliveryLog], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&logs),
        OutputFormat::Table => {
            if logs.is_empty() {
                println!("No delivery logs found.");
                return Ok(());
            }
            println!("{}", logs_table(logs));
            println!("Total: {}", logs.len());
            Ok(())
        }
    }
}

fn logs_table(logs: &[DeliveryLog]) -> String {
    let mut builder = Builder::default();
    builder.push_record([
        "ID", "Status", "Title", "Total", "Success", "Failed", "Stale", "Created",
    ]);
    for log in logs {
        builder.push_record([
            log.id.to_string(),
            colored_status(log.status),
            log.payload.title().unwrap_or("-").to_string(),
            log.total_subscribers.to_string(),
            log.counts.success_count.to_string(),
            log.counts.fail_count.to_string(),
            log.counts.stale_removed.to_string(),
            format_time(Some(log.created_at)),
        ]);
    }
    builder.build().with(Style::rounded()).to_string()
}
