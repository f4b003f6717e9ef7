//! Logs command - view and manage the event log

use anyhow::{anyhow, Result};
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;

use super::get_fynance_dir;
use crate::output;
use fynance_core::services::{EntryPoint, LoggingService};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Only this event name
        #[arg(long)]
        event: Option<String>,
    },
    /// Clear old log entries
    Clear {
        /// Delete logs older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u32,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Show log statistics and database path
    Stats,
}

fn get_logging_service() -> Result<LoggingService> {
    let fynance_dir = get_fynance_dir()?;
    std::fs::create_dir_all(&fynance_dir)?;
    LoggingService::new(&fynance_dir, EntryPoint::Cli, fynance_core::VERSION)
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub fn run(command: LogsCommands, json: bool) -> Result<()> {
    let service = get_logging_service()?;

    match command {
        LogsCommands::List { limit, errors, event } => {
            let entries = match (&event, errors) {
                (Some(event), _) => service.get_by_event(event, limit)?,
                (None, true) => service.get_errors(limit)?,
                (None, false) => service.get_recent(limit)?,
            };

            if json {
                return output::print_json(&entries);
            }
            if entries.is_empty() {
                println!("No log entries found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Time", "Entry", "Event", "Context", "Error"]);
            for entry in &entries {
                let entity = match (&entry.entity, &entry.entity_id) {
                    (Some(entity), Some(id)) => Some(format!("{} {}", entity, id)),
                    (Some(entity), None) => Some(entity.clone()),
                    _ => None,
                };
                let context = [entry.command.clone(), entity]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(", ");

                table.add_row(vec![
                    format_timestamp(entry.timestamp),
                    entry.entry_point.clone(),
                    entry.event.clone(),
                    context,
                    entry.error_message.clone().unwrap_or_default(),
                ]);
            }
            println!("{}", table);
        }
        LogsCommands::Clear {
            older_than_days,
            force,
        } => {
            let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));

            if !force && !json {
                if !Confirm::new()
                    .with_prompt(format!("Delete logs older than {} days?", older_than_days))
                    .default(false)
                    .interact()?
                {
                    println!("{}", "Cancelled.".dimmed());
                    return Ok(());
                }
            }

            let deleted = service.delete_before(cutoff.timestamp_millis())?;
            if json {
                return output::print_json(&serde_json::json!({ "deleted": deleted }));
            }
            println!("Deleted {} log entries", deleted);
        }
        LogsCommands::Stats => {
            let total = service.count()?;
            let by_event = service.count_by_event()?;
            let db_path = service
                .db_path()
                .ok_or_else(|| anyhow!("event log is not backed by a file"))?
                .to_path_buf();
            let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

            if json {
                return output::print_json(&serde_json::json!({
                    "total_entries": total,
                    "events": by_event,
                    "database_path": db_path.to_string_lossy(),
                    "database_size_bytes": size_bytes,
                }));
            }

            println!("{}", "Log Statistics".bold());
            println!("  Total entries: {}", total);
            println!("  Database: {}", db_path.display());
            println!("  Size: {} bytes", size_bytes);
            if !by_event.is_empty() {
                let mut table = output::create_table();
                table.set_header(vec!["Event", "Count", "Errors"]);
                for count in &by_event {
                    table.add_row(vec![
                        count.event.clone(),
                        count.count.to_string(),
                        count.errors.to_string(),
                    ]);
                }
                println!("{}", table);
            }
        }
    }

    Ok(())
}
