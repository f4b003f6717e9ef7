//! CLI command implementations

pub mod category;
pub mod demo;
pub mod doctor;
pub mod investment;
pub mod logs;
pub mod movement;
pub mod user;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use fynance_core::services::{EntryPoint, LogEvent, DEMO_USER_EMAIL};
use fynance_core::{EntityId, FynanceContext};

/// Get the fynance directory from environment or default
pub fn get_fynance_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("FYNANCE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".fynance"))
        .ok_or_else(|| anyhow!("Could not find home directory; set FYNANCE_DIR"))
}

/// Open the context for the current data directory
pub fn get_context() -> Result<FynanceContext> {
    let fynance_dir = get_fynance_dir()?;
    std::fs::create_dir_all(&fynance_dir)
        .with_context(|| format!("Failed to create fynance directory: {:?}", fynance_dir))?;

    FynanceContext::new(&fynance_dir, EntryPoint::Cli)
        .context("Failed to initialize fynance context")
}

/// The acting user: `--user` / `FYNANCE_USER`, else the demo user in demo mode
pub fn acting_user(ctx: &FynanceContext, user: Option<&str>) -> Result<EntityId> {
    if let Some(user) = user {
        return Ok(EntityId::parse(user)?);
    }
    if ctx.config.demo_mode {
        if let Some(demo) = ctx.user_service.find_by_email(DEMO_USER_EMAIL)? {
            return Ok(demo.id);
        }
    }
    Err(anyhow!(
        "No acting user. Pass --user <id> or set FYNANCE_USER (see 'fyn user register')"
    ))
}

/// Record a command in the event log, ignoring any errors
pub fn log_command(ctx: &FynanceContext, command: &str, user_id: Option<EntityId>) {
    if let Some(event_log) = &ctx.event_log {
        let mut event = LogEvent::new("command").with_command(command);
        if let Some(user_id) = user_id {
            event = event.with_user(user_id);
        }
        event_log.record(event);
    }
}

/// Parse a `YYYY-MM-DD` date as midnight UTC
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid date '{}'", value))?;
    Ok(midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_date() {
        let date = parse_date("2024-02-29").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 2, 29));
        assert!(parse_date("29/02/2024").is_err());
        assert!(parse_date("2023-02-29").is_err());
    }
}
