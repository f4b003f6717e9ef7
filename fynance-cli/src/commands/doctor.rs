//! Doctor command - ledger reconciliation checks

use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};
use serde_json::Value;

use super::{get_context, log_command};
use crate::output;

/// Format a detail JSON value for display
fn format_detail(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}: {}", k, s),
                _ => format!("{}: {}", k, v),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

/// Checks every user's ledger unless `--user` narrows it down.
/// Exits non-zero when any check reports an error.
pub fn run(user: Option<&str>, verbose: bool, json: bool) -> Result<ExitCode> {
    let ctx = get_context()?;
    let user_id = user.map(fynance_core::EntityId::parse).transpose()?;
    let result = ctx.doctor_service.run_checks(user_id)?;
    log_command(&ctx, "doctor", user_id);

    let exit = if result.summary.errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    };

    if json {
        output::print_json(&result)?;
        return Ok(exit);
    }

    println!("{}", "Ledger Health Check".bold());
    println!();

    let mut names: Vec<&String> = result.checks.keys().collect();
    names.sort();

    let mut table = output::create_table();
    table.set_header(vec!["Check", "Status", "Message"]);
    for name in names {
        let check = &result.checks[name];
        let status_cell = match check.status.as_str() {
            "pass" => Cell::new("PASS").fg(Color::Green),
            "info" => Cell::new("INFO").fg(Color::Cyan),
            "warning" => Cell::new("WARN").fg(Color::Yellow),
            "error" => Cell::new("ERROR").fg(Color::Red),
            _ => Cell::new(&check.status),
        };
        table.add_row(vec![Cell::new(name), status_cell, Cell::new(&check.message)]);

        if verbose {
            for detail in check.details.iter().flatten() {
                table.add_row(vec![
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new(format!("  - {}", format_detail(detail))),
                ]);
            }
        }
    }
    println!("{}", table);
    println!();

    println!(
        "Summary: {} passed, {} info, {} warnings, {} errors",
        result.summary.passed.to_string().green(),
        result.summary.info.to_string().cyan(),
        result.summary.warnings.to_string().yellow(),
        result.summary.errors.to_string().red(),
    );

    Ok(exit)
}
