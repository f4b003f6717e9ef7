//! Fynance CLI - investment ledger in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

use commands::{category, demo, doctor, investment, logs, movement, user};
use fynance_core::OperationResult;

/// Fynance - investment ledger in your terminal
#[derive(Parser)]
#[command(name = "fyn", version, about, long_about = None)]
struct Cli {
    /// Acting user id
    #[arg(long, global = true, env = "FYNANCE_USER")]
    user: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and inspect users
    User {
        #[command(subcommand)]
        command: user::UserCommands,
    },

    /// Manage movement categories
    Category {
        #[command(subcommand)]
        command: category::CategoryCommands,
    },

    /// Record and browse movements
    Movement {
        #[command(subcommand)]
        command: movement::MovementCommands,
    },

    /// Manage investments and their ledger
    Investment {
        #[command(subcommand)]
        command: investment::InvestmentCommands,
    },

    /// Check balances against the movement log
    Doctor {
        /// Show details of failing checks
        #[arg(long, short)]
        verbose: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },

    /// Manage demo mode
    Demo {
        #[command(subcommand)]
        command: Option<demo::DemoCommands>,
    },
}

/// Diagnostics go to stderr; `RUST_LOG` filters, `FYNANCE_LOG_FORMAT=json` switches format
fn init_tracing() {
    let log_format = std::env::var("FYNANCE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let json = cli.json;

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!("command failed: {:?}", e);
            report_error(&e, json);
            ExitCode::FAILURE
        }
    }
}

fn report_error(e: &anyhow::Error, json: bool) {
    let core_error = e.downcast_ref::<fynance_core::Error>();
    if json {
        let result: OperationResult<()> = match core_error {
            Some(err) => OperationResult::from_error(err),
            None => OperationResult::fail(format!("{:#}", e)),
        };
        if let Ok(text) = serde_json::to_string_pretty(&result) {
            println!("{}", text);
        }
        return;
    }
    match core_error {
        Some(err) => eprintln!("{} {}", format!("[{}]", err.code()).red(), err),
        None => eprintln!("{}", format!("{:#}", e).red()),
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let acting = cli.user.as_deref();
    let json = cli.json;

    match cli.command {
        Commands::User { command } => user::run(command, acting, json)?,
        Commands::Category { command } => category::run(command, acting, json)?,
        Commands::Movement { command } => movement::run(command, acting, json)?,
        Commands::Investment { command } => investment::run(command, acting, json)?,
        Commands::Doctor { verbose } => return doctor::run(acting, verbose, json),
        Commands::Logs { command } => logs::run(command, json)?,
        Commands::Demo { command } => demo::run(command, json)?,
    }
    Ok(ExitCode::SUCCESS)
}
