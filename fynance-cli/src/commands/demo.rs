//! Demo command - manage demo mode

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::get_fynance_dir;
use crate::output;
use fynance_core::services::{DemoService, DEMO_USER_EMAIL};

#[derive(Subcommand)]
pub enum DemoCommands {
    /// Enable demo mode
    #[command(name = "on")]
    On,
    /// Disable demo mode
    #[command(name = "off")]
    Off {
        /// Also delete the demo database
        #[arg(long)]
        clean: bool,
    },
    /// Show demo mode status
    Status,
}

pub fn run(command: Option<DemoCommands>, json: bool) -> Result<()> {
    let fynance_dir = get_fynance_dir()?;
    std::fs::create_dir_all(&fynance_dir)?;
    let demo_service = DemoService::new(&fynance_dir);

    match command {
        Some(DemoCommands::On) => {
            demo_service.enable()?;
            if json {
                return output::print_json(&serde_json::json!({ "demo_mode": true }));
            }
            println!("{}", "Demo mode enabled".green());
            println!(
                "Acting as {} unless --user is given. Try 'fyn investment list'.",
                DEMO_USER_EMAIL
            );
        }
        Some(DemoCommands::Off { clean }) => {
            demo_service.disable(clean)?;
            if json {
                return output::print_json(&serde_json::json!({ "demo_mode": false }));
            }
            output::warning("Demo mode disabled");
        }
        Some(DemoCommands::Status) | None => {
            let enabled = demo_service.is_enabled()?;
            if json {
                return output::print_json(&serde_json::json!({ "demo_mode": enabled }));
            }
            if enabled {
                println!("Demo mode is {}", "ON".green());
            } else {
                println!("Demo mode is {}", "OFF".yellow());
            }
        }
    }

    Ok(())
}
