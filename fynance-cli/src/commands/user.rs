//! User command - register and inspect users

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use fynance_core::Plan;

use super::{acting_user, get_context, log_command};
use crate::output;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Register {
        /// Display name
        name: String,
        /// Email address (unique)
        email: String,
        /// Plan: FREE, BASIC or PRO
        #[arg(long, default_value = "FREE")]
        plan: Plan,
    },
    /// Show the acting user
    Show,
}

pub fn run(command: UserCommands, user: Option<&str>, json: bool) -> Result<()> {
    let ctx = get_context()?;

    match command {
        UserCommands::Register { name, email, plan } => {
            let registered = ctx.user_service.register_user(&name, &email, plan)?;
            log_command(&ctx, "user register", Some(registered.id));

            if json {
                return output::print_json(&registered);
            }
            output::success(&format!("Registered {} ({})", registered.name, registered.email));
            println!("User id: {}", registered.id.to_string().bold());
            println!(
                "{}",
                format!("Use --user {} or export FYNANCE_USER to act as this user", registered.id)
                    .dimmed()
            );
        }
        UserCommands::Show => {
            let user_id = acting_user(&ctx, user)?;
            let found = ctx.user_service.get_user(user_id)?;
            log_command(&ctx, "user show", Some(user_id));

            if json {
                return output::print_json(&found);
            }
            println!("{}", found.name.bold());
            println!("  Id:      {}", found.id);
            println!("  Email:   {}", found.email);
            println!("  Plan:    {}", found.plan);
            println!("  Since:   {}", found.created_at.format("%Y-%m-%d"));
        }
    }

    Ok(())
}
