//! Category command - manage movement categories

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use fynance_core::domain::{CategoryUpdate, NewCategory};
use fynance_core::EntityId;

use super::{acting_user, get_context, log_command};
use crate::output;

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// Add a category
    Add {
        /// Category name (unique per user)
        name: String,
        /// Icon name
        #[arg(long)]
        icon: Option<String>,
    },
    /// List categories
    List,
    /// Rename a category or change its icon
    Rename {
        /// Category id
        id: EntityId,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New icon
        #[arg(long)]
        icon: Option<String>,
    },
    /// Remove a category that no movement uses
    Remove {
        /// Category id
        id: EntityId,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

pub fn run(command: CategoryCommands, user: Option<&str>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user_id = acting_user(&ctx, user)?;
    let service = &ctx.category_service;

    match command {
        CategoryCommands::Add { name, icon } => {
            let category = service.create_category(user_id, NewCategory { name, icon })?;
            log_command(&ctx, "category add", Some(user_id));
            if json {
                return output::print_json(&category);
            }
            output::success(&format!("Created category '{}'", category.name));
            println!("Id: {}", category.id);
        }
        CategoryCommands::List => {
            let categories = service.list_categories(user_id)?;
            if json {
                return output::print_json(&categories);
            }
            if categories.is_empty() {
                println!("No categories yet. Add one with 'fyn category add <name>'.");
                return Ok(());
            }
            let mut table = output::create_table();
            table.set_header(vec!["Name", "Icon", "Id"]);
            for category in &categories {
                table.add_row(vec![
                    category.name.clone(),
                    category.icon.clone().unwrap_or_default(),
                    category.id.to_string(),
                ]);
            }
            println!("{}", table);
        }
        CategoryCommands::Rename { id, name, icon } => {
            if name.is_none() && icon.is_none() {
                anyhow::bail!("Nothing to change. Pass --name and/or --icon.");
            }
            let category = service.update_category(id, user_id, CategoryUpdate { name, icon })?;
            log_command(&ctx, "category rename", Some(user_id));
            if json {
                return output::print_json(&category);
            }
            output::success(&format!("Updated category '{}'", category.name));
        }
        CategoryCommands::Remove { id, force } => {
            let category = service.get_category(id, user_id)?;
            if !force && !json {
                if !Confirm::new()
                    .with_prompt(format!("Remove category '{}'?", category.name))
                    .default(false)
                    .interact()?
                {
                    println!("{}", "Cancelled".dimmed());
                    return Ok(());
                }
            }
            service.delete_category(id, user_id)?;
            log_command(&ctx, "category remove", Some(user_id));
            if json {
                return output::print_json(&serde_json::json!({ "deleted": id }));
            }
            output::success(&format!("Removed category '{}'", category.name));
        }
    }

    Ok(())
}
