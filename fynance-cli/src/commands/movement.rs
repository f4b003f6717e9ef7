//! Movement command - record and browse the movement log

use std::collections::HashMap;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{Cell, Color};
use dialoguer::Confirm;
use fynance_core::domain::{MovementFilter, MovementUpdate, NewMovement};
use fynance_core::{EntityId, MovementType};
use rust_decimal::Decimal;

use super::{acting_user, get_context, log_command, parse_date};
use crate::output;

#[derive(Subcommand)]
pub enum MovementCommands {
    /// Record a movement
    Add {
        /// RECEIPT, EXPENSE, TRANSFER or GOALS
        #[arg(value_name = "TYPE")]
        movement_type: MovementType,
        /// Positive amount
        amount: Decimal,
        /// Category id
        #[arg(long)]
        category: EntityId,
        /// Free text description
        #[arg(long, short, default_value = "")]
        description: String,
        /// Movement date (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<String>,
    },
    /// List movements, newest first
    List {
        /// Only this category
        #[arg(long)]
        category: Option<EntityId>,
        /// Only movements of this investment
        #[arg(long)]
        investment: Option<EntityId>,
        /// Only this movement type
        #[arg(long = "type", value_name = "TYPE")]
        movement_type: Option<MovementType>,
        /// Maximum number of rows to show
        #[arg(long, short, default_value = "50")]
        limit: usize,
    },
    /// Edit a movement that is not part of an investment ledger
    Edit {
        /// Movement id
        id: EntityId,
        #[arg(long = "type", value_name = "TYPE")]
        movement_type: Option<MovementType>,
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long)]
        category: Option<EntityId>,
        #[arg(long, short)]
        description: Option<String>,
        /// New date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },
    /// Remove a movement that is not part of an investment ledger
    Remove {
        /// Movement id
        id: EntityId,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

pub fn run(command: MovementCommands, user: Option<&str>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user_id = acting_user(&ctx, user)?;
    let service = &ctx.movement_service;

    match command {
        MovementCommands::Add {
            movement_type,
            amount,
            category,
            description,
            date,
        } => {
            let date = date.as_deref().map(parse_date).transpose()?;
            let movement = service.create_movement(
                user_id,
                NewMovement {
                    category_id: category,
                    movement_type,
                    amount,
                    description,
                    date,
                },
            )?;
            log_command(&ctx, "movement add", Some(user_id));
            if json {
                return output::print_json(&movement);
            }
            output::success(&format!(
                "Recorded {} of {}",
                movement.movement_type.as_str(),
                output::format_amount(movement.amount)
            ));
            println!("Id: {}", movement.id);
        }
        MovementCommands::List {
            category,
            investment,
            movement_type,
            limit,
        } => {
            let filter = MovementFilter {
                category_id: category,
                investment_id: investment,
                movement_type,
            };
            let mut movements = service.list_movements(user_id, &filter)?;
            movements.truncate(limit);
            if json {
                return output::print_json(&movements);
            }
            if movements.is_empty() {
                println!("No movements found.");
                return Ok(());
            }

            let categories: HashMap<EntityId, String> = ctx
                .category_service
                .list_categories(user_id)?
                .into_iter()
                .map(|c| (c.id, c.name))
                .collect();

            let mut table = output::create_table();
            table.set_header(vec!["Date", "Type", "Amount", "Category", "Description", "Id"]);
            for movement in &movements {
                let color = if movement.movement_type.is_deposit() {
                    Color::Green
                } else {
                    Color::Red
                };
                let mut description = movement.description.clone();
                if movement.is_investment_linked() {
                    description = format!("{} [ledger]", description);
                }
                table.add_row(vec![
                    Cell::new(movement.date.format("%Y-%m-%d")),
                    Cell::new(movement.movement_type.as_str()),
                    Cell::new(output::format_amount(movement.signed_amount())).fg(color),
                    Cell::new(categories.get(&movement.category_id).map(String::as_str).unwrap_or("?")),
                    Cell::new(description),
                    Cell::new(movement.id),
                ]);
            }
            println!("{}", table);
        }
        MovementCommands::Edit {
            id,
            movement_type,
            amount,
            category,
            description,
            date,
        } => {
            let update = MovementUpdate {
                category_id: category,
                movement_type,
                amount,
                description,
                date: date.as_deref().map(parse_date).transpose()?,
            };
            let movement = service.update_movement(id, user_id, update)?;
            log_command(&ctx, "movement edit", Some(user_id));
            if json {
                return output::print_json(&movement);
            }
            output::success("Movement updated");
        }
        MovementCommands::Remove { id, force } => {
            let movement = service.get_movement(id, user_id)?;
            if !force && !json {
                if !Confirm::new()
                    .with_prompt(format!(
                        "Remove {} of {} ({})?",
                        movement.movement_type.as_str(),
                        output::format_amount(movement.amount),
                        movement.date.format("%Y-%m-%d")
                    ))
                    .default(false)
                    .interact()?
                {
                    println!("{}", "Cancelled".dimmed());
                    return Ok(());
                }
            }
            service.delete_movement(id, user_id)?;
            log_command(&ctx, "movement remove", Some(user_id));
            if json {
                return output::print_json(&serde_json::json!({ "deleted": id }));
            }
            output::success("Movement removed");
        }
    }

    Ok(())
}
