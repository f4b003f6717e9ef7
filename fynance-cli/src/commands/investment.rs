//! Investment command - the investment ledger

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{Cell, Color};
use dialoguer::Confirm;
use fynance_core::domain::{InvestmentUpdate, MovementFilter, NewInvestment};
use fynance_core::{EntityId, FynanceContext, Investment, InvestmentType, LedgerEntry};
use rust_decimal::Decimal;
use serde_json::json;

use super::{acting_user, get_context, log_command};
use crate::output;

#[derive(Subcommand)]
pub enum InvestmentCommands {
    /// Open an investment with an initial contribution
    Create {
        /// Investment name (unique per user)
        name: String,
        /// CDB, LCI, LCA, TESOURO_DIRETO, ACOES, FUNDOS, CRIPTOMOEDAS or PREVIDENCIA
        #[arg(long = "type", value_name = "TYPE")]
        investment_type: InvestmentType,
        /// Initial amount (may be zero)
        #[arg(long, default_value = "0")]
        amount: Decimal,
        /// Expected yearly return rate in percent
        #[arg(long, default_value = "0")]
        rate: Decimal,
        /// Category of the opening movement
        #[arg(long)]
        category: Option<EntityId>,
    },
    /// List investments
    List {
        /// Only this investment type
        #[arg(long = "type", value_name = "TYPE")]
        investment_type: Option<InvestmentType>,
    },
    /// Show an investment with its ledger
    Show {
        /// Investment id
        id: EntityId,
    },
    /// Change name, type or return rate
    Update {
        /// Investment id
        id: EntityId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type", value_name = "TYPE")]
        investment_type: Option<InvestmentType>,
        #[arg(long)]
        rate: Option<Decimal>,
    },
    /// Add money to an investment
    Contribute {
        /// Investment id
        id: EntityId,
        /// Positive amount
        amount: Decimal,
        #[arg(long, short)]
        description: Option<String>,
        /// Category of the movement
        #[arg(long)]
        category: Option<EntityId>,
    },
    /// Take money out of an investment
    Withdraw {
        /// Investment id
        id: EntityId,
        /// Positive amount, at most the current balance
        amount: Decimal,
        #[arg(long, short)]
        description: Option<String>,
        /// Category of the movement
        #[arg(long)]
        category: Option<EntityId>,
    },
    /// Show profit and return against the net amount invested
    Return {
        /// Investment id
        id: EntityId,
    },
    /// Remove an investment whose balance is zero
    Remove {
        /// Investment id
        id: EntityId,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

fn ledger_entry(amount: Decimal, description: Option<String>, category: Option<EntityId>) -> LedgerEntry {
    let mut entry = LedgerEntry::new(amount);
    if let Some(description) = description {
        entry = entry.with_description(description);
    }
    if let Some(category) = category {
        entry = entry.with_category(category);
    }
    entry
}

fn print_balance(investment: &Investment) {
    println!(
        "{}: balance {}",
        investment.name.bold(),
        output::format_amount(investment.current_balance).green()
    );
}

pub fn run(command: InvestmentCommands, user: Option<&str>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user_id = acting_user(&ctx, user)?;
    let service = &ctx.investment_service;

    match command {
        InvestmentCommands::Create {
            name,
            investment_type,
            amount,
            rate,
            category,
        } => {
            let investment = service.create_investment(
                user_id,
                NewInvestment {
                    investment_type,
                    name,
                    initial_amount: amount,
                    return_rate: rate,
                    category_id: category,
                },
            )?;
            log_command(&ctx, "investment create", Some(user_id));
            if json {
                return output::print_json(&investment);
            }
            output::success(&format!("Opened investment '{}'", investment.name));
            println!("Id: {}", investment.id);
            print_balance(&investment);
        }
        InvestmentCommands::List { investment_type } => {
            let investments = service.list_investments(user_id, investment_type)?;
            if json {
                return output::print_json(&investments);
            }
            if investments.is_empty() {
                println!("No investments yet. Open one with 'fyn investment create'.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Name", "Type", "Balance", "Rate", "Since", "Id"]);
            let mut total = Decimal::ZERO;
            for investment in &investments {
                total += investment.current_balance;
                table.add_row(vec![
                    Cell::new(&investment.name),
                    Cell::new(investment.investment_type.label()),
                    Cell::new(output::format_amount(investment.current_balance)),
                    Cell::new(output::format_percent(investment.return_rate)),
                    Cell::new(investment.application_date.format("%Y-%m-%d")),
                    Cell::new(investment.id),
                ]);
            }
            println!("{}", table);
            println!("Total: {}", output::format_amount(total).bold());
        }
        InvestmentCommands::Show { id } => show(&ctx, id, user_id, json)?,
        InvestmentCommands::Update {
            id,
            name,
            investment_type,
            rate,
        } => {
            let investment = service.update_investment(
                id,
                user_id,
                InvestmentUpdate {
                    name,
                    investment_type,
                    return_rate: rate,
                },
            )?;
            log_command(&ctx, "investment update", Some(user_id));
            if json {
                return output::print_json(&investment);
            }
            output::success(&format!("Updated investment '{}'", investment.name));
        }
        InvestmentCommands::Contribute {
            id,
            amount,
            description,
            category,
        } => {
            let investment =
                service.make_contribution(id, user_id, ledger_entry(amount, description, category))?;
            log_command(&ctx, "investment contribute", Some(user_id));
            if json {
                return output::print_json(&investment);
            }
            output::success(&format!("Contributed {}", output::format_amount(amount)));
            print_balance(&investment);
        }
        InvestmentCommands::Withdraw {
            id,
            amount,
            description,
            category,
        } => {
            let investment =
                service.make_withdrawal(id, user_id, ledger_entry(amount, description, category))?;
            log_command(&ctx, "investment withdraw", Some(user_id));
            if json {
                return output::print_json(&investment);
            }
            output::success(&format!("Withdrew {}", output::format_amount(amount)));
            print_balance(&investment);
        }
        InvestmentCommands::Return { id } => {
            let investment = service.get_investment(id, user_id)?;
            let invested = service.get_total_invested(id, user_id)?;
            let result = service.calculate_return(id, user_id)?;
            if json {
                return output::print_json(&json!({
                    "investment_id": id,
                    "current_balance": investment.current_balance,
                    "total_invested": invested,
                    "profit": result.profit,
                    "return_percentage": result.return_percentage,
                }));
            }
            let color = if result.profit.is_sign_negative() && !result.profit.is_zero() {
                colored::Color::Red
            } else {
                colored::Color::Green
            };
            println!("{}", investment.name.bold());
            println!("  Balance:   {}", output::format_amount(investment.current_balance));
            println!("  Invested:  {}", output::format_amount(invested));
            println!("  Profit:    {}", output::format_amount(result.profit).color(color));
            println!("  Return:    {}", output::format_percent(result.return_percentage).color(color));
        }
        InvestmentCommands::Remove { id, force } => {
            let investment = service.get_investment(id, user_id)?;
            if !investment.current_balance.is_zero() {
                anyhow::bail!(
                    "'{}' still holds {}. Withdraw it before removing.",
                    investment.name,
                    output::format_amount(investment.current_balance)
                );
            }
            if !force && !json {
                if !Confirm::new()
                    .with_prompt(format!("Remove investment '{}'?", investment.name))
                    .default(false)
                    .interact()?
                {
                    println!("{}", "Cancelled".dimmed());
                    return Ok(());
                }
            }
            service.delete_investment(id, user_id)?;
            log_command(&ctx, "investment remove", Some(user_id));
            if json {
                return output::print_json(&json!({ "deleted": id }));
            }
            output::success(&format!("Removed investment '{}'", investment.name));
            output::info("Its movements stay in the log.");
        }
    }

    Ok(())
}

fn show(ctx: &FynanceContext, id: EntityId, user_id: EntityId, json: bool) -> Result<()> {
    let investment = ctx.investment_service.get_investment(id, user_id)?;
    let ledger = ctx.movement_service.list_movements(
        user_id,
        &MovementFilter {
            investment_id: Some(id),
            ..Default::default()
        },
    )?;

    if json {
        return output::print_json(&json!({ "investment": investment, "movements": ledger }));
    }

    println!("{}", investment.name.bold());
    println!("  Id:        {}", investment.id);
    println!("  Type:      {} ({})", investment.investment_type.label(), investment.investment_type.as_str());
    println!("  Balance:   {}", output::format_amount(investment.current_balance));
    println!("  Rate:      {}", output::format_percent(investment.return_rate));
    println!("  Since:     {}", investment.application_date.format("%Y-%m-%d"));
    println!();

    let mut table = output::create_table();
    table.set_header(vec!["Date", "Type", "Amount", "Description"]);
    for movement in &ledger {
        let color = if movement.movement_type.is_deposit() {
            Color::Green
        } else {
            Color::Red
        };
        table.add_row(vec![
            Cell::new(movement.date.format("%Y-%m-%d")),
            Cell::new(movement.movement_type.as_str()),
            Cell::new(output::format_amount(movement.signed_amount())).fg(color),
            Cell::new(&movement.description),
        ]);
    }
    println!("{}", table);
    Ok(())
}
