//! Demo service - manage demo mode
//!
//! Demo mode swaps the ledger database for `demo.duckdb`, seeded with a demo
//! user, a few months of movements and some investments. Seeding goes through
//! the services so the demo ledger satisfies the same invariants as a real one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::adapters::duckdb::DuckDbRepository;
use crate::config::Config;
use crate::domain::{
    EntityId, InvestmentType, LedgerEntry, MovementType, NewCategory, NewInvestment, NewMovement,
    Plan,
};
use crate::{FynanceContext, Stores, DEMO_DB_FILENAME};

/// Email of the user demo mode acts as
pub const DEMO_USER_EMAIL: &str = "demo@fynance.local";

/// (name, icon)
const DEMO_CATEGORIES: &[(&str, &str)] = &[
    ("Salary", "briefcase"),
    ("Groceries", "shopping-cart"),
    ("Rent", "home"),
    ("Transport", "car"),
    ("Savings goal", "target"),
];

/// (category, type, amount, description, days ago)
const DEMO_MOVEMENTS: &[(&str, MovementType, Decimal, &str, i64)] = &[
    ("Salary", MovementType::Receipt, dec!(8500), "Monthly salary", 75),
    ("Rent", MovementType::Expense, dec!(2200), "Apartment rent", 73),
    ("Groceries", MovementType::Expense, dec!(612.40), "Supermarket", 68),
    ("Transport", MovementType::Expense, dec!(180), "Metro card", 66),
    ("Salary", MovementType::Receipt, dec!(8500), "Monthly salary", 45),
    ("Rent", MovementType::Expense, dec!(2200), "Apartment rent", 43),
    ("Groceries", MovementType::Expense, dec!(548.90), "Supermarket", 38),
    ("Savings goal", MovementType::Goals, dec!(500), "Emergency fund", 36),
    ("Salary", MovementType::Receipt, dec!(8500), "Monthly salary", 15),
    ("Rent", MovementType::Expense, dec!(2200), "Apartment rent", 13),
    ("Groceries", MovementType::Expense, dec!(701.15), "Supermarket", 8),
    ("Transport", MovementType::Transfer, dec!(350), "Transfer to spouse", 5),
];

/// Demo service for managing demo mode
pub struct DemoService {
    data_dir: PathBuf,
}

impl DemoService {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
        }
    }

    /// Check if demo mode is currently enabled
    pub fn is_enabled(&self) -> Result<bool> {
        let config = Config::load(&self.data_dir)?;
        Ok(config.demo_mode)
    }

    /// Enable demo mode
    ///
    /// This will:
    /// 1. Delete any existing demo database (fresh start)
    /// 2. Enable demo mode in config
    /// 3. Create demo database with sample data
    pub fn enable(&self) -> Result<()> {
        self.remove_demo_database()?;

        let mut config = Config::load(&self.data_dir).unwrap_or_default();
        config.enable_demo_mode();
        config.save(&self.data_dir)?;

        let repository = Arc::new(DuckDbRepository::new(&self.data_dir.join(DEMO_DB_FILENAME))?);
        repository.ensure_schema()?;

        let ctx = FynanceContext::from_stores(config, Stores::duckdb(repository), None);
        seed(&ctx)?;
        Ok(())
    }

    /// Disable demo mode
    ///
    /// This will:
    /// 1. Disable demo mode in config
    /// 2. Optionally delete demo database (if clean = true)
    pub fn disable(&self, clean: bool) -> Result<()> {
        let mut config = Config::load(&self.data_dir).unwrap_or_default();
        config.disable_demo_mode();
        config.save(&self.data_dir)?;

        if clean {
            self.remove_demo_database()?;
        }
        Ok(())
    }

    fn remove_demo_database(&self) -> Result<()> {
        let demo_db = self.data_dir.join(DEMO_DB_FILENAME);
        let demo_wal = self.data_dir.join(format!("{}.wal", DEMO_DB_FILENAME));
        if demo_db.exists() {
            std::fs::remove_file(&demo_db)?;
        }
        if demo_wal.exists() {
            std::fs::remove_file(&demo_wal)?;
        }
        Ok(())
    }
}

/// Populate a fresh context with the demo user and their ledger
pub(crate) fn seed(ctx: &FynanceContext) -> Result<EntityId> {
    let user = ctx
        .user_service
        .register_user("Demo User", DEMO_USER_EMAIL, Plan::Pro)?;
    let now = Utc::now();

    let mut category_ids = std::collections::HashMap::new();
    for (name, icon) in DEMO_CATEGORIES {
        let category = ctx.category_service.create_category(
            user.id,
            NewCategory {
                name: name.to_string(),
                icon: Some(icon.to_string()),
            },
        )?;
        category_ids.insert(*name, category.id);
    }

    for (category, movement_type, amount, description, days_ago) in DEMO_MOVEMENTS {
        let category_id = category_ids
            .get(category)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown demo category {}", category))?;
        ctx.movement_service.create_movement(
            user.id,
            NewMovement {
                category_id,
                movement_type: *movement_type,
                amount: *amount,
                description: description.to_string(),
                date: Some(now - Duration::days(*days_ago)),
            },
        )?;
    }

    let investments = &ctx.investment_service;
    let cdb = investments.create_investment(
        user.id,
        NewInvestment {
            investment_type: InvestmentType::Cdb,
            name: "Bank CDB".to_string(),
            initial_amount: dec!(10000),
            return_rate: dec!(12.5),
            category_id: None,
        },
    )?;
    let fund = investments.create_investment(
        user.id,
        NewInvestment {
            investment_type: InvestmentType::Fundos,
            name: "Index Fund".to_string(),
            initial_amount: dec!(5000),
            return_rate: dec!(9),
            category_id: None,
        },
    )?;
    investments.create_investment(
        user.id,
        NewInvestment {
            investment_type: InvestmentType::Criptomoedas,
            name: "Bitcoin".to_string(),
            initial_amount: dec!(1500),
            return_rate: Decimal::ZERO,
            category_id: None,
        },
    )?;

    investments.make_contribution(
        cdb.id,
        user.id,
        LedgerEntry::new(dec!(2000)).with_description("Bonus invested"),
    )?;
    investments.make_contribution(fund.id, user.id, LedgerEntry::new(dec!(750)))?;
    investments.make_withdrawal(
        fund.id,
        user.id,
        LedgerEntry::new(dec!(1200)).with_description("Partial redemption"),
    )?;

    Ok(user.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MovementFilter;
    use tempfile::tempdir;

    #[test]
    fn test_seed_builds_consistent_ledger() {
        let ctx = FynanceContext::in_memory(Config::default());
        let user_id = seed(&ctx).unwrap();

        let investments = ctx.investment_service.list_investments(user_id, None).unwrap();
        assert_eq!(investments.len(), 3);

        let fund = investments.iter().find(|i| i.name == "Index Fund").unwrap();
        assert_eq!(fund.current_balance, dec!(4550));
        assert_eq!(
            ctx.investment_service.get_total_invested(fund.id, user_id).unwrap(),
            dec!(4550)
        );

        let doctor = ctx.doctor_service.run_checks(Some(user_id)).unwrap();
        assert_eq!(doctor.summary.errors, 0);

        let movements = ctx
            .movement_service
            .list_movements(user_id, &MovementFilter::default())
            .unwrap();
        // plain movements plus three openings, two contributions, one withdrawal
        assert_eq!(movements.len(), DEMO_MOVEMENTS.len() + 6);
    }

    #[test]
    fn test_enable_and_disable() {
        let dir = tempdir().unwrap();
        let demo = DemoService::new(dir.path());
        assert!(!demo.is_enabled().unwrap());

        demo.enable().unwrap();
        assert!(demo.is_enabled().unwrap());
        assert!(dir.path().join(DEMO_DB_FILENAME).exists());

        demo.disable(true).unwrap();
        assert!(!demo.is_enabled().unwrap());
        assert!(!dir.path().join(DEMO_DB_FILENAME).exists());
    }

    #[test]
    fn test_enable_twice_starts_fresh() {
        let dir = tempdir().unwrap();
        let demo = DemoService::new(dir.path());
        demo.enable().unwrap();
        // A leftover demo user would make the second registration conflict
        demo.enable().unwrap();
    }
}
