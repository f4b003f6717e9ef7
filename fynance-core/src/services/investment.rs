//! Investment ledger
//!
//! Owns the running balance of each investment. Every balance change is a
//! linked movement posted through [`LedgerStore`], so the balance always
//! equals the signed sum of the investment's movement log.

use std::sync::Arc;

use log::{info, warn};
use rust_decimal::Decimal;

use crate::domain::ids::timestamp_now;
use crate::domain::result::{Error, Result};
use crate::domain::{
    validate_positive_amount, EntityId, Investment, InvestmentReturn, InvestmentType,
    InvestmentUpdate, LedgerEntry, Movement, MovementType, NewInvestment, INVESTMENT_HAS_BALANCE,
};
use crate::ports::{InvestmentRepository, LedgerStore, MovementRepository, UserDirectory};
use crate::services::logging::{LogEvent, LoggingService};
use crate::services::movement::MovementService;
use crate::services::ownership::OwnershipGuard;
use crate::services::user::ensure_user_exists;

const DEFAULT_CONTRIBUTION_DESCRIPTION: &str = "Contribution";
const DEFAULT_WITHDRAWAL_DESCRIPTION: &str = "Withdrawal";

pub struct InvestmentService {
    investments: Arc<dyn InvestmentRepository>,
    movements: Arc<dyn MovementRepository>,
    ledger: Arc<dyn LedgerStore>,
    users: Arc<dyn UserDirectory>,
    guard: Arc<OwnershipGuard>,
    movement_service: Arc<MovementService>,
    event_log: Option<Arc<LoggingService>>,
}

impl InvestmentService {
    pub fn new(
        investments: Arc<dyn InvestmentRepository>,
        movements: Arc<dyn MovementRepository>,
        ledger: Arc<dyn LedgerStore>,
        users: Arc<dyn UserDirectory>,
        guard: Arc<OwnershipGuard>,
        movement_service: Arc<MovementService>,
    ) -> Self {
        Self {
            investments,
            movements,
            ledger,
            users,
            guard,
            movement_service,
            event_log: None,
        }
    }

    pub fn with_event_log(mut self, event_log: Arc<LoggingService>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    fn record(&self, event: LogEvent) {
        if let Some(event_log) = &self.event_log {
            event_log.record(event);
        }
    }

    /// Category for a ledger movement: the given one if owned, else the default
    fn resolve_category(&self, user_id: EntityId, category_id: Option<EntityId>) -> Result<EntityId> {
        match category_id {
            Some(id) => Ok(self.guard.category(id, user_id)?.id),
            None => self.movement_service.ensure_default_category(user_id),
        }
    }

    /// Open an investment with its opening `INVESTMENT` movement
    pub fn create_investment(&self, user_id: EntityId, input: NewInvestment) -> Result<Investment> {
        ensure_user_exists(&*self.users, user_id)?;

        let investment = Investment::new(
            user_id,
            input.investment_type,
            input.name,
            input.initial_amount,
            input.return_rate,
        );
        investment.validate().map_err(Error::validation)?;

        if self
            .investments
            .find_investment_by_name(user_id, &investment.name)?
            .is_some()
        {
            return Err(Error::conflict(format!(
                "an investment named '{}' already exists",
                investment.name
            )));
        }

        let category_id = self.resolve_category(user_id, input.category_id)?;
        let opening = Movement::for_investment(
            user_id,
            investment.id,
            category_id,
            MovementType::Investment,
            investment.current_balance,
            investment.opening_description(),
        );

        if let Err(e) = self.ledger.open_investment(&investment, &opening) {
            self.record(
                LogEvent::new("investment_create_failed")
                    .with_user(user_id)
                    .with_entity("investment", investment.id)
                    .with_error(e.code()),
            );
            return Err(e);
        }

        info!("opened investment {} for user {}", investment.id, user_id);
        self.record(
            LogEvent::new("investment_created")
                .with_user(user_id)
                .with_entity("investment", investment.id),
        );
        Ok(investment)
    }

    /// Add money to an investment
    pub fn make_contribution(
        &self,
        investment_id: EntityId,
        user_id: EntityId,
        entry: LedgerEntry,
    ) -> Result<Investment> {
        self.post(investment_id, user_id, entry, MovementType::Investment)
    }

    /// Take money out of an investment; never below a zero balance
    pub fn make_withdrawal(
        &self,
        investment_id: EntityId,
        user_id: EntityId,
        entry: LedgerEntry,
    ) -> Result<Investment> {
        self.post(investment_id, user_id, entry, MovementType::Withdraw)
    }

    fn post(
        &self,
        investment_id: EntityId,
        user_id: EntityId,
        entry: LedgerEntry,
        movement_type: MovementType,
    ) -> Result<Investment> {
        validate_positive_amount(entry.amount).map_err(Error::validation)?;
        let mut investment = self.guard.investment(investment_id, user_id)?;

        // Fast path only, the store re-checks atomically
        if movement_type == MovementType::Withdraw && investment.current_balance < entry.amount {
            return Err(Error::validation("insufficient balance"));
        }

        let category_id = self.resolve_category(user_id, entry.category_id)?;
        let description = entry
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| match movement_type {
                MovementType::Withdraw => DEFAULT_WITHDRAWAL_DESCRIPTION.to_string(),
                _ => DEFAULT_CONTRIBUTION_DESCRIPTION.to_string(),
            });

        let movement = Movement::for_investment(
            user_id,
            investment_id,
            category_id,
            movement_type,
            entry.amount,
            description,
        );

        match self.ledger.post_movement(&movement) {
            Ok(balance) => {
                investment.current_balance = balance;
                investment.updated_at = movement.created_at;
                Ok(investment)
            }
            Err(e) => {
                if !matches!(e, Error::Validation(_)) {
                    warn!("ledger write for investment {} failed: {}", investment_id, e);
                    self.record(
                        LogEvent::new("ledger_post_failed")
                            .with_user(user_id)
                            .with_entity("investment", investment_id)
                            .with_error(e.code()),
                    );
                }
                Err(e)
            }
        }
    }

    /// Deposits minus withdrawals over the investment's movement log
    pub fn get_total_invested(&self, investment_id: EntityId, user_id: EntityId) -> Result<Decimal> {
        self.guard.investment(investment_id, user_id)?;
        self.total_invested(investment_id)
    }

    fn total_invested(&self, investment_id: EntityId) -> Result<Decimal> {
        let deposits = self.movements.sum_amount(investment_id, MovementType::Investment)?;
        let withdrawals = self.movements.sum_amount(investment_id, MovementType::Withdraw)?;
        deposits
            .checked_sub(withdrawals)
            .ok_or_else(|| Error::validation("movement total is out of range"))
    }

    /// Profit and return percentage against the net amount invested
    pub fn calculate_return(&self, investment_id: EntityId, user_id: EntityId) -> Result<InvestmentReturn> {
        let investment = self.guard.investment(investment_id, user_id)?;
        let invested = self.total_invested(investment_id)?;
        Ok(InvestmentReturn::compute(investment.current_balance, invested))
    }

    /// Delete an emptied investment. Its movements stay in the log.
    pub fn delete_investment(&self, investment_id: EntityId, user_id: EntityId) -> Result<()> {
        let investment = self.guard.investment(investment_id, user_id)?;
        if !investment.current_balance.is_zero() {
            return Err(Error::validation(INVESTMENT_HAS_BALANCE));
        }
        // The store re-checks the balance at delete time
        self.ledger.close_investment(investment_id, user_id)?;

        self.record(
            LogEvent::new("investment_deleted")
                .with_user(user_id)
                .with_entity("investment", investment_id),
        );
        Ok(())
    }

    /// Change name, type or return rate. The balance is left alone.
    pub fn update_investment(
        &self,
        investment_id: EntityId,
        user_id: EntityId,
        update: InvestmentUpdate,
    ) -> Result<Investment> {
        let mut investment = self.guard.investment(investment_id, user_id)?;

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(Error::validation("investment name is required"));
            }
            if let Some(existing) = self.investments.find_investment_by_name(user_id, &name)? {
                if existing.id != investment.id {
                    return Err(Error::conflict(format!(
                        "an investment named '{}' already exists",
                        name
                    )));
                }
            }
            investment.name = name;
        }
        if let Some(investment_type) = update.investment_type {
            investment.investment_type = investment_type;
        }
        if let Some(return_rate) = update.return_rate {
            investment.return_rate = return_rate;
        }

        investment.validate().map_err(Error::validation)?;
        investment.updated_at = timestamp_now();
        self.investments.update_investment(&investment)?;

        // Re-read so a concurrent ledger write is reflected in the balance
        self.guard.investment(investment_id, user_id)
    }

    pub fn get_investment(&self, investment_id: EntityId, user_id: EntityId) -> Result<Investment> {
        self.guard.investment(investment_id, user_id)
    }

    /// The user's investments, newest application date first
    pub fn list_investments(
        &self,
        user_id: EntityId,
        investment_type: Option<InvestmentType>,
    ) -> Result<Vec<Investment>> {
        ensure_user_exists(&*self.users, user_id)?;
        self.investments.list_investments(user_id, investment_type)
    }
}
