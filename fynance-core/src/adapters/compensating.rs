//! Ledger writes over stores without multi-entity transactions
//!
//! Each ledger operation is composed from single-entity writes. A failed
//! second write is undone with a compensating delete, and balance changes
//! for one investment are serialized by a per-investment lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::error;
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{EntityId, Investment, Movement, INVESTMENT_HAS_BALANCE, MAX_AMOUNT};
use crate::ports::{InvestmentRepository, LedgerStore, MovementRepository};
use crate::services::logging::{LogEvent, LoggingService, COMPENSATION_FAILED_EVENT};

/// One mutex per key, created on first use
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<EntityId, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `key`. Callers hold the returned mutex's guard.
    pub fn lock_for(&self, key: EntityId) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| Error::database("ledger lock table poisoned", e.to_string()))?;
        Ok(Arc::clone(locks.entry(key).or_default()))
    }

    /// Drop the lock for a key that will not be used again
    pub fn forget(&self, key: EntityId) {
        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(&key);
        }
    }
}

/// [`LedgerStore`] built from the entity ports
pub struct CompensatingLedgerStore {
    investments: Arc<dyn InvestmentRepository>,
    movements: Arc<dyn MovementRepository>,
    locks: KeyedLocks,
    event_log: Option<Arc<LoggingService>>,
}

impl CompensatingLedgerStore {
    pub fn new(
        investments: Arc<dyn InvestmentRepository>,
        movements: Arc<dyn MovementRepository>,
    ) -> Self {
        Self {
            investments,
            movements,
            locks: KeyedLocks::new(),
            event_log: None,
        }
    }

    /// Record failed compensations in the durable event log
    pub fn with_event_log(mut self, event_log: Arc<LoggingService>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Undo a partial write. A failure here leaves an inconsistency that
    /// only the doctor can find, so it is logged under its own event name.
    fn compensate(&self, what: &str, id: EntityId, undo: impl FnOnce() -> Result<bool>) {
        match undo() {
            Ok(_) => log::warn!("compensated partial ledger write: removed {} {}", what, id),
            Err(e) => {
                error!("compensating delete of {} {} failed: {}", what, id, e);
                if let Some(event_log) = &self.event_log {
                    event_log.record(
                        LogEvent::new(COMPENSATION_FAILED_EVENT)
                            .with_entity(what, id)
                            .with_error(e.code()),
                    );
                }
            }
        }
    }
}

impl LedgerStore for CompensatingLedgerStore {
    fn open_investment(&self, investment: &Investment, opening: &Movement) -> Result<()> {
        self.investments.insert_investment(investment)?;

        if let Err(e) = self.movements.insert_movement(opening) {
            self.compensate("investment", investment.id, || {
                self.investments.delete_investment(investment.id)
            });
            return Err(e);
        }
        Ok(())
    }

    fn post_movement(&self, movement: &Movement) -> Result<Decimal> {
        let investment_id = movement
            .investment_id
            .ok_or_else(|| Error::validation("movement is not linked to an investment"))?;
        movement.validate().map_err(Error::validation)?;

        let lock = self.locks.lock_for(investment_id)?;
        let _guard = lock
            .lock()
            .map_err(|e| Error::database("investment lock poisoned", e.to_string()))?;

        let investment = self
            .investments
            .get_investment(investment_id)?
            .filter(|i| i.user_id == movement.user_id)
            .ok_or_else(|| Error::InvestmentNotFound(investment_id.to_string()))?;

        let new_balance = investment
            .current_balance
            .checked_add(movement.signed_amount())
            .filter(|balance| *balance <= MAX_AMOUNT)
            .ok_or_else(|| Error::validation("balance would exceed the largest supported value"))?;
        if new_balance.is_sign_negative() && !new_balance.is_zero() {
            return Err(Error::validation("insufficient balance"));
        }

        self.movements.insert_movement(movement)?;

        if let Err(e) = self.investments.set_balance(investment_id, new_balance) {
            self.compensate("movement", movement.id, || {
                self.movements.delete_movement(movement.id)
            });
            return Err(e);
        }
        Ok(new_balance)
    }

    fn close_investment(&self, investment_id: EntityId, user_id: EntityId) -> Result<()> {
        let lock = self.locks.lock_for(investment_id)?;
        let _guard = lock
            .lock()
            .map_err(|e| Error::database("investment lock poisoned", e.to_string()))?;

        let investment = self
            .investments
            .get_investment(investment_id)?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| Error::InvestmentNotFound(investment_id.to_string()))?;
        if !investment.current_balance.is_zero() {
            return Err(Error::validation(INVESTMENT_HAS_BALANCE));
        }
        if !self.investments.delete_investment(investment_id)? {
            return Err(Error::InvestmentNotFound(investment_id.to_string()));
        }
        // Writers already waiting on this lock find the investment gone
        self.locks.forget(investment_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::domain::{InvestmentType, MovementType};
    use rust_decimal_macros::dec;

    fn store() -> (Arc<InMemoryRepository>, CompensatingLedgerStore) {
        let repo = Arc::new(InMemoryRepository::new());
        let store = CompensatingLedgerStore::new(repo.clone(), repo.clone());
        (repo, store)
    }

    fn open(store: &CompensatingLedgerStore, balance: Decimal) -> Investment {
        let investment =
            Investment::new(EntityId::new(), InvestmentType::Fundos, "Fund", balance, dec!(0));
        let opening = Movement::for_investment(
            investment.user_id,
            investment.id,
            EntityId::new(),
            MovementType::Investment,
            balance,
            investment.opening_description(),
        );
        store.open_investment(&investment, &opening).unwrap();
        investment
    }

    #[test]
    fn test_post_movement_applies_signed_amount() {
        let (repo, store) = store();
        let investment = open(&store, dec!(100));

        let withdrawal = Movement::for_investment(
            investment.user_id,
            investment.id,
            EntityId::new(),
            MovementType::Withdraw,
            dec!(40),
            "Withdrawal",
        );
        assert_eq!(store.post_movement(&withdrawal).unwrap(), dec!(60));
        assert_eq!(repo.get_investment(investment.id).unwrap().unwrap().current_balance, dec!(60));
    }

    #[test]
    fn test_overdraft_leaves_state_untouched() {
        let (repo, store) = store();
        let investment = open(&store, dec!(10));

        let withdrawal = Movement::for_investment(
            investment.user_id,
            investment.id,
            EntityId::new(),
            MovementType::Withdraw,
            dec!(10.5),
            "Withdrawal",
        );
        let err = store.post_movement(&withdrawal).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(repo.get_movement(withdrawal.id).unwrap().is_none());
        assert_eq!(repo.get_investment(investment.id).unwrap().unwrap().current_balance, dec!(10));
    }

    #[test]
    fn test_balance_overflow_is_rejected() {
        let (repo, store) = store();
        let investment = open(&store, MAX_AMOUNT - dec!(1));

        for amount in [dec!(2), Decimal::MAX] {
            let contribution = Movement::for_investment(
                investment.user_id,
                investment.id,
                EntityId::new(),
                MovementType::Investment,
                amount,
                "Contribution",
            );
            let err = store.post_movement(&contribution).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
            assert!(repo.get_movement(contribution.id).unwrap().is_none());
        }
        assert_eq!(
            repo.get_investment(investment.id).unwrap().unwrap().current_balance,
            MAX_AMOUNT - dec!(1)
        );
    }

    #[test]
    fn test_close_rechecks_balance() {
        let (repo, store) = store();
        let investment = open(&store, dec!(0));
        let contribution = Movement::for_investment(
            investment.user_id,
            investment.id,
            EntityId::new(),
            MovementType::Investment,
            dec!(5),
            "Contribution",
        );
        store.post_movement(&contribution).unwrap();

        let err = store.close_investment(investment.id, investment.user_id).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(repo.get_investment(investment.id).unwrap().is_some());

        let err = store.close_investment(investment.id, EntityId::new()).unwrap_err();
        assert!(matches!(err, Error::InvestmentNotFound(_)));

        repo.set_balance(investment.id, dec!(0)).unwrap();
        store.close_investment(investment.id, investment.user_id).unwrap();
        assert!(repo.get_investment(investment.id).unwrap().is_none());
        assert!(repo.get_movement(contribution.id).unwrap().is_some());
    }

    #[test]
    fn test_foreign_investment_is_not_found() {
        let (_, store) = store();
        let investment = open(&store, dec!(10));

        let movement = Movement::for_investment(
            EntityId::new(),
            investment.id,
            EntityId::new(),
            MovementType::Investment,
            dec!(1),
            "Contribution",
        );
        let err = store.post_movement(&movement).unwrap_err();
        assert!(matches!(err, Error::InvestmentNotFound(_)));
    }

    #[test]
    fn test_keyed_locks_are_shared_per_key() {
        let locks = KeyedLocks::new();
        let key = EntityId::new();
        let a = locks.lock_for(key).unwrap();
        let b = locks.lock_for(key).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = locks.lock_for(EntityId::new()).unwrap();
        assert!(!Arc::ptr_eq(&a, &other));

        locks.forget(key);
        let c = locks.lock_for(key).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
