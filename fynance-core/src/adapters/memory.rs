//! In-memory repository
//!
//! Implements the entity ports over hash maps. It has no multi-entity
//! transactions, so ledger writes on top of it go through
//! [`CompensatingLedgerStore`](super::compensating::CompensatingLedgerStore).

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Category, EntityId, Investment, InvestmentType, Movement, MovementFilter, MovementType, User,
};
use crate::ports::{CategoryRepository, InvestmentRepository, MovementRepository, UserDirectory};

#[derive(Default)]
struct Tables {
    users: HashMap<EntityId, User>,
    categories: HashMap<EntityId, Category>,
    investments: HashMap<EntityId, Investment>,
    movements: HashMap<EntityId, Movement>,
}

/// Hash-map backed store, one lock over all tables
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| Error::database("in-memory store lock poisoned", e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| Error::database("in-memory store lock poisoned", e.to_string()))
    }
}

impl UserDirectory for InMemoryRepository {
    fn insert_user(&self, user: &User) -> Result<()> {
        let mut tables = self.write()?;
        let key = user.email_key();
        if tables.users.values().any(|u| u.email_key() == key) {
            return Err(Error::conflict("a user with this email already exists"));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    fn get_user_by_id(&self, id: EntityId) -> Result<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let key = email.trim().to_lowercase();
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email_key() == key)
            .cloned())
    }
}

impl CategoryRepository for InMemoryRepository {
    fn insert_category(&self, category: &Category) -> Result<()> {
        let mut tables = self.write()?;
        let key = category.name_key();
        if tables
            .categories
            .values()
            .any(|c| c.user_id == category.user_id && c.name_key() == key)
        {
            return Err(Error::conflict(format!(
                "a category named '{}' already exists",
                category.name
            )));
        }
        tables.categories.insert(category.id, category.clone());
        Ok(())
    }

    fn update_category(&self, category: &Category) -> Result<()> {
        let mut tables = self.write()?;
        let key = category.name_key();
        if tables.categories.values().any(|c| {
            c.id != category.id && c.user_id == category.user_id && c.name_key() == key
        }) {
            return Err(Error::conflict(format!(
                "a category named '{}' already exists",
                category.name
            )));
        }
        if let Some(existing) = tables.categories.get_mut(&category.id) {
            *existing = category.clone();
        }
        Ok(())
    }

    fn delete_category(&self, id: EntityId) -> Result<bool> {
        Ok(self.write()?.categories.remove(&id).is_some())
    }

    fn get_category(&self, id: EntityId) -> Result<Option<Category>> {
        Ok(self.read()?.categories.get(&id).cloned())
    }

    fn find_category_by_name(&self, user_id: EntityId, name: &str) -> Result<Option<Category>> {
        let key = name.trim().to_lowercase();
        Ok(self
            .read()?
            .categories
            .values()
            .find(|c| c.user_id == user_id && c.name_key() == key)
            .cloned())
    }

    fn list_categories(&self, user_id: EntityId) -> Result<Vec<Category>> {
        let mut categories: Vec<Category> = self
            .read()?
            .categories
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name_key().cmp(&b.name_key()).then(a.id.cmp(&b.id)));
        Ok(categories)
    }
}

impl InvestmentRepository for InMemoryRepository {
    fn insert_investment(&self, investment: &Investment) -> Result<()> {
        let mut tables = self.write()?;
        let key = investment.name_key();
        if tables
            .investments
            .values()
            .any(|i| i.user_id == investment.user_id && i.name_key() == key)
        {
            return Err(Error::conflict(format!(
                "an investment named '{}' already exists",
                investment.name
            )));
        }
        tables.investments.insert(investment.id, investment.clone());
        Ok(())
    }

    fn update_investment(&self, investment: &Investment) -> Result<()> {
        let mut tables = self.write()?;
        let key = investment.name_key();
        if tables.investments.values().any(|i| {
            i.id != investment.id && i.user_id == investment.user_id && i.name_key() == key
        }) {
            return Err(Error::conflict(format!(
                "an investment named '{}' already exists",
                investment.name
            )));
        }
        if let Some(existing) = tables.investments.get_mut(&investment.id) {
            existing.name = investment.name.clone();
            existing.investment_type = investment.investment_type;
            existing.return_rate = investment.return_rate;
            existing.updated_at = investment.updated_at;
        }
        Ok(())
    }

    fn set_balance(&self, id: EntityId, balance: Decimal) -> Result<()> {
        if balance.is_sign_negative() && !balance.is_zero() {
            return Err(Error::validation("failed to update balance: value out of range"));
        }
        let mut tables = self.write()?;
        let investment = tables
            .investments
            .get_mut(&id)
            .ok_or_else(|| Error::InvestmentNotFound(id.to_string()))?;
        investment.current_balance = balance;
        Ok(())
    }

    fn delete_investment(&self, id: EntityId) -> Result<bool> {
        Ok(self.write()?.investments.remove(&id).is_some())
    }

    fn get_investment(&self, id: EntityId) -> Result<Option<Investment>> {
        Ok(self.read()?.investments.get(&id).cloned())
    }

    fn find_investment_by_name(&self, user_id: EntityId, name: &str) -> Result<Option<Investment>> {
        let key = name.trim().to_lowercase();
        Ok(self
            .read()?
            .investments
            .values()
            .find(|i| i.user_id == user_id && i.name_key() == key)
            .cloned())
    }

    fn list_investments(
        &self,
        user_id: EntityId,
        investment_type: Option<InvestmentType>,
    ) -> Result<Vec<Investment>> {
        let mut investments: Vec<Investment> = self
            .read()?
            .investments
            .values()
            .filter(|i| i.user_id == user_id)
            .filter(|i| investment_type.map_or(true, |t| i.investment_type == t))
            .cloned()
            .collect();
        investments.sort_by(|a, b| {
            b.application_date
                .cmp(&a.application_date)
                .then(b.id.cmp(&a.id))
        });
        Ok(investments)
    }

    fn list_all_investments(&self) -> Result<Vec<Investment>> {
        let mut investments: Vec<Investment> =
            self.read()?.investments.values().cloned().collect();
        investments.sort_by_key(|i| i.id);
        Ok(investments)
    }
}

impl MovementRepository for InMemoryRepository {
    fn insert_movement(&self, movement: &Movement) -> Result<()> {
        let mut tables = self.write()?;
        if tables.movements.contains_key(&movement.id) {
            return Err(Error::conflict("movement already exists"));
        }
        tables.movements.insert(movement.id, movement.clone());
        Ok(())
    }

    fn update_movement(&self, movement: &Movement) -> Result<()> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.movements.get_mut(&movement.id) {
            *existing = movement.clone();
        }
        Ok(())
    }

    fn delete_movement(&self, id: EntityId) -> Result<bool> {
        Ok(self.write()?.movements.remove(&id).is_some())
    }

    fn get_movement(&self, id: EntityId) -> Result<Option<Movement>> {
        Ok(self.read()?.movements.get(&id).cloned())
    }

    fn list_movements(&self, user_id: EntityId, filter: &MovementFilter) -> Result<Vec<Movement>> {
        let mut movements: Vec<Movement> = self
            .read()?
            .movements
            .values()
            .filter(|m| m.user_id == user_id && filter.matches(m))
            .cloned()
            .collect();
        movements.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(movements)
    }

    fn list_linked_movements(&self) -> Result<Vec<Movement>> {
        let mut movements: Vec<Movement> = self
            .read()?
            .movements
            .values()
            .filter(|m| m.investment_id.is_some())
            .cloned()
            .collect();
        movements.sort_by_key(|m| m.id);
        Ok(movements)
    }

    fn sum_amount(&self, investment_id: EntityId, movement_type: MovementType) -> Result<Decimal> {
        Ok(self
            .read()?
            .movements
            .values()
            .filter(|m| m.investment_id == Some(investment_id) && m.movement_type == movement_type)
            .try_fold(Decimal::ZERO, |total, m| total.checked_add(m.amount))
            .ok_or_else(|| Error::validation("movement total is out of range"))?)
    }

    fn count_by_category(&self, category_id: EntityId) -> Result<u64> {
        Ok(self
            .read()?
            .movements
            .values()
            .filter(|m| m.category_id == category_id)
            .count() as u64)
    }
}
