//! Repository ports - storage abstraction
//!
//! One port per entity family plus [`LedgerStore`], the seam for writes that
//! touch an investment and its movement log together. All calls block.

use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{
    Category, EntityId, Investment, InvestmentType, Movement, MovementFilter, MovementType, Plan,
    User,
};

/// Read/write access to registered users
pub trait UserDirectory: Send + Sync {
    /// Insert a user, `Conflict` when the email is already registered
    fn insert_user(&self, user: &User) -> Result<()>;

    fn get_user_by_id(&self, id: EntityId) -> Result<Option<User>>;

    /// Case-insensitive email lookup
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    fn user_exists(&self, id: EntityId) -> Result<bool> {
        Ok(self.get_user_by_id(id)?.is_some())
    }

    fn get_plan(&self, id: EntityId) -> Result<Option<Plan>> {
        Ok(self.get_user_by_id(id)?.map(|u| u.plan))
    }
}

pub trait CategoryRepository: Send + Sync {
    /// Insert a category, `Conflict` on a duplicate name for the same user
    fn insert_category(&self, category: &Category) -> Result<()>;

    fn update_category(&self, category: &Category) -> Result<()>;

    /// Returns false when nothing was deleted
    fn delete_category(&self, id: EntityId) -> Result<bool>;

    fn get_category(&self, id: EntityId) -> Result<Option<Category>>;

    /// Case-insensitive name lookup within one user's categories
    fn find_category_by_name(&self, user_id: EntityId, name: &str) -> Result<Option<Category>>;

    /// Categories of a user, ordered by name
    fn list_categories(&self, user_id: EntityId) -> Result<Vec<Category>>;
}

pub trait InvestmentRepository: Send + Sync {
    fn insert_investment(&self, investment: &Investment) -> Result<()>;

    /// Persist name, type, return rate and `updated_at`. Never writes the balance.
    fn update_investment(&self, investment: &Investment) -> Result<()>;

    /// Overwrite the stored balance. Ledger writes go through [`LedgerStore`];
    /// this is for stores that compose the ledger from entity ports and for
    /// external valuation updates.
    fn set_balance(&self, id: EntityId, balance: Decimal) -> Result<()>;

    /// Returns false when nothing was deleted
    fn delete_investment(&self, id: EntityId) -> Result<bool>;

    fn get_investment(&self, id: EntityId) -> Result<Option<Investment>>;

    /// Case-insensitive name lookup within one user's investments
    fn find_investment_by_name(&self, user_id: EntityId, name: &str) -> Result<Option<Investment>>;

    /// Investments of a user, newest application date first
    fn list_investments(
        &self,
        user_id: EntityId,
        investment_type: Option<InvestmentType>,
    ) -> Result<Vec<Investment>>;

    /// Every investment of every user, for reconciliation
    fn list_all_investments(&self) -> Result<Vec<Investment>>;
}

pub trait MovementRepository: Send + Sync {
    fn insert_movement(&self, movement: &Movement) -> Result<()>;

    fn update_movement(&self, movement: &Movement) -> Result<()>;

    /// Returns false when nothing was deleted
    fn delete_movement(&self, id: EntityId) -> Result<bool>;

    fn get_movement(&self, id: EntityId) -> Result<Option<Movement>>;

    /// Movements of a user matching `filter`, newest date first
    fn list_movements(&self, user_id: EntityId, filter: &MovementFilter) -> Result<Vec<Movement>>;

    /// Every movement that references an investment, for reconciliation
    fn list_linked_movements(&self) -> Result<Vec<Movement>>;

    /// Sum of `amount` over movements of `investment_id` with the given type
    fn sum_amount(&self, investment_id: EntityId, movement_type: MovementType) -> Result<Decimal>;

    fn count_by_category(&self, category_id: EntityId) -> Result<u64>;
}

/// Writes that change an investment together with its movement log
pub trait LedgerStore: Send + Sync {
    /// Persist a new investment and its opening movement as one unit
    fn open_investment(&self, investment: &Investment, opening: &Movement) -> Result<()>;

    /// Append a linked movement and apply its signed amount to the
    /// investment balance in one step. Returns the new balance.
    ///
    /// Fails with `Validation` and leaves both records untouched when the
    /// balance would go below zero.
    fn post_movement(&self, movement: &Movement) -> Result<Decimal>;

    /// Delete an investment owned by `user_id` if its balance is zero at
    /// the moment of deletion. Its movements are kept.
    ///
    /// Fails with `Validation` when a balance remains, even one posted after
    /// the caller last read the investment.
    fn close_investment(&self, investment_id: EntityId, user_id: EntityId) -> Result<()>;
}
