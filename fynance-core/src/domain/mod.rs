//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod category;
pub mod ids;
mod investment;
mod movement;
pub mod result;
mod user;

pub use category::{Category, CategoryUpdate, NewCategory};
pub use ids::EntityId;
pub use investment::{
    Investment, InvestmentReturn, InvestmentType, InvestmentUpdate, LedgerEntry, NewInvestment,
    INVESTMENT_HAS_BALANCE,
};
pub use movement::{
    validate_positive_amount, Movement, MovementFilter, MovementType, MovementUpdate, NewMovement,
    AMOUNT_SCALE, MAX_AMOUNT,
};
pub use user::{Plan, User};

/// Entities that belong to exactly one user
pub trait Owned {
    fn owner_id(&self) -> EntityId;
}

impl Owned for Investment {
    fn owner_id(&self) -> EntityId {
        self.user_id
    }
}

impl Owned for Movement {
    fn owner_id(&self) -> EntityId {
        self.user_id
    }
}

impl Owned for Category {
    fn owner_id(&self) -> EntityId {
        self.user_id
    }
}
