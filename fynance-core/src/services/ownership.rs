//! Ownership guard
//!
//! Every read or write of an investment, movement or category goes through
//! here first. A missing record yields that entity's NotFound error; a
//! record owned by someone else yields `ResourceNotOwned` and is never
//! returned.

use std::fmt;
use std::sync::Arc;

use crate::domain::result::{Error, Result};
use crate::domain::{Category, EntityId, Investment, Movement, Owned};
use crate::ports::{CategoryRepository, InvestmentRepository, MovementRepository};

/// Entity kinds the guard knows how to look up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Investment,
    Movement,
    Category,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Investment => "investment",
            Resource::Movement => "transaction",
            Resource::Category => "category",
        })
    }
}

impl Resource {
    fn not_found(&self, id: EntityId) -> Error {
        match self {
            Resource::Investment => Error::InvestmentNotFound(id.to_string()),
            Resource::Movement => Error::MovementNotFound(id.to_string()),
            Resource::Category => Error::CategoryNotFound(id.to_string()),
        }
    }
}

fn check_owner<T: Owned>(
    entity: Option<T>,
    resource: Resource,
    id: EntityId,
    user_id: EntityId,
) -> Result<T> {
    let entity = entity.ok_or_else(|| resource.not_found(id))?;
    if entity.owner_id() != user_id {
        return Err(Error::ResourceNotOwned(format!("{} {}", resource, id)));
    }
    Ok(entity)
}

pub struct OwnershipGuard {
    investments: Arc<dyn InvestmentRepository>,
    movements: Arc<dyn MovementRepository>,
    categories: Arc<dyn CategoryRepository>,
}

impl OwnershipGuard {
    pub fn new(
        investments: Arc<dyn InvestmentRepository>,
        movements: Arc<dyn MovementRepository>,
        categories: Arc<dyn CategoryRepository>,
    ) -> Self {
        Self {
            investments,
            movements,
            categories,
        }
    }

    /// Whether `id` exists and belongs to `user_id`
    pub fn belongs_to_user(&self, resource: Resource, id: EntityId, user_id: EntityId) -> Result<bool> {
        match self.ensure_owned(resource, id, user_id) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() || matches!(e, Error::ResourceNotOwned(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fail with the NotFound / `ResourceNotOwned` error unless owned
    pub fn ensure_owned(&self, resource: Resource, id: EntityId, user_id: EntityId) -> Result<()> {
        match resource {
            Resource::Investment => self.investment(id, user_id).map(|_| ()),
            Resource::Movement => self.movement(id, user_id).map(|_| ()),
            Resource::Category => self.category(id, user_id).map(|_| ()),
        }
    }

    /// Load an investment owned by `user_id`
    pub fn investment(&self, id: EntityId, user_id: EntityId) -> Result<Investment> {
        check_owner(self.investments.get_investment(id)?, Resource::Investment, id, user_id)
    }

    /// Load a movement owned by `user_id`
    pub fn movement(&self, id: EntityId, user_id: EntityId) -> Result<Movement> {
        check_owner(self.movements.get_movement(id)?, Resource::Movement, id, user_id)
    }

    /// Load a category owned by `user_id`
    pub fn category(&self, id: EntityId, user_id: EntityId) -> Result<Category> {
        check_owner(self.categories.get_category(id)?, Resource::Category, id, user_id)
    }
}
