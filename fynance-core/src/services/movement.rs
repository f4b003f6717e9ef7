//! Movement service - the user's money log
//!
//! Movements created here are never linked to an investment. Linked
//! movements are written by the investment ledger and are immutable, so the
//! log stays authoritative for investment balances.

use std::sync::Arc;

use chrono::SubsecRound;
use log::debug;
use rust_decimal::Decimal;

use crate::domain::ids::timestamp_now;
use crate::domain::result::{Error, Result};
use crate::domain::{
    validate_positive_amount, EntityId, Movement, MovementFilter, MovementUpdate, NewMovement,
};
use crate::ports::{MovementRepository, UserDirectory};
use crate::services::category::CategoryService;
use crate::services::ownership::OwnershipGuard;
use crate::services::user::ensure_user_exists;

/// Name and icon of the category investment movements fall back to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultCategory {
    pub name: String,
    pub icon: Option<String>,
}

impl Default for DefaultCategory {
    fn default() -> Self {
        Self {
            name: "Investment".to_string(),
            icon: Some("trending-up".to_string()),
        }
    }
}

pub struct MovementService {
    movements: Arc<dyn MovementRepository>,
    users: Arc<dyn UserDirectory>,
    categories: Arc<CategoryService>,
    guard: Arc<OwnershipGuard>,
    default_category: DefaultCategory,
}

impl MovementService {
    pub fn new(
        movements: Arc<dyn MovementRepository>,
        users: Arc<dyn UserDirectory>,
        categories: Arc<CategoryService>,
        guard: Arc<OwnershipGuard>,
        default_category: DefaultCategory,
    ) -> Self {
        Self {
            movements,
            users,
            categories,
            guard,
            default_category,
        }
    }

    pub fn create_movement(&self, user_id: EntityId, input: NewMovement) -> Result<Movement> {
        ensure_user_exists(&*self.users, user_id)?;
        self.guard.category(input.category_id, user_id)?;
        validate_positive_amount(input.amount).map_err(Error::validation)?;

        let movement = Movement::new(
            user_id,
            input.category_id,
            input.movement_type,
            input.amount,
            input.description,
            input.date,
        );
        movement.validate().map_err(Error::validation)?;
        self.movements.insert_movement(&movement)?;

        debug!("created movement {} for user {}", movement.id, user_id);
        Ok(movement)
    }

    pub fn update_movement(
        &self,
        movement_id: EntityId,
        user_id: EntityId,
        update: MovementUpdate,
    ) -> Result<Movement> {
        let mut movement = self.guard.movement(movement_id, user_id)?;
        if movement.is_investment_linked() {
            return Err(Error::validation(
                "investment transactions cannot be edited; post a new contribution or withdrawal",
            ));
        }

        let category_id = update.category_id.unwrap_or(movement.category_id);
        self.guard.category(category_id, user_id)?;
        movement.category_id = category_id;

        if let Some(amount) = update.amount {
            if amount < Decimal::ZERO {
                return Err(Error::validation("amount cannot be negative"));
            }
            movement.amount = amount;
        }
        if let Some(movement_type) = update.movement_type {
            movement.movement_type = movement_type;
        }
        if let Some(description) = update.description {
            movement.description = description.trim().to_string();
        }
        if let Some(date) = update.date {
            movement.date = date.trunc_subsecs(6);
        }

        movement.validate().map_err(Error::validation)?;
        movement.updated_at = timestamp_now();
        self.movements.update_movement(&movement)?;
        Ok(movement)
    }

    pub fn delete_movement(&self, movement_id: EntityId, user_id: EntityId) -> Result<()> {
        let movement = self.guard.movement(movement_id, user_id)?;
        if movement.is_investment_linked() {
            return Err(Error::validation(
                "investment transactions cannot be deleted; post a withdrawal instead",
            ));
        }
        if !self.movements.delete_movement(movement_id)? {
            return Err(Error::MovementNotFound(movement_id.to_string()));
        }
        Ok(())
    }

    pub fn get_movement(&self, movement_id: EntityId, user_id: EntityId) -> Result<Movement> {
        self.guard.movement(movement_id, user_id)
    }

    /// The user's movements, newest first. Filter references must be owned.
    pub fn list_movements(&self, user_id: EntityId, filter: &MovementFilter) -> Result<Vec<Movement>> {
        ensure_user_exists(&*self.users, user_id)?;
        if let Some(category_id) = filter.category_id {
            self.guard.category(category_id, user_id)?;
        }
        if let Some(investment_id) = filter.investment_id {
            self.guard.investment(investment_id, user_id)?;
        }
        self.movements.list_movements(user_id, filter)
    }

    /// Id of the user's default investment category, created on first use
    pub fn ensure_default_category(&self, user_id: EntityId) -> Result<EntityId> {
        self.categories.find_or_create(
            user_id,
            &self.default_category.name,
            self.default_category.icon.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::domain::{Category, MovementType, NewCategory, Plan, User};
    use crate::ports::CategoryRepository;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    struct Fixture {
        repo: Arc<InMemoryRepository>,
        service: MovementService,
        user: User,
        category: Category,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryRepository::new());
        let guard = Arc::new(OwnershipGuard::new(repo.clone(), repo.clone(), repo.clone()));
        let categories = Arc::new(CategoryService::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            guard.clone(),
        ));
        let user = User::new("Ana", "ana@example.com", Plan::Free);
        repo.insert_user(&user).unwrap();
        let category = categories
            .create_category(
                user.id,
                NewCategory {
                    name: "Food".into(),
                    icon: None,
                },
            )
            .unwrap();
        let service = MovementService::new(
            repo.clone(),
            repo.clone(),
            categories,
            guard,
            DefaultCategory::default(),
        );
        Fixture {
            repo,
            service,
            user,
            category,
        }
    }

    fn expense(category_id: EntityId, amount: rust_decimal::Decimal) -> NewMovement {
        NewMovement {
            category_id,
            movement_type: MovementType::Expense,
            amount,
            description: "lunch".into(),
            date: None,
        }
    }

    #[test]
    fn test_create_movement() {
        let f = fixture();
        let movement = f.service.create_movement(f.user.id, expense(f.category.id, dec!(12.5))).unwrap();
        assert_eq!(movement.amount, dec!(12.5));
        assert!(movement.investment_id.is_none());
        assert_eq!(f.service.get_movement(movement.id, f.user.id).unwrap(), movement);
    }

    #[test]
    fn test_create_requires_positive_amount() {
        let f = fixture();
        let err = f.service.create_movement(f.user.id, expense(f.category.id, dec!(0))).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_create_with_unknown_or_foreign_category() {
        let f = fixture();
        let err = f.service.create_movement(f.user.id, expense(EntityId::new(), dec!(1))).unwrap_err();
        assert!(matches!(err, Error::CategoryNotFound(_)));

        let foreign = Category::new(EntityId::new(), "Theirs", None);
        f.repo.insert_category(&foreign).unwrap();
        let err = f.service.create_movement(f.user.id, expense(foreign.id, dec!(1))).unwrap_err();
        assert!(matches!(err, Error::ResourceNotOwned(_)));
    }

    #[test]
    fn test_update_rejects_negative_amount() {
        let f = fixture();
        let movement = f.service.create_movement(f.user.id, expense(f.category.id, dec!(10))).unwrap();
        let err = f
            .service
            .update_movement(
                movement.id,
                f.user.id,
                MovementUpdate {
                    amount: Some(dec!(-1)),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_update_changes_fields() {
        let f = fixture();
        let movement = f.service.create_movement(f.user.id, expense(f.category.id, dec!(10))).unwrap();
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let updated = f
            .service
            .update_movement(
                movement.id,
                f.user.id,
                MovementUpdate {
                    amount: Some(dec!(20)),
                    movement_type: Some(MovementType::Receipt),
                    description: Some("refund".into()),
                    date: Some(date),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.amount, dec!(20));
        assert_eq!(updated.movement_type, MovementType::Receipt);
        assert_eq!(updated.date, date);
        assert_eq!(f.service.get_movement(movement.id, f.user.id).unwrap(), updated);
    }

    #[test]
    fn test_linked_movements_are_immutable() {
        let f = fixture();
        let linked = Movement::for_investment(
            f.user.id,
            EntityId::new(),
            f.category.id,
            MovementType::Investment,
            dec!(100),
            "Contribution",
        );
        f.repo.insert_movement(&linked).unwrap();

        let err = f
            .service
            .update_movement(linked.id, f.user.id, MovementUpdate::default())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = f.service.delete_movement(linked.id, f.user.id).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_delete_foreign_movement() {
        let f = fixture();
        let movement = f.service.create_movement(f.user.id, expense(f.category.id, dec!(3))).unwrap();

        let err = f.service.delete_movement(movement.id, EntityId::new()).unwrap_err();
        assert!(matches!(err, Error::ResourceNotOwned(_)));
        let err = f.service.delete_movement(EntityId::new(), f.user.id).unwrap_err();
        assert!(matches!(err, Error::MovementNotFound(_)));

        f.service.delete_movement(movement.id, f.user.id).unwrap();
        assert!(f.service.list_movements(f.user.id, &MovementFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_ensure_default_category_is_idempotent() {
        let f = fixture();
        let first = f.service.ensure_default_category(f.user.id).unwrap();
        let second = f.service.ensure_default_category(f.user.id).unwrap();
        assert_eq!(first, second);

        let category = f.repo.get_category(first).unwrap().unwrap();
        assert_eq!(category.name, "Investment");
        assert_eq!(category.icon.as_deref(), Some("trending-up"));
    }
}
