//! Category service - per-user category directory

use std::sync::Arc;

use log::debug;

use crate::domain::ids::timestamp_now;
use crate::domain::result::{Error, Result};
use crate::domain::{Category, CategoryUpdate, EntityId, NewCategory};
use crate::ports::{CategoryRepository, MovementRepository, UserDirectory};
use crate::services::ownership::OwnershipGuard;
use crate::services::user::ensure_user_exists;

pub struct CategoryService {
    categories: Arc<dyn CategoryRepository>,
    movements: Arc<dyn MovementRepository>,
    users: Arc<dyn UserDirectory>,
    guard: Arc<OwnershipGuard>,
}

impl CategoryService {
    pub fn new(
        categories: Arc<dyn CategoryRepository>,
        movements: Arc<dyn MovementRepository>,
        users: Arc<dyn UserDirectory>,
        guard: Arc<OwnershipGuard>,
    ) -> Self {
        Self {
            categories,
            movements,
            users,
            guard,
        }
    }

    pub fn create_category(&self, user_id: EntityId, input: NewCategory) -> Result<Category> {
        ensure_user_exists(&*self.users, user_id)?;

        let category = Category::new(user_id, input.name, clean_icon(input.icon));
        category.validate().map_err(Error::validation)?;

        if self
            .categories
            .find_category_by_name(user_id, &category.name)?
            .is_some()
        {
            return Err(Error::conflict(format!(
                "a category named '{}' already exists",
                category.name
            )));
        }
        self.categories.insert_category(&category)?;

        debug!("created category {} for user {}", category.id, user_id);
        Ok(category)
    }

    /// Rename and/or change the icon. Renaming to a different case of the
    /// current name is allowed.
    pub fn update_category(
        &self,
        category_id: EntityId,
        user_id: EntityId,
        update: CategoryUpdate,
    ) -> Result<Category> {
        let mut category = self.guard.category(category_id, user_id)?;

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(Error::validation("category name is required"));
            }
            if let Some(existing) = self.categories.find_category_by_name(user_id, &name)? {
                if existing.id != category.id {
                    return Err(Error::conflict(format!(
                        "a category named '{}' already exists",
                        name
                    )));
                }
            }
            category.name = name;
        }
        if update.icon.is_some() {
            category.icon = clean_icon(update.icon);
        }

        category.updated_at = timestamp_now();
        self.categories.update_category(&category)?;
        Ok(category)
    }

    /// Delete an unused category
    pub fn delete_category(&self, category_id: EntityId, user_id: EntityId) -> Result<()> {
        self.guard.category(category_id, user_id)?;

        let in_use = self.movements.count_by_category(category_id)?;
        if in_use > 0 {
            return Err(Error::validation(format!(
                "category is used by {} transaction(s)",
                in_use
            )));
        }
        if !self.categories.delete_category(category_id)? {
            return Err(Error::CategoryNotFound(category_id.to_string()));
        }
        Ok(())
    }

    pub fn get_category(&self, category_id: EntityId, user_id: EntityId) -> Result<Category> {
        self.guard.category(category_id, user_id)
    }

    pub fn list_categories(&self, user_id: EntityId) -> Result<Vec<Category>> {
        ensure_user_exists(&*self.users, user_id)?;
        self.categories.list_categories(user_id)
    }

    /// Id of the user's category named `name`, created with `icon` if missing
    pub(crate) fn find_or_create(
        &self,
        user_id: EntityId,
        name: &str,
        icon: Option<&str>,
    ) -> Result<EntityId> {
        if let Some(existing) = self.categories.find_category_by_name(user_id, name)? {
            return Ok(existing.id);
        }
        let input = NewCategory {
            name: name.to_string(),
            icon: icon.map(str::to_string),
        };
        match self.create_category(user_id, input) {
            Ok(category) => Ok(category.id),
            // Lost a race with a concurrent creator
            Err(Error::Conflict(_)) => self
                .categories
                .find_category_by_name(user_id, name)?
                .map(|c| c.id)
                .ok_or_else(|| Error::CategoryNotFound(name.to_string())),
            Err(e) => Err(e),
        }
    }
}

fn clean_icon(icon: Option<String>) -> Option<String> {
    icon.map(|i| i.trim().to_string()).filter(|i| !i.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::domain::{Movement, MovementType, Plan, User};
    use rust_decimal_macros::dec;

    struct Fixture {
        repo: Arc<InMemoryRepository>,
        service: CategoryService,
        user: User,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryRepository::new());
        let guard = Arc::new(OwnershipGuard::new(repo.clone(), repo.clone(), repo.clone()));
        let service = CategoryService::new(repo.clone(), repo.clone(), repo.clone(), guard);
        let user = User::new("Ana", "ana@example.com", Plan::Free);
        repo.insert_user(&user).unwrap();
        Fixture { repo, service, user }
    }

    fn named(name: &str) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            icon: None,
        }
    }

    #[test]
    fn test_create_requires_existing_user() {
        let f = fixture();
        let err = f.service.create_category(EntityId::new(), named("Food")).unwrap_err();
        assert!(matches!(err, Error::UserNotFound(_)));
    }

    #[test]
    fn test_duplicate_name_is_case_insensitive() {
        let f = fixture();
        f.service.create_category(f.user.id, named("Food")).unwrap();
        let err = f.service.create_category(f.user.id, named(" food ")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let f = fixture();
        let err = f.service.create_category(f.user.id, named("   ")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_rename_to_other_case_of_same_name() {
        let f = fixture();
        let category = f.service.create_category(f.user.id, named("food")).unwrap();
        let updated = f
            .service
            .update_category(
                category.id,
                f.user.id,
                CategoryUpdate {
                    name: Some("Food".into()),
                    icon: Some("utensils".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Food");
        assert_eq!(updated.icon.as_deref(), Some("utensils"));
    }

    #[test]
    fn test_rename_onto_another_category_conflicts() {
        let f = fixture();
        f.service.create_category(f.user.id, named("Food")).unwrap();
        let other = f.service.create_category(f.user.id, named("Rent")).unwrap();
        let err = f
            .service
            .update_category(
                other.id,
                f.user.id,
                CategoryUpdate {
                    name: Some("FOOD".into()),
                    icon: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_delete_in_use_category_is_rejected() {
        let f = fixture();
        let category = f.service.create_category(f.user.id, named("Food")).unwrap();
        let movement = Movement::new(f.user.id, category.id, MovementType::Expense, dec!(5), "lunch", None);
        f.repo.insert_movement(&movement).unwrap();

        let err = f.service.delete_category(category.id, f.user.id).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        f.repo.delete_movement(movement.id).unwrap();
        f.service.delete_category(category.id, f.user.id).unwrap();
        assert!(f.service.list_categories(f.user.id).unwrap().is_empty());
    }

    #[test]
    fn test_foreign_category_is_not_owned() {
        let f = fixture();
        let category = f.service.create_category(f.user.id, named("Food")).unwrap();
        let err = f.service.delete_category(category.id, EntityId::new()).unwrap_err();
        assert!(matches!(err, Error::ResourceNotOwned(_)));
    }

    #[test]
    fn test_find_or_create_is_idempotent() {
        let f = fixture();
        let first = f.service.find_or_create(f.user.id, "Investment", Some("trending-up")).unwrap();
        let second = f.service.find_or_create(f.user.id, "investment", None).unwrap();
        assert_eq!(first, second);
        assert_eq!(f.service.list_categories(f.user.id).unwrap().len(), 1);
    }
}
