//! User service - registration and lookups

use std::sync::Arc;

use log::info;

use crate::domain::result::{Error, Result};
use crate::domain::{EntityId, Plan, User};
use crate::ports::UserDirectory;

/// Fail with `UserNotFound` unless the user exists
pub(crate) fn ensure_user_exists(users: &dyn UserDirectory, user_id: EntityId) -> Result<()> {
    if users.user_exists(user_id)? {
        Ok(())
    } else {
        Err(Error::UserNotFound(user_id.to_string()))
    }
}

pub struct UserService {
    users: Arc<dyn UserDirectory>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    /// Register a user; the email must not be taken (case-insensitive)
    pub fn register_user(&self, name: &str, email: &str, plan: Plan) -> Result<User> {
        let user = User::new(name, email, plan);
        user.validate().map_err(Error::validation)?;

        if self.users.get_user_by_email(&user.email)?.is_some() {
            return Err(Error::conflict("a user with this email already exists"));
        }
        self.users.insert_user(&user)?;

        info!("registered user {}", user.id);
        Ok(user)
    }

    pub fn get_user(&self, user_id: EntityId) -> Result<User> {
        self.users
            .get_user_by_id(user_id)?
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.users.get_user_by_email(email)
    }

    pub fn user_exists(&self, user_id: EntityId) -> Result<bool> {
        self.users.user_exists(user_id)
    }

    pub fn get_plan(&self, user_id: EntityId) -> Result<Plan> {
        self.users
            .get_plan(user_id)?
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;

    fn service() -> UserService {
        UserService::new(Arc::new(InMemoryRepository::new()))
    }

    #[test]
    fn test_register_and_lookup() {
        let service = service();
        let user = service.register_user("Ana", "ana@example.com", Plan::Basic).unwrap();

        assert!(service.user_exists(user.id).unwrap());
        assert_eq!(service.get_plan(user.id).unwrap(), Plan::Basic);
        assert_eq!(service.get_user(user.id).unwrap(), user);
    }

    #[test]
    fn test_duplicate_email_conflicts() {
        let service = service();
        service.register_user("Ana", "ana@example.com", Plan::Free).unwrap();

        let err = service
            .register_user("Ana Two", " ANA@example.com ", Plan::Free)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_unknown_user() {
        let service = service();
        let err = service.get_plan(EntityId::new()).unwrap_err();
        assert!(matches!(err, Error::UserNotFound(_)));
        assert!(ensure_user_exists(&*service.users, EntityId::new()).is_err());
    }

    #[test]
    fn test_invalid_email_is_rejected() {
        let err = service().register_user("Ana", "not-an-email", Plan::Free).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
