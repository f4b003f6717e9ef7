//! Category domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{timestamp_now, EntityId};

/// A per-user bucket that every movement references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: EntityId,
    pub user_id: EntityId,
    pub name: String,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(user_id: EntityId, name: impl Into<String>, icon: Option<String>) -> Self {
        let now = timestamp_now();
        Self {
            id: EntityId::new(),
            user_id,
            name: name.into().trim().to_string(),
            icon,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive uniqueness key
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.is_empty() {
            return Err("category name is required");
        }
        Ok(())
    }
}

/// Input for creating a category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub icon: Option<String>,
}

/// Partial update, `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub icon: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_name_is_trimmed() {
        let category = Category::new(EntityId::new(), "  Groceries ", None);
        assert_eq!(category.name, "Groceries");
        assert_eq!(category.name_key(), "groceries");
        assert!(category.validate().is_ok());
    }

    #[test]
    fn test_blank_name_is_invalid() {
        let category = Category::new(EntityId::new(), "   ", None);
        assert!(category.validate().is_err());
    }
}
