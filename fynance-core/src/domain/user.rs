//! User domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{timestamp_now, EntityId};
use super::result::Error;

/// Subscription plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    #[default]
    Free,
    Basic,
    Pro,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "FREE",
            Plan::Basic => "BASIC",
            Plan::Pro => "PRO",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(Plan::Free),
            "BASIC" => Ok(Plan::Basic),
            "PRO" => Ok(Plan::Pro),
            other => Err(Error::validation(format!("unknown plan '{}'", other))),
        }
    }
}

/// A registered user. Credentials live outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub name: String,
    pub email: String,
    pub plan: Plan,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, plan: Plan) -> Self {
        let now = timestamp_now();
        Self {
            id: EntityId::new(),
            name: name.into().trim().to_string(),
            email: email.into().trim().to_string(),
            plan,
            created_at: now,
            updated_at: now,
        }
    }

    /// Lower-cased email used for uniqueness
    pub fn email_key(&self) -> String {
        self.email.to_lowercase()
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.is_empty() {
            return Err("name is required");
        }
        if self.email.is_empty() || !self.email.contains('@') {
            return Err("a valid email is required");
        }
        Ok(())
    }
}
