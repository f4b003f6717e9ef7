//! Movement domain model
//!
//! A movement is one dated entry of a user's money log. Movements linked to
//! an investment make up that investment's ledger.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{timestamp_now, EntityId};
use super::result::Error;

/// Decimal places kept by storage for every amount
pub const AMOUNT_SCALE: u32 = 4;

/// Largest amount or balance storage holds, `DECIMAL(18,4)`
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_808_348_671, 232_830_643, 0, false, 4);

/// Movement kind, serialized with its wire name (`RECEIPT`, `WITHDRAW`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Receipt,
    Expense,
    Transfer,
    /// Allocation towards a savings goal
    Goals,
    /// Deposit into an investment
    Investment,
    /// Withdrawal from an investment
    Withdraw,
}

impl MovementType {
    pub const ALL: [MovementType; 6] = [
        MovementType::Receipt,
        MovementType::Expense,
        MovementType::Transfer,
        MovementType::Goals,
        MovementType::Investment,
        MovementType::Withdraw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Receipt => "RECEIPT",
            MovementType::Expense => "EXPENSE",
            MovementType::Transfer => "TRANSFER",
            MovementType::Goals => "GOALS",
            MovementType::Investment => "INVESTMENT",
            MovementType::Withdraw => "WITHDRAW",
        }
    }

    /// Deposit-like types add to a balance, the rest subtract
    pub fn is_deposit(&self) -> bool {
        matches!(self, MovementType::Receipt | MovementType::Investment)
    }

    /// Types allowed on a movement that references an investment
    pub fn is_investment_kind(&self) -> bool {
        matches!(self, MovementType::Investment | MovementType::Withdraw)
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "RECEIPT" | "INCOME" => Ok(MovementType::Receipt),
            "EXPENSE" => Ok(MovementType::Expense),
            "TRANSFER" => Ok(MovementType::Transfer),
            "GOALS" | "GOAL" => Ok(MovementType::Goals),
            "INVESTMENT" | "CONTRIBUTION" => Ok(MovementType::Investment),
            "WITHDRAW" | "WITHDRAWAL" => Ok(MovementType::Withdraw),
            other => Err(Error::validation(format!("unknown movement type '{}'", other))),
        }
    }
}

/// A dated, typed amount in a user's log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: EntityId,
    pub user_id: EntityId,
    pub movement_type: MovementType,
    pub category_id: EntityId,
    /// Set only for ledger entries of an investment
    pub investment_id: Option<EntityId>,
    pub amount: Decimal,
    pub description: String,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Movement {
    /// Create an unlinked movement
    pub fn new(
        user_id: EntityId,
        category_id: EntityId,
        movement_type: MovementType,
        amount: Decimal,
        description: impl Into<String>,
        date: Option<DateTime<Utc>>,
    ) -> Self {
        let now = timestamp_now();
        Self {
            id: EntityId::new(),
            user_id,
            movement_type,
            category_id,
            investment_id: None,
            amount,
            description: description.into().trim().to_string(),
            date: date.map(|d| d.trunc_subsecs(6)).unwrap_or(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a ledger entry for `investment_id`, dated now
    pub fn for_investment(
        user_id: EntityId,
        investment_id: EntityId,
        category_id: EntityId,
        movement_type: MovementType,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        let mut movement = Self::new(user_id, category_id, movement_type, amount, description, None);
        movement.investment_id = Some(investment_id);
        movement
    }

    /// Amount with the sign its type applies to a balance
    pub fn signed_amount(&self) -> Decimal {
        if self.movement_type.is_deposit() {
            self.amount
        } else {
            -self.amount
        }
    }

    pub fn is_investment_linked(&self) -> bool {
        self.investment_id.is_some()
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err("amount cannot be negative");
        }
        if exceeds_scale(self.amount) {
            return Err("amount supports at most 4 decimal places");
        }
        if exceeds_max(self.amount) {
            return Err("amount exceeds the largest supported value");
        }
        if self.investment_id.is_some() && !self.movement_type.is_investment_kind() {
            return Err("only INVESTMENT or WITHDRAW movements can reference an investment");
        }
        Ok(())
    }
}

/// Strictly positive amount that fits the stored precision
pub fn validate_positive_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount <= Decimal::ZERO {
        return Err("amount must be greater than zero");
    }
    if exceeds_scale(amount) {
        return Err("amount supports at most 4 decimal places");
    }
    if exceeds_max(amount) {
        return Err("amount exceeds the largest supported value");
    }
    Ok(())
}

pub(crate) fn exceeds_scale(amount: Decimal) -> bool {
    amount.normalize().scale() > AMOUNT_SCALE
}

pub(crate) fn exceeds_max(amount: Decimal) -> bool {
    amount.abs() > MAX_AMOUNT
}

/// Input for an unlinked movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMovement {
    pub category_id: EntityId,
    pub movement_type: MovementType,
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Partial update, `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementUpdate {
    pub category_id: Option<EntityId>,
    pub movement_type: Option<MovementType>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Filters for listing a user's movements
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    pub category_id: Option<EntityId>,
    pub investment_id: Option<EntityId>,
    pub movement_type: Option<MovementType>,
}

impl MovementFilter {
    pub fn matches(&self, movement: &Movement) -> bool {
        self.category_id.map_or(true, |id| movement.category_id == id)
            && self
                .investment_id
                .map_or(true, |id| movement.investment_id == Some(id))
            && self
                .movement_type
                .map_or(true, |t| movement.movement_type == t)
    }
}
