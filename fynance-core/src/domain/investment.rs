//! Investment domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{timestamp_now, EntityId};
use super::movement::{exceeds_max, exceeds_scale};
use super::result::Error;

/// Investment product kind, serialized with its wire name (`CDB`, `ACOES`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentType {
    /// Fixed-income note
    Cdb,
    /// Fixed-income variant A
    Lci,
    /// Fixed-income variant B
    Lca,
    /// Government bond
    TesouroDireto,
    /// Equities
    Acoes,
    /// Funds
    Fundos,
    /// Cryptocurrency
    Criptomoedas,
    /// Pension
    Previdencia,
}

impl InvestmentType {
    pub const ALL: [InvestmentType; 8] = [
        InvestmentType::Cdb,
        InvestmentType::Lci,
        InvestmentType::Lca,
        InvestmentType::TesouroDireto,
        InvestmentType::Acoes,
        InvestmentType::Fundos,
        InvestmentType::Criptomoedas,
        InvestmentType::Previdencia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentType::Cdb => "CDB",
            InvestmentType::Lci => "LCI",
            InvestmentType::Lca => "LCA",
            InvestmentType::TesouroDireto => "TESOURO_DIRETO",
            InvestmentType::Acoes => "ACOES",
            InvestmentType::Fundos => "FUNDOS",
            InvestmentType::Criptomoedas => "CRIPTOMOEDAS",
            InvestmentType::Previdencia => "PREVIDENCIA",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            InvestmentType::Cdb => "Fixed-income note",
            InvestmentType::Lci => "Fixed income (A)",
            InvestmentType::Lca => "Fixed income (B)",
            InvestmentType::TesouroDireto => "Government bond",
            InvestmentType::Acoes => "Equities",
            InvestmentType::Fundos => "Funds",
            InvestmentType::Criptomoedas => "Cryptocurrency",
            InvestmentType::Previdencia => "Pension",
        }
    }
}

impl fmt::Display for InvestmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestmentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "CDB" | "FIXED_INCOME" => Ok(InvestmentType::Cdb),
            "LCI" => Ok(InvestmentType::Lci),
            "LCA" => Ok(InvestmentType::Lca),
            "TESOURO_DIRETO" | "GOVERNMENT_BOND" => Ok(InvestmentType::TesouroDireto),
            "ACOES" | "EQUITIES" => Ok(InvestmentType::Acoes),
            "FUNDOS" | "FUNDS" => Ok(InvestmentType::Fundos),
            "CRIPTOMOEDAS" | "CRYPTO" => Ok(InvestmentType::Criptomoedas),
            "PREVIDENCIA" | "PENSION" => Ok(InvestmentType::Previdencia),
            other => Err(Error::validation(format!("unknown investment type '{}'", other))),
        }
    }
}

/// Reason a delete is refused while money remains
pub const INVESTMENT_HAS_BALANCE: &str =
    "investment still has a balance; withdraw everything before deleting it";

/// A named holding whose balance is driven by its linked movements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    pub id: EntityId,
    pub user_id: EntityId,
    pub investment_type: InvestmentType,
    pub name: String,
    /// Signed sum of the linked movements, never negative
    pub current_balance: Decimal,
    /// Informational rate in percent, not used by any computation
    pub return_rate: Decimal,
    pub application_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Investment {
    pub fn new(
        user_id: EntityId,
        investment_type: InvestmentType,
        name: impl Into<String>,
        initial_amount: Decimal,
        return_rate: Decimal,
    ) -> Self {
        let now = timestamp_now();
        Self {
            id: EntityId::new(),
            user_id,
            investment_type,
            name: name.into().trim().to_string(),
            current_balance: initial_amount,
            return_rate,
            application_date: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive uniqueness key
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Description of the movement recorded at creation
    pub fn opening_description(&self) -> String {
        format!("Opening contribution - {}", self.name)
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.is_empty() {
            return Err("investment name is required");
        }
        if self.current_balance.is_sign_negative() && !self.current_balance.is_zero() {
            return Err("initial amount cannot be negative");
        }
        if exceeds_scale(self.current_balance) {
            return Err("amount supports at most 4 decimal places");
        }
        if exceeds_max(self.current_balance) {
            return Err("amount exceeds the largest supported value");
        }
        if exceeds_scale(self.return_rate) {
            return Err("return rate supports at most 4 decimal places");
        }
        if exceeds_max(self.return_rate) {
            return Err("return rate exceeds the largest supported value");
        }
        Ok(())
    }
}

/// Input for opening an investment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvestment {
    pub investment_type: InvestmentType,
    pub name: String,
    pub initial_amount: Decimal,
    #[serde(default)]
    pub return_rate: Decimal,
    /// Category of the opening movement, the default investment category when absent
    #[serde(default)]
    pub category_id: Option<EntityId>,
}

/// Metadata update, `None` fields are left unchanged. The balance is never
/// part of an update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestmentUpdate {
    pub name: Option<String>,
    pub investment_type: Option<InvestmentType>,
    pub return_rate: Option<Decimal>,
}

/// Contribution or withdrawal request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub amount: Decimal,
    pub description: Option<String>,
    pub category_id: Option<EntityId>,
}

impl LedgerEntry {
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            description: None,
            category_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category_id: EntityId) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

/// Profit of an investment relative to the net amount put into it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentReturn {
    pub profit: Decimal,
    pub return_percentage: Decimal,
}

impl InvestmentReturn {
    /// `(0, 0)` when nothing is invested, otherwise balance minus invested
    /// and that profit as a percentage of invested
    pub fn compute(current_balance: Decimal, total_invested: Decimal) -> Self {
        if total_invested.is_zero() {
            return Self {
                profit: Decimal::ZERO,
                return_percentage: Decimal::ZERO,
            };
        }
        let profit = current_balance - total_invested;
        Self {
            profit,
            return_percentage: profit / total_invested * Decimal::ONE_HUNDRED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::movement::MAX_AMOUNT;
    use rust_decimal_macros::dec;

    #[test]
    fn test_investment_creation() {
        let inv = Investment::new(EntityId::new(), InvestmentType::Cdb, " Bank CDB ", dec!(1000), dec!(12.5));
        assert_eq!(inv.name, "Bank CDB");
        assert_eq!(inv.current_balance, dec!(1000));
        assert_eq!(inv.opening_description(), "Opening contribution - Bank CDB");
        assert!(inv.validate().is_ok());
    }

    #[test]
    fn test_negative_initial_amount_is_invalid() {
        let inv = Investment::new(EntityId::new(), InvestmentType::Cdb, "x", dec!(-1), dec!(0));
        assert!(inv.validate().is_err());

        let zero = Investment::new(EntityId::new(), InvestmentType::Cdb, "x", dec!(0), dec!(0));
        assert!(zero.validate().is_ok());
    }

    #[test]
    fn test_initial_amount_must_fit_storage() {
        let largest = Investment::new(EntityId::new(), InvestmentType::Cdb, "x", MAX_AMOUNT, dec!(0));
        assert!(largest.validate().is_ok());

        let too_large = Investment::new(EntityId::new(), InvestmentType::Cdb, "x", dec!(1000000000000000), dec!(0));
        assert!(too_large.validate().is_err());
    }

    #[test]
    fn test_type_parsing_accepts_aliases() {
        assert_eq!("tesouro_direto".parse::<InvestmentType>().unwrap(), InvestmentType::TesouroDireto);
        assert_eq!("government-bond".parse::<InvestmentType>().unwrap(), InvestmentType::TesouroDireto);
        assert_eq!("crypto".parse::<InvestmentType>().unwrap(), InvestmentType::Criptomoedas);
        assert_eq!(
            serde_json::to_string(&InvestmentType::TesouroDireto).unwrap(),
            "\"TESOURO_DIRETO\""
        );
        assert!("bonds".parse::<InvestmentType>().is_err());
    }

    #[test]
    fn test_return_with_nothing_invested() {
        let ret = InvestmentReturn::compute(dec!(500), dec!(0));
        assert_eq!(ret.profit, dec!(0));
        assert_eq!(ret.return_percentage, dec!(0));
    }

    #[test]
    fn test_return_with_gain() {
        let ret = InvestmentReturn::compute(dec!(1600), dec!(1500));
        assert_eq!(ret.profit, dec!(100));
        assert!((ret.return_percentage - dec!(6.6666666)).abs() < dec!(0.0001));
    }

    #[test]
    fn test_return_with_loss() {
        let ret = InvestmentReturn::compute(dec!(900), dec!(1000));
        assert_eq!(ret.profit, dec!(-100));
        assert_eq!(ret.return_percentage, dec!(-10));
    }
}
