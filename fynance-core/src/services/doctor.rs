//! Doctor service - ledger reconciliation checks
//!
//! Reads the stores out of band and reports records that break the ledger
//! invariants. Nothing is repaired automatically.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::domain::result::Result;
use crate::domain::{EntityId, Investment, Movement, MovementType};
use crate::ports::{InvestmentRepository, MovementRepository};

/// Doctor service for ledger health checks
pub struct DoctorService {
    investments: Arc<dyn InvestmentRepository>,
    movements: Arc<dyn MovementRepository>,
}

impl DoctorService {
    pub fn new(
        investments: Arc<dyn InvestmentRepository>,
        movements: Arc<dyn MovementRepository>,
    ) -> Self {
        Self {
            investments,
            movements,
        }
    }

    /// Run all checks, for one user or for every user when `user_id` is `None`
    pub fn run_checks(&self, user_id: Option<EntityId>) -> Result<DoctorResult> {
        let in_scope = |owner: EntityId| user_id.map_or(true, |u| u == owner);

        let investments: Vec<Investment> = self
            .investments
            .list_all_investments()?
            .into_iter()
            .filter(|i| in_scope(i.user_id))
            .collect();
        let linked: Vec<Movement> = self
            .movements
            .list_linked_movements()?
            .into_iter()
            .filter(|m| in_scope(m.user_id))
            .collect();

        let mut by_investment: HashMap<EntityId, Vec<&Movement>> = HashMap::new();
        for movement in &linked {
            if let Some(id) = movement.investment_id {
                by_investment.entry(id).or_default().push(movement);
            }
        }

        let mut checks = HashMap::new();
        checks.insert(
            "balance_drift".to_string(),
            check_balance_drift(&investments, &by_investment),
        );
        checks.insert(
            "missing_opening_movement".to_string(),
            check_opening_movements(&investments, &by_investment),
        );
        checks.insert(
            "orphaned_movements".to_string(),
            check_orphans(&investments, &linked),
        );

        let count = |status: &str| checks.values().filter(|c| c.status == status).count() as i64;
        let summary = DoctorSummary {
            passed: count("pass"),
            info: count("info"),
            warnings: count("warning"),
            errors: count("error"),
        };

        Ok(DoctorResult { checks, summary })
    }
}

fn check_balance_drift(
    investments: &[Investment],
    by_investment: &HashMap<EntityId, Vec<&Movement>>,
) -> CheckResult {
    let details: Vec<serde_json::Value> = investments
        .iter()
        .filter_map(|investment| {
            // None when the movement sum leaves the decimal range
            let ledger: Option<Decimal> = by_investment
                .get(&investment.id)
                .map_or(Some(Decimal::ZERO), |ms| {
                    ms.iter()
                        .try_fold(Decimal::ZERO, |total, m| total.checked_add(m.signed_amount()))
                });
            (ledger != Some(investment.current_balance)).then(|| {
                json!({
                    "investment_id": investment.id.to_string(),
                    "stored_balance": investment.current_balance.to_string(),
                    "ledger_balance": ledger.map_or_else(|| "overflow".to_string(), |l| l.to_string()),
                })
            })
        })
        .collect();

    if details.is_empty() {
        CheckResult::pass("All balances match their movement log")
    } else {
        CheckResult {
            status: "error".to_string(),
            message: format!(
                "{} investment(s) have a balance that differs from their movements",
                details.len()
            ),
            details: Some(details),
        }
    }
}

fn check_opening_movements(
    investments: &[Investment],
    by_investment: &HashMap<EntityId, Vec<&Movement>>,
) -> CheckResult {
    let details: Vec<serde_json::Value> = investments
        .iter()
        .filter(|investment| {
            !by_investment.get(&investment.id).map_or(false, |ms| {
                ms.iter().any(|m| m.movement_type == MovementType::Investment)
            })
        })
        .map(|investment| json!({ "investment_id": investment.id.to_string() }))
        .collect();

    if details.is_empty() {
        CheckResult::pass("Every investment has an opening movement")
    } else {
        CheckResult {
            status: "error".to_string(),
            message: format!("{} investment(s) have no opening movement", details.len()),
            details: Some(details),
        }
    }
}

fn check_orphans(investments: &[Investment], linked: &[Movement]) -> CheckResult {
    let known: HashSet<EntityId> = investments.iter().map(|i| i.id).collect();
    let orphaned: HashSet<EntityId> = linked
        .iter()
        .filter_map(|m| m.investment_id)
        .filter(|id| !known.contains(id))
        .collect();

    if orphaned.is_empty() {
        return CheckResult::pass("No movements reference missing investments");
    }

    let mut ids: Vec<EntityId> = orphaned.into_iter().collect();
    ids.sort();
    let details = ids
        .iter()
        .map(|id| {
            let movements = linked.iter().filter(|m| m.investment_id == Some(*id)).count();
            json!({ "investment_id": id.to_string(), "movements": movements })
        })
        .collect();

    // Deleting an emptied investment keeps its history, so this is expected
    CheckResult {
        status: "info".to_string(),
        message: format!("Movements of {} deleted investment(s) are kept as history", ids.len()),
        details: Some(details),
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: HashMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn pass(message: &str) -> Self {
        Self {
            status: "pass".to_string(),
            message: message.to_string(),
            details: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub info: i64,
    pub warnings: i64,
    pub errors: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::domain::InvestmentType;
    use rust_decimal_macros::dec;

    fn open(repo: &InMemoryRepository, user: EntityId, balance: Decimal) -> Investment {
        let investment = Investment::new(user, InvestmentType::Cdb, format!("inv-{}", EntityId::new()), balance, dec!(0));
        repo.insert_investment(&investment).unwrap();
        let opening = Movement::for_investment(
            user,
            investment.id,
            EntityId::new(),
            MovementType::Investment,
            balance,
            investment.opening_description(),
        );
        repo.insert_movement(&opening).unwrap();
        investment
    }

    fn doctor(repo: &Arc<InMemoryRepository>) -> DoctorService {
        DoctorService::new(repo.clone(), repo.clone())
    }

    #[test]
    fn test_consistent_ledger_passes() {
        let repo = Arc::new(InMemoryRepository::new());
        open(&repo, EntityId::new(), dec!(100));

        let result = doctor(&repo).run_checks(None).unwrap();
        assert_eq!(result.summary.passed, 3);
        assert_eq!(result.summary.errors, 0);
    }

    #[test]
    fn test_drift_is_reported() {
        let repo = Arc::new(InMemoryRepository::new());
        let investment = open(&repo, EntityId::new(), dec!(100));
        repo.set_balance(investment.id, dec!(160)).unwrap();

        let result = doctor(&repo).run_checks(None).unwrap();
        let drift = &result.checks["balance_drift"];
        assert_eq!(drift.status, "error");
        let details = drift.details.as_ref().unwrap();
        assert_eq!(details[0]["ledger_balance"], "100");
    }

    #[test]
    fn test_movement_sum_overflow_is_drift() {
        let repo = Arc::new(InMemoryRepository::new());
        let user = EntityId::new();
        let investment = open(&repo, user, dec!(0));
        for _ in 0..2 {
            let huge = Movement::for_investment(
                user,
                investment.id,
                EntityId::new(),
                MovementType::Investment,
                Decimal::MAX,
                "imported",
            );
            repo.insert_movement(&huge).unwrap();
        }

        let result = doctor(&repo).run_checks(None).unwrap();
        let drift = &result.checks["balance_drift"];
        assert_eq!(drift.status, "error");
        assert_eq!(drift.details.as_ref().unwrap()[0]["ledger_balance"], "overflow");
    }

    #[test]
    fn test_missing_opening_and_orphans() {
        let repo = Arc::new(InMemoryRepository::new());
        let user = EntityId::new();
        let bare = Investment::new(user, InvestmentType::Acoes, "bare", dec!(0), dec!(0));
        repo.insert_investment(&bare).unwrap();

        let deleted = open(&repo, user, dec!(0));
        repo.delete_investment(deleted.id).unwrap();

        let result = doctor(&repo).run_checks(Some(user)).unwrap();
        assert_eq!(result.checks["missing_opening_movement"].status, "error");
        assert_eq!(result.checks["orphaned_movements"].status, "info");
        assert_eq!(result.summary.info, 1);
    }

    #[test]
    fn test_scope_to_one_user() {
        let repo = Arc::new(InMemoryRepository::new());
        let investment = open(&repo, EntityId::new(), dec!(100));
        repo.set_balance(investment.id, dec!(1)).unwrap();

        let result = doctor(&repo).run_checks(Some(EntityId::new())).unwrap();
        assert_eq!(result.checks["balance_drift"].status, "pass");
    }
}
