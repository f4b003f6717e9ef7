//! Concurrent withdrawals against one investment
//!
//! Every thread passes the pre-check on the same balance; only the atomic
//! store check may decide who wins.
//!
//! Run with: cargo test --test concurrent_withdrawal_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use fynance_core::adapters::duckdb::DuckDbRepository;
use fynance_core::adapters::memory::InMemoryRepository;
use fynance_core::config::Config;
use fynance_core::domain::{MovementFilter, NewInvestment};
use fynance_core::{Error, FynanceContext, InvestmentType, LedgerEntry, MovementType, Plan, Stores};

const THREADS: usize = 8;

/// `THREADS` withdrawals of a third of the balance each: at most three fit
fn race_withdrawals(ctx: Arc<FynanceContext>, label: &str) {
    let user = ctx
        .user_service
        .register_user("Racer", "racer@example.com", Plan::Basic)
        .unwrap()
        .id;
    let investment = ctx
        .investment_service
        .create_investment(
            user,
            NewInvestment {
                investment_type: InvestmentType::TesouroDireto,
                name: "Tesouro Selic".to_string(),
                initial_amount: dec!(900),
                return_rate: dec!(10.75),
                category_id: None,
            },
        )
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let successes = Arc::new(AtomicUsize::new(0));
    let rejections = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let barrier = Arc::clone(&barrier);
            let successes = Arc::clone(&successes);
            let rejections = Arc::clone(&rejections);
            thread::spawn(move || {
                barrier.wait();
                match ctx
                    .investment_service
                    .make_withdrawal(investment.id, user, LedgerEntry::new(dec!(300)))
                {
                    Ok(_) => {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(Error::Validation(_)) => {
                        rejections.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let successes = successes.load(Ordering::SeqCst);
    println!("{label}: {successes} successful withdrawals");
    assert_eq!(successes, 3, "{label}");
    assert_eq!(rejections.load(Ordering::SeqCst), THREADS - 3, "{label}");

    let stored = ctx.investment_service.get_investment(investment.id, user).unwrap();
    assert_eq!(stored.current_balance, Decimal::ZERO, "{label}");

    let withdrawals = ctx
        .movement_service
        .list_movements(
            user,
            &MovementFilter {
                investment_id: Some(investment.id),
                movement_type: Some(MovementType::Withdraw),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(withdrawals.len(), 3, "{label}: one movement per successful withdrawal");
}

#[test]
fn test_concurrent_withdrawals_duckdb() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(DuckDbRepository::new(&dir.path().join("race.duckdb")).unwrap());
    repo.ensure_schema().unwrap();
    let ctx = FynanceContext::from_stores(Config::default(), Stores::duckdb(repo), None);
    race_withdrawals(Arc::new(ctx), "duckdb");
}

#[test]
fn test_concurrent_withdrawals_compensating_store() {
    let stores = Stores::in_memory(Arc::new(InMemoryRepository::new()), None);
    let ctx = FynanceContext::from_stores(Config::default(), stores, None);
    race_withdrawals(Arc::new(ctx), "memory");
}

#[test]
fn test_concurrent_contributions_are_all_counted() {
    let ctx = Arc::new(FynanceContext::in_memory(Config::default()));
    let user = ctx
        .user_service
        .register_user("Saver", "saver@example.com", Plan::Free)
        .unwrap()
        .id;
    let investment = ctx
        .investment_service
        .create_investment(
            user,
            NewInvestment {
                investment_type: InvestmentType::Acoes,
                name: "Stocks".to_string(),
                initial_amount: Decimal::ZERO,
                return_rate: Decimal::ZERO,
                category_id: None,
            },
        )
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..10 {
                    ctx.investment_service
                        .make_contribution(investment.id, user, LedgerEntry::new(dec!(1.25)))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored = ctx.investment_service.get_investment(investment.id, user).unwrap();
    assert_eq!(stored.current_balance, dec!(100));
    assert_eq!(
        ctx.investment_service.get_total_invested(investment.id, user).unwrap(),
        dec!(100)
    );
}

/// A delete racing a contribution either keeps the funded investment or
/// rejects the contribution; a funded investment is never deleted
fn race_delete_and_contribute(ctx: Arc<FynanceContext>, label: &str) {
    let user = ctx
        .user_service
        .register_user("Closer", "closer@example.com", Plan::Free)
        .unwrap()
        .id;

    for round in 0..20 {
        let investment = ctx
            .investment_service
            .create_investment(
                user,
                NewInvestment {
                    investment_type: InvestmentType::Cdb,
                    name: format!("Round {round}"),
                    initial_amount: Decimal::ZERO,
                    return_rate: Decimal::ZERO,
                    category_id: None,
                },
            )
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let deleter = {
            let ctx = Arc::clone(&ctx);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ctx.investment_service.delete_investment(investment.id, user)
            })
        };
        barrier.wait();
        let contribution = ctx
            .investment_service
            .make_contribution(investment.id, user, LedgerEntry::new(dec!(100)));
        let deleted = deleter.join().unwrap();

        let remaining = ctx.investment_service.get_investment(investment.id, user);
        match contribution {
            Ok(_) => {
                assert!(matches!(deleted, Err(Error::Validation(_))), "{label}: {deleted:?}");
                assert_eq!(remaining.unwrap().current_balance, dec!(100), "{label}");
            }
            Err(err) => {
                assert!(matches!(err, Error::InvestmentNotFound(_)), "{label}: {err}");
                assert!(deleted.is_ok(), "{label}");
                assert!(matches!(remaining, Err(Error::InvestmentNotFound(_))), "{label}");
            }
        }
    }

    let doctor = ctx.doctor_service.run_checks(Some(user)).unwrap();
    assert_eq!(doctor.summary.errors, 0, "{label}");
}

#[test]
fn test_delete_races_contribution_duckdb() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(DuckDbRepository::new(&dir.path().join("close.duckdb")).unwrap());
    repo.ensure_schema().unwrap();
    let ctx = FynanceContext::from_stores(Config::default(), Stores::duckdb(repo), None);
    race_delete_and_contribute(Arc::new(ctx), "duckdb");
}

#[test]
fn test_delete_races_contribution_compensating_store() {
    let ctx = FynanceContext::in_memory(Config::default());
    race_delete_and_contribute(Arc::new(ctx), "memory");
}
