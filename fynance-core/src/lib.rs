//! Fynance Core - investment ledger for personal finance
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Investment, Movement, Category, User)
//! - **ports**: Storage traits the services depend on
//! - **services**: Business logic orchestration (ledger, movement log, ...)
//! - **adapters**: Concrete implementations (DuckDB, in-memory, compensating ledger)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use log::warn;

use adapters::compensating::CompensatingLedgerStore;
use adapters::duckdb::DuckDbRepository;
use adapters::memory::InMemoryRepository;
use config::Config;
use ports::{CategoryRepository, InvestmentRepository, LedgerStore, MovementRepository, UserDirectory};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{
    Category, EntityId, Investment, InvestmentReturn, InvestmentType, LedgerEntry, Movement,
    MovementType, Plan, User,
};

/// Ledger database file
pub const DB_FILENAME: &str = "fynance.duckdb";

/// Ledger database file used while demo mode is on
pub const DEMO_DB_FILENAME: &str = "demo.duckdb";

/// Version stamped on event log entries
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Storage handles a context is wired from
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserDirectory>,
    pub categories: Arc<dyn CategoryRepository>,
    pub investments: Arc<dyn InvestmentRepository>,
    pub movements: Arc<dyn MovementRepository>,
    pub ledger: Arc<dyn LedgerStore>,
}

impl Stores {
    /// Every port served by one DuckDB database, ledger writes in transactions
    pub fn duckdb(repository: Arc<DuckDbRepository>) -> Self {
        Self {
            users: repository.clone(),
            categories: repository.clone(),
            investments: repository.clone(),
            movements: repository.clone(),
            ledger: repository,
        }
    }

    /// Every port served by the in-memory store, ledger writes compensated
    pub fn in_memory(repository: Arc<InMemoryRepository>, event_log: Option<Arc<LoggingService>>) -> Self {
        let mut ledger = CompensatingLedgerStore::new(repository.clone(), repository.clone());
        if let Some(event_log) = event_log {
            ledger = ledger.with_event_log(event_log);
        }
        Self {
            users: repository.clone(),
            categories: repository.clone(),
            investments: repository.clone(),
            movements: repository,
            ledger: Arc::new(ledger),
        }
    }
}

/// Main context for Fynance operations
///
/// This is the primary entry point for all business logic. It holds the
/// configuration and every service, wired over one set of stores.
pub struct FynanceContext {
    pub config: Config,
    pub user_service: UserService,
    pub category_service: Arc<CategoryService>,
    pub movement_service: Arc<MovementService>,
    pub investment_service: InvestmentService,
    pub doctor_service: DoctorService,
    pub ownership: Arc<OwnershipGuard>,
    pub event_log: Option<Arc<LoggingService>>,
}

impl FynanceContext {
    /// Open the DuckDB-backed context in `data_dir`
    ///
    /// Uses `demo.duckdb` while demo mode is on. The event log is optional:
    /// when `logs.duckdb` cannot be opened the context still works.
    pub fn new(data_dir: &Path, entry_point: EntryPoint) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let config = Config::load(data_dir)?;

        let db_filename = if config.demo_mode {
            DEMO_DB_FILENAME
        } else {
            DB_FILENAME
        };
        let repository = Arc::new(DuckDbRepository::new(&data_dir.join(db_filename))?);
        repository.ensure_schema()?;

        let event_log = match LoggingService::new(data_dir, entry_point, VERSION) {
            Ok(service) => Some(Arc::new(service)),
            Err(e) => {
                warn!("event log unavailable: {}", e);
                None
            }
        };

        Ok(Self::from_stores(config, Stores::duckdb(repository), event_log))
    }

    /// Context over a fresh in-memory store
    pub fn in_memory(config: Config) -> Self {
        let repository = Arc::new(InMemoryRepository::new());
        Self::from_stores(config, Stores::in_memory(repository, None), None)
    }

    /// Wire every service over `stores`
    pub fn from_stores(config: Config, stores: Stores, event_log: Option<Arc<LoggingService>>) -> Self {
        let ownership = Arc::new(OwnershipGuard::new(
            stores.investments.clone(),
            stores.movements.clone(),
            stores.categories.clone(),
        ));
        let user_service = UserService::new(stores.users.clone());
        let category_service = Arc::new(CategoryService::new(
            stores.categories.clone(),
            stores.movements.clone(),
            stores.users.clone(),
            ownership.clone(),
        ));
        let movement_service = Arc::new(MovementService::new(
            stores.movements.clone(),
            stores.users.clone(),
            category_service.clone(),
            ownership.clone(),
            config.default_category(),
        ));
        let mut investment_service = InvestmentService::new(
            stores.investments.clone(),
            stores.movements.clone(),
            stores.ledger.clone(),
            stores.users.clone(),
            ownership.clone(),
            movement_service.clone(),
        );
        if let Some(event_log) = &event_log {
            investment_service = investment_service.with_event_log(event_log.clone());
        }
        let doctor_service = DoctorService::new(stores.investments, stores.movements);

        Self {
            config,
            user_service,
            category_service,
            movement_service,
            investment_service,
            doctor_service,
            ownership,
            event_log,
        }
    }
}
