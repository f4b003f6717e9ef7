//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod category;
mod demo;
mod doctor;
mod investment;
pub mod logging;
pub mod migration;
mod movement;
mod ownership;
mod user;

pub use category::CategoryService;
pub use demo::{DemoService, DEMO_USER_EMAIL};
pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use investment::InvestmentService;
pub use logging::{EntryPoint, EventCount, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use movement::{DefaultCategory, MovementService};
pub use ownership::{OwnershipGuard, Resource};
pub use user::UserService;
