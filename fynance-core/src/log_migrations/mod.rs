//! Event log database migrations - embedded SQL files
//!
//! Same layout as the ledger migrations, tracked in the log database's own
//! sys_migrations table.

pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
