//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for every entity port and transactional ledger writes
//! - In-memory maps for every entity port
//! - A compensating ledger store for entity stores without transactions

pub mod compensating;
pub mod duckdb;
pub mod memory;
