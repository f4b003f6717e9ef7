//! DuckDB repository implementation
//!
//! Implements every entity port plus [`LedgerStore`]. Ledger writes run in a
//! single storage transaction, and the balance change is one conditional
//! `UPDATE` so the non-negativity check and the write cannot interleave.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use duckdb::{params, params_from_iter, Connection, Params};
use log::{debug, warn};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::ids::{format_timestamp, parse_timestamp};
use crate::domain::result::{Error, Result};
use crate::domain::{
    Category, EntityId, Investment, InvestmentType, Movement, MovementFilter, MovementType, Plan,
    User, INVESTMENT_HAS_BALANCE, MAX_AMOUNT,
};
use crate::ports::{
    CategoryRepository, InvestmentRepository, LedgerStore, MovementRepository, UserDirectory,
};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

const USER_COLUMNS: &str = "id, name, email, plan, created_at, updated_at";

const CATEGORY_COLUMNS: &str = "id, user_id, name, icon, created_at, updated_at";

const INVESTMENT_COLUMNS: &str = "id, user_id, investment_type, name, \
     current_balance::VARCHAR, return_rate::VARCHAR, application_date, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, user_id, movement_type, category_id, investment_id, \
     amount::VARCHAR, description, movement_date, created_at, updated_at";

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the database file at `db_path`
    ///
    /// Retries with exponential backoff while the file is locked by another
    /// process, which happens when two CLI invocations overlap.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    })
                }
                Err(e) if is_retryable_error(&e.to_string()) && attempt < MAX_RETRIES - 1 => {
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    warn!(
                        "database busy, retrying in {}ms (attempt {}/{}): {}",
                        delay.as_millis(),
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(Error::database(
                        format!("failed to open database {}", db_path.display()),
                        e,
                    ))
                }
            }
        }
    }

    /// Open a private in-memory database, schema not yet applied
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Extension autoloading stays off: cached extensions may fail code signing on macOS
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database("database lock poisoned", e.to_string()))
    }

    /// Run pending schema migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }
}

// === Row mapping ===

struct UserRow {
    id: String,
    name: String,
    email: String,
    plan: String,
    created_at: String,
    updated_at: String,
}

impl UserRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            plan: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_user(self) -> Result<User> {
        Ok(User {
            id: stored_id(&self.id)?,
            name: self.name,
            email: self.email,
            plan: Plan::from_str(&self.plan).map_err(|e| corrupt("plan", e))?,
            created_at: stored_timestamp(&self.created_at)?,
            updated_at: stored_timestamp(&self.updated_at)?,
        })
    }
}

struct CategoryRow {
    id: String,
    user_id: String,
    name: String,
    icon: Option<String>,
    created_at: String,
    updated_at: String,
}

impl CategoryRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            icon: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_category(self) -> Result<Category> {
        Ok(Category {
            id: stored_id(&self.id)?,
            user_id: stored_id(&self.user_id)?,
            name: self.name,
            icon: self.icon,
            created_at: stored_timestamp(&self.created_at)?,
            updated_at: stored_timestamp(&self.updated_at)?,
        })
    }
}

struct InvestmentRow {
    id: String,
    user_id: String,
    investment_type: String,
    name: String,
    current_balance: String,
    return_rate: String,
    application_date: String,
    created_at: String,
    updated_at: String,
}

impl InvestmentRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            investment_type: row.get(2)?,
            name: row.get(3)?,
            current_balance: row.get(4)?,
            return_rate: row.get(5)?,
            application_date: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_investment(self) -> Result<Investment> {
        Ok(Investment {
            id: stored_id(&self.id)?,
            user_id: stored_id(&self.user_id)?,
            investment_type: InvestmentType::from_str(&self.investment_type)
                .map_err(|e| corrupt("investment type", e))?,
            name: self.name,
            current_balance: stored_decimal(&self.current_balance)?,
            return_rate: stored_decimal(&self.return_rate)?,
            application_date: stored_timestamp(&self.application_date)?,
            created_at: stored_timestamp(&self.created_at)?,
            updated_at: stored_timestamp(&self.updated_at)?,
        })
    }
}

struct MovementRow {
    id: String,
    user_id: String,
    movement_type: String,
    category_id: String,
    investment_id: Option<String>,
    amount: String,
    description: String,
    date: String,
    created_at: String,
    updated_at: String,
}

impl MovementRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            movement_type: row.get(2)?,
            category_id: row.get(3)?,
            investment_id: row.get(4)?,
            amount: row.get(5)?,
            description: row.get(6)?,
            date: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_movement(self) -> Result<Movement> {
        Ok(Movement {
            id: stored_id(&self.id)?,
            user_id: stored_id(&self.user_id)?,
            movement_type: MovementType::from_str(&self.movement_type)
                .map_err(|e| corrupt("movement type", e))?,
            category_id: stored_id(&self.category_id)?,
            investment_id: self.investment_id.as_deref().map(stored_id).transpose()?,
            amount: stored_decimal(&self.amount)?,
            description: self.description,
            date: stored_timestamp(&self.date)?,
            created_at: stored_timestamp(&self.created_at)?,
            updated_at: stored_timestamp(&self.updated_at)?,
        })
    }
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> Error {
    Error::database(format!("invalid {} in storage", what), err.to_string())
}

fn stored_id(s: &str) -> Result<EntityId> {
    Uuid::parse_str(s)
        .map(EntityId::from_uuid)
        .map_err(|e| corrupt("id", e))
}

fn stored_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| corrupt("decimal", e))
}

fn stored_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    parse_timestamp(s).map_err(|e| corrupt("timestamp", e))
}

/// Map a failed write: unique violations become `Conflict`, CHECK violations
/// `Validation`, anything else `Database` with `context`
fn write_error(err: duckdb::Error, context: &str, conflict: &str) -> Error {
    let msg = err.to_string();
    if msg.contains("CHECK constraint") {
        Error::validation(format!("{}: value out of range", context))
    } else if msg.contains("Duplicate key") || msg.contains("unique constraint") {
        Error::conflict(conflict)
    } else {
        Error::database(context, err)
    }
}

/// Read raw rows first, then convert, so parse failures surface as our errors
fn query_all<R, T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&duckdb::Row<'_>) -> duckdb::Result<R>,
    convert: fn(R) -> Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(params, map)?
        .collect::<duckdb::Result<Vec<_>>>()?;
    raw.into_iter().map(convert).collect()
}

fn query_users<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<User>> {
    query_all(conn, sql, params, UserRow::from_row, UserRow::into_user)
}

fn query_categories<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Category>> {
    query_all(conn, sql, params, CategoryRow::from_row, CategoryRow::into_category)
}

fn query_investments<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Investment>> {
    query_all(conn, sql, params, InvestmentRow::from_row, InvestmentRow::into_investment)
}

fn query_movements<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Movement>> {
    query_all(conn, sql, params, MovementRow::from_row, MovementRow::into_movement)
}

fn insert_investment_row(conn: &Connection, investment: &Investment) -> Result<()> {
    conn.execute(
        "INSERT INTO investments (id, user_id, investment_type, name, name_key, current_balance,
                                  return_rate, application_date, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, CAST(? AS DECIMAL(18,4)), CAST(? AS DECIMAL(18,4)), ?, ?, ?)",
        params![
            investment.id.to_string(),
            investment.user_id.to_string(),
            investment.investment_type.as_str(),
            investment.name,
            investment.name_key(),
            investment.current_balance.to_string(),
            investment.return_rate.to_string(),
            format_timestamp(&investment.application_date),
            format_timestamp(&investment.created_at),
            format_timestamp(&investment.updated_at),
        ],
    )
    .map_err(|e| {
        write_error(
            e,
            "failed to insert investment",
            &format!("an investment named '{}' already exists", investment.name),
        )
    })?;
    Ok(())
}

fn insert_movement_row(conn: &Connection, movement: &Movement) -> Result<()> {
    conn.execute(
        "INSERT INTO movements (id, user_id, movement_type, category_id, investment_id, amount,
                                description, movement_date, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, CAST(? AS DECIMAL(18,4)), ?, ?, ?, ?)",
        params![
            movement.id.to_string(),
            movement.user_id.to_string(),
            movement.movement_type.as_str(),
            movement.category_id.to_string(),
            movement.investment_id.map(|id| id.to_string()),
            movement.amount.to_string(),
            movement.description,
            format_timestamp(&movement.date),
            format_timestamp(&movement.created_at),
            format_timestamp(&movement.updated_at),
        ],
    )
    .map_err(|e| write_error(e, "failed to insert movement", "movement already exists"))?;
    Ok(())
}

// === Users ===

impl UserDirectory for DuckDbRepository {
    fn insert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, name, email, email_key, plan, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                user.id.to_string(),
                user.name,
                user.email,
                user.email_key(),
                user.plan.as_str(),
                format_timestamp(&user.created_at),
                format_timestamp(&user.updated_at),
            ],
        )
        .map_err(|e| {
            write_error(
                e,
                "failed to insert user",
                "a user with this email already exists",
            )
        })?;
        Ok(())
    }

    fn get_user_by_id(&self, id: EntityId) -> Result<Option<User>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        Ok(query_users(&conn, &sql, params![id.to_string()])?.into_iter().next())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM users WHERE email_key = ?", USER_COLUMNS);
        let key = email.trim().to_lowercase();
        Ok(query_users(&conn, &sql, params![key])?.into_iter().next())
    }
}

// === Categories ===

impl CategoryRepository for DuckDbRepository {
    fn insert_category(&self, category: &Category) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO categories (id, user_id, name, name_key, icon, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                category.id.to_string(),
                category.user_id.to_string(),
                category.name,
                category.name_key(),
                category.icon,
                format_timestamp(&category.created_at),
                format_timestamp(&category.updated_at),
            ],
        )
        .map_err(|e| {
            write_error(
                e,
                "failed to insert category",
                &format!("a category named '{}' already exists", category.name),
            )
        })?;
        Ok(())
    }

    fn update_category(&self, category: &Category) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE categories SET name = ?, name_key = ?, icon = ?, updated_at = ? WHERE id = ?",
            params![
                category.name,
                category.name_key(),
                category.icon,
                format_timestamp(&category.updated_at),
                category.id.to_string(),
            ],
        )
        .map_err(|e| {
            write_error(
                e,
                "failed to update category",
                &format!("a category named '{}' already exists", category.name),
            )
        })?;
        Ok(())
    }

    fn delete_category(&self, id: EntityId) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM categories WHERE id = ?", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    fn get_category(&self, id: EntityId) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
        Ok(query_categories(&conn, &sql, params![id.to_string()])?.into_iter().next())
    }

    fn find_category_by_name(&self, user_id: EntityId, name: &str) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM categories WHERE user_id = ? AND name_key = ?",
            CATEGORY_COLUMNS
        );
        let key = name.trim().to_lowercase();
        Ok(query_categories(&conn, &sql, params![user_id.to_string(), key])?
            .into_iter()
            .next())
    }

    fn list_categories(&self, user_id: EntityId) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM categories WHERE user_id = ? ORDER BY name_key, id",
            CATEGORY_COLUMNS
        );
        query_categories(&conn, &sql, params![user_id.to_string()])
    }
}

// === Investments ===

impl InvestmentRepository for DuckDbRepository {
    fn insert_investment(&self, investment: &Investment) -> Result<()> {
        let conn = self.conn()?;
        insert_investment_row(&conn, investment)
    }

    fn update_investment(&self, investment: &Investment) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE investments
             SET investment_type = ?, name = ?, name_key = ?,
                 return_rate = CAST(? AS DECIMAL(18,4)), updated_at = ?
             WHERE id = ?",
            params![
                investment.investment_type.as_str(),
                investment.name,
                investment.name_key(),
                investment.return_rate.to_string(),
                format_timestamp(&investment.updated_at),
                investment.id.to_string(),
            ],
        )
        .map_err(|e| {
            write_error(
                e,
                "failed to update investment",
                &format!("an investment named '{}' already exists", investment.name),
            )
        })?;
        Ok(())
    }

    fn set_balance(&self, id: EntityId, balance: Decimal) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE investments SET current_balance = CAST(? AS DECIMAL(18,4)) WHERE id = ?",
                params![balance.to_string(), id.to_string()],
            )
            .map_err(|e| write_error(e, "failed to update balance", "balance update conflict"))?;
        if updated == 0 {
            return Err(Error::InvestmentNotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete_investment(&self, id: EntityId) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM investments WHERE id = ?", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    fn get_investment(&self, id: EntityId) -> Result<Option<Investment>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM investments WHERE id = ?", INVESTMENT_COLUMNS);
        Ok(query_investments(&conn, &sql, params![id.to_string()])?.into_iter().next())
    }

    fn find_investment_by_name(&self, user_id: EntityId, name: &str) -> Result<Option<Investment>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM investments WHERE user_id = ? AND name_key = ?",
            INVESTMENT_COLUMNS
        );
        let key = name.trim().to_lowercase();
        Ok(query_investments(&conn, &sql, params![user_id.to_string(), key])?
            .into_iter()
            .next())
    }

    fn list_investments(
        &self,
        user_id: EntityId,
        investment_type: Option<InvestmentType>,
    ) -> Result<Vec<Investment>> {
        let conn = self.conn()?;
        match investment_type {
            Some(t) => {
                let sql = format!(
                    "SELECT {} FROM investments WHERE user_id = ? AND investment_type = ?
                     ORDER BY application_date DESC, id DESC",
                    INVESTMENT_COLUMNS
                );
                query_investments(&conn, &sql, params![user_id.to_string(), t.as_str()])
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM investments WHERE user_id = ?
                     ORDER BY application_date DESC, id DESC",
                    INVESTMENT_COLUMNS
                );
                query_investments(&conn, &sql, params![user_id.to_string()])
            }
        }
    }

    fn list_all_investments(&self) -> Result<Vec<Investment>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM investments ORDER BY id", INVESTMENT_COLUMNS);
        query_investments(&conn, &sql, [])
    }
}

// === Movements ===

impl MovementRepository for DuckDbRepository {
    fn insert_movement(&self, movement: &Movement) -> Result<()> {
        let conn = self.conn()?;
        insert_movement_row(&conn, movement)
    }

    fn update_movement(&self, movement: &Movement) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE movements
             SET movement_type = ?, category_id = ?, amount = CAST(? AS DECIMAL(18,4)),
                 description = ?, movement_date = ?, updated_at = ?
             WHERE id = ?",
            params![
                movement.movement_type.as_str(),
                movement.category_id.to_string(),
                movement.amount.to_string(),
                movement.description,
                format_timestamp(&movement.date),
                format_timestamp(&movement.updated_at),
                movement.id.to_string(),
            ],
        )
        .map_err(|e| write_error(e, "failed to update movement", "movement update conflict"))?;
        Ok(())
    }

    fn delete_movement(&self, id: EntityId) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM movements WHERE id = ?", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    fn get_movement(&self, id: EntityId) -> Result<Option<Movement>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM movements WHERE id = ?", MOVEMENT_COLUMNS);
        Ok(query_movements(&conn, &sql, params![id.to_string()])?.into_iter().next())
    }

    fn list_movements(&self, user_id: EntityId, filter: &MovementFilter) -> Result<Vec<Movement>> {
        let mut sql = format!("SELECT {} FROM movements WHERE user_id = ?", MOVEMENT_COLUMNS);
        let mut values = vec![user_id.to_string()];

        if let Some(category_id) = filter.category_id {
            sql.push_str(" AND category_id = ?");
            values.push(category_id.to_string());
        }
        if let Some(investment_id) = filter.investment_id {
            sql.push_str(" AND investment_id = ?");
            values.push(investment_id.to_string());
        }
        if let Some(movement_type) = filter.movement_type {
            sql.push_str(" AND movement_type = ?");
            values.push(movement_type.as_str().to_string());
        }
        sql.push_str(" ORDER BY movement_date DESC, id DESC");

        let conn = self.conn()?;
        query_movements(&conn, &sql, params_from_iter(values.iter()))
    }

    fn list_linked_movements(&self) -> Result<Vec<Movement>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM movements WHERE investment_id IS NOT NULL ORDER BY id",
            MOVEMENT_COLUMNS
        );
        query_movements(&conn, &sql, [])
    }

    fn sum_amount(&self, investment_id: EntityId, movement_type: MovementType) -> Result<Decimal> {
        let conn = self.conn()?;
        let total: String = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0)::VARCHAR FROM movements
             WHERE investment_id = ? AND movement_type = ?",
            params![investment_id.to_string(), movement_type.as_str()],
            |row| row.get(0),
        )?;
        stored_decimal(&total)
    }

    fn count_by_category(&self, category_id: EntityId) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM movements WHERE category_id = ?",
            params![category_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

// === Ledger ===

impl LedgerStore for DuckDbRepository {
    fn open_investment(&self, investment: &Investment, opening: &Movement) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        insert_investment_row(&tx, investment)?;
        insert_movement_row(&tx, opening)?;
        tx.commit()?;
        debug!("opened investment {}", investment.id);
        Ok(())
    }

    fn post_movement(&self, movement: &Movement) -> Result<Decimal> {
        let investment_id = movement
            .investment_id
            .ok_or_else(|| Error::validation("movement is not linked to an investment"))?;
        movement.validate().map_err(Error::validation)?;

        let signed = movement.signed_amount();
        let delta = signed.to_string();
        let id = investment_id.to_string();
        let user_id = movement.user_id.to_string();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE investments
             SET current_balance = current_balance + CAST(? AS DECIMAL(18,4)), updated_at = ?
             WHERE id = ? AND user_id = ?
               AND current_balance + CAST(? AS DECIMAL(18,4)) >= 0
               AND current_balance + CAST(? AS DECIMAL(18,4)) <= CAST(? AS DECIMAL(18,4))",
            params![
                delta,
                format_timestamp(&movement.created_at),
                id,
                user_id,
                delta,
                delta,
                MAX_AMOUNT.to_string()
            ],
        )?;

        if updated == 0 {
            let exists: i64 = tx.query_row(
                "SELECT COUNT(*) FROM investments WHERE id = ? AND user_id = ?",
                params![id, user_id],
                |row| row.get(0),
            )?;
            // Dropping the transaction rolls it back
            return Err(if exists == 0 {
                Error::InvestmentNotFound(id)
            } else if signed.is_sign_positive() {
                Error::validation("balance would exceed the largest supported value")
            } else {
                Error::validation("insufficient balance")
            });
        }

        insert_movement_row(&tx, movement)?;

        let balance: String = tx.query_row(
            "SELECT current_balance::VARCHAR FROM investments WHERE id = ?",
            params![id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        stored_decimal(&balance)
    }

    fn close_investment(&self, investment_id: EntityId, user_id: EntityId) -> Result<()> {
        let id = investment_id.to_string();
        let user_id = user_id.to_string();
        let conn = self.conn()?;

        let deleted = conn.execute(
            "DELETE FROM investments WHERE id = ? AND user_id = ? AND current_balance = 0",
            params![id, user_id],
        )?;
        if deleted > 0 {
            debug!("closed investment {}", id);
            return Ok(());
        }

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM investments WHERE id = ? AND user_id = ?",
            params![id, user_id],
            |row| row.get(0),
        )?;
        Err(if exists == 0 {
            Error::InvestmentNotFound(id)
        } else {
            Error::validation(INVESTMENT_HAS_BALANCE)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn seeded(repo: &DuckDbRepository, balance: Decimal) -> (User, Category, Investment) {
        let user = User::new("Ana", "ana@example.com", Plan::Free);
        repo.insert_user(&user).unwrap();
        let category = Category::new(user.id, "Investment", None);
        repo.insert_category(&category).unwrap();
        let investment = Investment::new(user.id, InvestmentType::Cdb, "CDB", balance, dec!(10));
        let opening = Movement::for_investment(
            user.id,
            investment.id,
            category.id,
            MovementType::Investment,
            balance,
            investment.opening_description(),
        );
        repo.open_investment(&investment, &opening).unwrap();
        (user, category, investment)
    }

    #[test]
    fn test_investment_round_trips_exactly() {
        let repo = repo();
        let (_, _, investment) = seeded(&repo, dec!(1234.5678));

        let loaded = repo.get_investment(investment.id).unwrap().unwrap();
        assert_eq!(loaded, investment);
    }

    #[test]
    fn test_post_movement_updates_balance() {
        let repo = repo();
        let (user, category, investment) = seeded(&repo, dec!(1000));

        let deposit = Movement::for_investment(
            user.id,
            investment.id,
            category.id,
            MovementType::Investment,
            dec!(250.5),
            "Contribution",
        );
        assert_eq!(repo.post_movement(&deposit).unwrap(), dec!(1250.5));

        let withdrawal = Movement::for_investment(
            user.id,
            investment.id,
            category.id,
            MovementType::Withdraw,
            dec!(1250.5),
            "Withdrawal",
        );
        assert_eq!(repo.post_movement(&withdrawal).unwrap(), dec!(0));
    }

    #[test]
    fn test_post_movement_rejects_overdraft_without_side_effects() {
        let repo = repo();
        let (user, category, investment) = seeded(&repo, dec!(100));

        let withdrawal = Movement::for_investment(
            user.id,
            investment.id,
            category.id,
            MovementType::Withdraw,
            dec!(100.01),
            "Withdrawal",
        );
        let err = repo.post_movement(&withdrawal).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert_eq!(repo.get_investment(investment.id).unwrap().unwrap().current_balance, dec!(100));
        assert!(repo.get_movement(withdrawal.id).unwrap().is_none());
    }

    #[test]
    fn test_post_movement_rejects_balance_above_storage_range() {
        let repo = repo();
        let (user, category, investment) = seeded(&repo, MAX_AMOUNT - dec!(1));

        let contribution = Movement::for_investment(
            user.id,
            investment.id,
            category.id,
            MovementType::Investment,
            dec!(2),
            "Contribution",
        );
        let err = repo.post_movement(&contribution).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err}");
        assert!(repo.get_movement(contribution.id).unwrap().is_none());
        assert_eq!(
            repo.get_investment(investment.id).unwrap().unwrap().current_balance,
            MAX_AMOUNT - dec!(1)
        );
    }

    #[test]
    fn test_close_investment_requires_zero_balance() {
        let repo = repo();
        let (user, category, investment) = seeded(&repo, dec!(50));

        let err = repo.close_investment(investment.id, user.id).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(repo.get_investment(investment.id).unwrap().is_some());

        let err = repo.close_investment(investment.id, EntityId::new()).unwrap_err();
        assert!(matches!(err, Error::InvestmentNotFound(_)));

        let withdrawal = Movement::for_investment(
            user.id,
            investment.id,
            category.id,
            MovementType::Withdraw,
            dec!(50),
            "Withdrawal",
        );
        repo.post_movement(&withdrawal).unwrap();
        repo.close_investment(investment.id, user.id).unwrap();
        assert!(repo.get_investment(investment.id).unwrap().is_none());
        assert!(repo.get_movement(withdrawal.id).unwrap().is_some());
    }

    #[test]
    fn test_post_movement_for_missing_investment() {
        let repo = repo();
        let movement = Movement::for_investment(
            EntityId::new(),
            EntityId::new(),
            EntityId::new(),
            MovementType::Investment,
            dec!(1),
            "Contribution",
        );
        let err = repo.post_movement(&movement).unwrap_err();
        assert!(matches!(err, Error::InvestmentNotFound(_)));
    }

    #[test]
    fn test_open_investment_is_atomic() {
        let repo = repo();
        let (user, category, _) = seeded(&repo, dec!(10));

        // Same name (different case) violates the unique index, the movement must not persist
        let duplicate = Investment::new(user.id, InvestmentType::Acoes, "cdb", dec!(5), dec!(0));
        let opening = Movement::for_investment(
            user.id,
            duplicate.id,
            category.id,
            MovementType::Investment,
            dec!(5),
            duplicate.opening_description(),
        );
        let err = repo.open_investment(&duplicate, &opening).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(repo.get_movement(opening.id).unwrap().is_none());
    }

    #[test]
    fn test_sum_amount_and_counts() {
        let repo = repo();
        let (user, category, investment) = seeded(&repo, dec!(1000));
        let deposit = Movement::for_investment(
            user.id,
            investment.id,
            category.id,
            MovementType::Investment,
            dec!(500),
            "Contribution",
        );
        repo.post_movement(&deposit).unwrap();

        assert_eq!(repo.sum_amount(investment.id, MovementType::Investment).unwrap(), dec!(1500));
        assert_eq!(repo.sum_amount(investment.id, MovementType::Withdraw).unwrap(), dec!(0));
        assert_eq!(repo.count_by_category(category.id).unwrap(), 2);
    }

    #[test]
    fn test_duplicate_email_is_conflict() {
        let repo = repo();
        repo.insert_user(&User::new("Ana", "ana@example.com", Plan::Free)).unwrap();
        let err = repo
            .insert_user(&User::new("Other", "ANA@example.com", Plan::Pro))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_list_movements_filters_and_orders() {
        let repo = repo();
        let (user, category, investment) = seeded(&repo, dec!(10));
        let older = Movement::new(
            user.id,
            category.id,
            MovementType::Expense,
            dec!(3),
            "older",
            Some(chrono::Utc::now() - chrono::Duration::days(3)),
        );
        repo.insert_movement(&older).unwrap();

        let all = repo.list_movements(user.id, &MovementFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].id, older.id);

        let linked = repo
            .list_movements(
                user.id,
                &MovementFilter {
                    investment_id: Some(investment.id),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].investment_id, Some(investment.id));
    }
}
