//! # creatorchain-db
//!
//! SQLite persistence for projects, contributors, revenue pools and payouts.
//! Manages the single database at `$CREATORCHAIN_DATA_DIR/creatorchain.db`.
//!
//! ## Schema
//!
//! - WAL mode
//! - Foreign keys enforced
//! - All timestamps are Unix epoch seconds
//! - Amounts are stored as INTEGER in the token's smallest unit
//! - Schema version stored in `PRAGMA user_version`
//!
//! The one-active-payout-per-(pool, contributor) rule is enforced by a
//! partial unique index as well as by the settlement engine.

pub mod migrations;
pub mod queries;
pub mod schema;

use std::path::Path;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Row};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                DbError::Constraint(msg.clone().unwrap_or_else(|| code.to_string()))
            }
            _ => DbError::Sqlite(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open the settlement database at `path`, creating it if needed, and
/// migrate it to the current schema.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    tracing::debug!(path = %path.display(), "opening settlement database");
    initialize(conn)
}

/// Fresh in-memory database at the current schema.
pub fn open_memory() -> Result<Connection> {
    initialize(Connection::open_in_memory()?)
}

fn initialize(conn: Connection) -> Result<Connection> {
    // synchronous = FULL: a committed payout row survives power loss.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Convert an amount to its INTEGER column form.
pub(crate) fn to_sql_amount(amount: u64) -> Result<i64> {
    i64::try_from(amount)
        .map_err(|_| DbError::Constraint(format!("amount {amount} exceeds storage range")))
}

/// Read a TEXT column and parse it into a domain type.
pub(crate) fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable TEXT column and parse it into a domain type.
pub(crate) fn parse_opt_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        t.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}
