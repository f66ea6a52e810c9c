//! Forward-only schema migrations.
//!
//! The applied version lives in `PRAGMA user_version`. Each step runs in one
//! transaction together with its version bump, so a step that fails leaves
//! the database at the previous version.

use rusqlite::Connection;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Migration steps in order. Step `i` produces version `i + 1`.
const STEPS: &[&str] = &[schema::SCHEMA_V1];

/// Schema version recorded in the database.
pub fn current_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the database up to [`SCHEMA_VERSION`].
pub fn run(conn: &Connection) -> Result<()> {
    let current = current_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "database is at v{current}, this build supports up to v{SCHEMA_VERSION}"
        )));
    }

    for (version, sql) in (1..=SCHEMA_VERSION).zip(STEPS).skip(current as usize) {
        tracing::info!(version, "applying schema migration");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| DbError::Migration(format!("v{version}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("PRAGMA foreign_keys = ON;").expect("pragma");
        conn
    }

    #[test]
    fn test_steps_match_version() {
        assert_eq!(STEPS.len(), SCHEMA_VERSION as usize);
    }

    #[test]
    fn test_fresh_database_reaches_latest() {
        let conn = fresh();
        run(&conn).expect("migrate");
        assert_eq!(current_version(&conn).expect("version"), SCHEMA_VERSION);

        // Second run is a no-op.
        run(&conn).expect("rerun");
        assert_eq!(current_version(&conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_database_rejected() {
        let conn = fresh();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .expect("set version");
        assert!(matches!(run(&conn), Err(DbError::Migration(_))));
    }

    #[test]
    fn test_settlement_tables_and_indexes() {
        let conn = fresh();
        run(&conn).expect("migrate");

        for (kind, name) in [
            ("table", "projects"),
            ("table", "contributors"),
            ("table", "revenue_pools"),
            ("table", "payouts"),
            ("index", "idx_payouts_active"),
            ("trigger", "trg_pool_total_immutable"),
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
                    [kind, name],
                    |row| row.get(0),
                )
                .expect("schema lookup");
            assert_eq!(count, 1, "{kind} {name} missing");
        }
    }
}
