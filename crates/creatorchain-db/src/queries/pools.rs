//! Revenue pool query functions.

use creatorchain_types::{PoolId, PoolStatus, ProjectId, RevenuePool, RevenueSource, Token};
use rusqlite::{Connection, OptionalExtension, Row};

use super::projects;
use crate::{parse_col, to_sql_amount, DbError, Result};

const COLUMNS: &str = "id, project_id, source, token, total_amount, distributed_amount, status,
     fee_bps, source_metadata, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RevenuePool> {
    let metadata: Option<String> = row.get(8)?;
    let source_metadata = metadata
        .map(|m| serde_json::from_str(&m))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(RevenuePool {
        id: PoolId(row.get(0)?),
        project_id: ProjectId(row.get(1)?),
        source: parse_col(row, 2)?,
        token: parse_col(row, 3)?,
        total_amount: row.get::<_, i64>(4)? as u64,
        distributed_amount: row.get::<_, i64>(5)? as u64,
        status: parse_col(row, 6)?,
        fee_bps: row.get(7)?,
        source_metadata,
        created_at: row.get::<_, i64>(9)? as u64,
    })
}

/// Insert a pending pool and credit its amount to the project's revenue.
///
/// Both writes happen in one transaction.
pub fn insert(
    conn: &Connection,
    project_id: ProjectId,
    source: RevenueSource,
    token: &Token,
    total_amount: u64,
    source_metadata: Option<&serde_json::Value>,
    created_at: u64,
) -> Result<PoolId> {
    let metadata = source_metadata
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DbError::Serialization(e.to_string()))?;
    let amount = to_sql_amount(total_amount)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO revenue_pools
            (project_id, source, token, total_amount, status, source_metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?6)",
        rusqlite::params![
            project_id.0,
            source.as_str(),
            token.to_string(),
            amount,
            metadata,
            created_at as i64,
        ],
    )?;
    let id = PoolId(tx.last_insert_rowid());
    projects::add_revenue(&tx, project_id, total_amount, created_at)?;
    tx.commit()?;
    Ok(id)
}

/// Get a pool by id.
pub fn get(conn: &Connection, id: PoolId) -> Result<RevenuePool> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM revenue_pools WHERE id = ?1"),
        [id.0],
        from_row,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("pool {id}")))
}

/// List a project's pools, newest first.
pub fn list_for_project(conn: &Connection, project_id: ProjectId) -> Result<Vec<RevenuePool>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM revenue_pools WHERE project_id = ?1 ORDER BY created_at DESC, id DESC"
    ))?;
    let rows = stmt
        .query_map([project_id.0], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Move a pool from `from` to `to` only if it is currently in `from`.
///
/// Returns `false` if the pool was in another state. This is how a run
/// claims a pending pool without racing a concurrent run.
pub fn transition(
    conn: &Connection,
    id: PoolId,
    from: PoolStatus,
    to: PoolStatus,
    now: u64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE revenue_pools SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        rusqlite::params![to.as_str(), now as i64, id.0, from.as_str()],
    )?;
    Ok(updated == 1)
}

/// Set a pool's status unconditionally.
pub fn set_status(conn: &Connection, id: PoolId, status: PoolStatus, now: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE revenue_pools SET status = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![status.as_str(), now as i64, id.0],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("pool {id}")));
    }
    Ok(())
}

/// Record the fee applied when the pool was distributed.
pub fn record_fee(conn: &Connection, id: PoolId, fee_bps: u32, platform_fee: u64, now: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE revenue_pools SET fee_bps = ?1, platform_fee = ?2, updated_at = ?3 WHERE id = ?4",
        rusqlite::params![fee_bps, to_sql_amount(platform_fee)?, now as i64, id.0],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("pool {id}")));
    }
    Ok(())
}

/// Credit completed payouts to both the pool and its project.
///
/// Both aggregates move by the same delta in one transaction.
pub fn record_distribution(conn: &Connection, id: PoolId, delta: u64, now: u64) -> Result<()> {
    let amount = to_sql_amount(delta)?;
    let tx = conn.unchecked_transaction()?;
    let project_id: ProjectId = tx
        .query_row(
            "SELECT project_id FROM revenue_pools WHERE id = ?1",
            [id.0],
            |row| Ok(ProjectId(row.get(0)?)),
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("pool {id}")))?;
    tx.execute(
        "UPDATE revenue_pools SET distributed_amount = distributed_amount + ?1, updated_at = ?2
         WHERE id = ?3",
        rusqlite::params![amount, now as i64, id.0],
    )?;
    projects::add_distributed(&tx, project_id, delta, now)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use creatorchain_types::Address;

    fn setup() -> (Connection, ProjectId) {
        let conn = crate::open_memory().expect("open test db");
        let project = projects::insert(&conn, "Album", &Address([9u8; 20]), 100).expect("project");
        (conn, project)
    }

    #[test]
    fn test_insert_credits_revenue() {
        let (conn, project) = setup();
        let meta = serde_json::json!({"sale_id": "abc"});
        let id = insert(&conn, project, RevenueSource::Marketplace, &Token::usdc(), 5_000, Some(&meta), 200)
            .expect("insert");

        let pool = get(&conn, id).expect("get");
        assert_eq!(pool.status, PoolStatus::Pending);
        assert_eq!(pool.total_amount, 5_000);
        assert_eq!(pool.distributed_amount, 0);
        assert_eq!(pool.token, Token::usdc());
        assert_eq!(pool.source_metadata, Some(meta));
        assert_eq!(pool.fee_bps, None);

        assert_eq!(projects::get(&conn, project).expect("project").total_revenue, 5_000);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let (conn, project) = setup();
        let result = insert(&conn, project, RevenueSource::Direct, &Token::Native, 0, None, 200);
        assert!(matches!(result, Err(DbError::Constraint(_))));
        assert_eq!(projects::get(&conn, project).expect("project").total_revenue, 0);
    }

    #[test]
    fn test_transition_is_compare_and_set() {
        let (conn, project) = setup();
        let id = insert(&conn, project, RevenueSource::Direct, &Token::Native, 100, None, 200).expect("insert");
        assert!(transition(&conn, id, PoolStatus::Pending, PoolStatus::Distributing, 201).expect("claim"));
        assert!(!transition(&conn, id, PoolStatus::Pending, PoolStatus::Distributing, 202).expect("second claim"));
        assert_eq!(get(&conn, id).expect("get").status, PoolStatus::Distributing);
    }

    #[test]
    fn test_record_distribution_moves_both_totals() {
        let (conn, project) = setup();
        let id = insert(&conn, project, RevenueSource::Direct, &Token::Native, 100, None, 200).expect("insert");
        record_distribution(&conn, id, 58, 201).expect("first");
        record_distribution(&conn, id, 40, 202).expect("second");
        assert_eq!(get(&conn, id).expect("get").distributed_amount, 98);
        assert_eq!(projects::get(&conn, project).expect("project").total_distributed, 98);
    }

    #[test]
    fn test_total_amount_immutable() {
        let (conn, project) = setup();
        let id = insert(&conn, project, RevenueSource::Direct, &Token::Native, 100, None, 200).expect("insert");
        let result = conn.execute(
            "UPDATE revenue_pools SET total_amount = 500 WHERE id = ?1",
            [id.0],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_over_distribution_rejected() {
        let (conn, project) = setup();
        let id = insert(&conn, project, RevenueSource::Direct, &Token::Native, 100, None, 200).expect("insert");
        assert!(matches!(
            record_distribution(&conn, id, 101, 201),
            Err(DbError::Constraint(_))
        ));
        assert_eq!(get(&conn, id).expect("get").distributed_amount, 0);
    }

    #[test]
    fn test_record_fee() {
        let (conn, project) = setup();
        let id = insert(&conn, project, RevenueSource::Other, &Token::Native, 100, None, 200).expect("insert");
        record_fee(&conn, id, 200, 2, 201).expect("fee");
        assert_eq!(get(&conn, id).expect("get").fee_bps, Some(200));
        assert_eq!(list_for_project(&conn, project).expect("list").len(), 1);
    }
}
