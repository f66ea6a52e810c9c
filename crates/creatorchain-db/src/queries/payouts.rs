//! Payout query functions.
//!
//! Payout rows are append-only history: a retry inserts a new row with the
//! next attempt number and never rewrites a failed one. Status updates are
//! guarded so that only legal transitions reach storage:
//!
//! - `pending -> processing | failed`
//! - `processing -> completed | failed | ambiguous`
//! - `ambiguous -> completed | failed` (reconciliation)

use creatorchain_types::{ContributorId, Payout, PayoutId, PayoutStatus, PoolId, TxHash};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{parse_col, parse_opt_col, to_sql_amount, DbError, Result};

const COLUMNS: &str = "id, pool_id, contributor_id, amount, attempt, reference, status,
     failure_reason, confirmations, block_number, timestamp";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Payout> {
    Ok(Payout {
        id: PayoutId(row.get(0)?),
        pool_id: PoolId(row.get(1)?),
        contributor_id: ContributorId(row.get(2)?),
        amount: row.get::<_, i64>(3)? as u64,
        attempt: row.get(4)?,
        reference: parse_opt_col(row, 5)?,
        status: parse_col(row, 6)?,
        failure_reason: row.get(7)?,
        confirmations: row.get::<_, Option<i64>>(8)?.map(|v| v as u64),
        block_number: row.get::<_, Option<i64>>(9)?.map(|v| v as u64),
        timestamp: row.get::<_, i64>(10)? as u64,
    })
}

/// States a payout may move into `status` from.
fn allowed_from(status: PayoutStatus) -> &'static [&'static str] {
    match status {
        PayoutStatus::Pending => &[],
        PayoutStatus::Processing => &["pending"],
        PayoutStatus::Failed => &["pending", "processing", "ambiguous"],
        PayoutStatus::Completed => &["processing", "ambiguous"],
        PayoutStatus::Ambiguous => &["processing"],
    }
}

/// A payout status change with the details known at that point.
#[derive(Clone, Debug)]
pub struct StatusUpdate<'a> {
    pub status: PayoutStatus,
    pub reference: Option<&'a TxHash>,
    pub failure_reason: Option<&'a str>,
    pub confirmations: Option<u64>,
    pub block_number: Option<u64>,
}

impl<'a> StatusUpdate<'a> {
    /// A bare status change.
    pub fn new(status: PayoutStatus) -> Self {
        Self {
            status,
            reference: None,
            failure_reason: None,
            confirmations: None,
            block_number: None,
        }
    }

    pub fn reference(mut self, reference: Option<&'a TxHash>) -> Self {
        self.reference = reference;
        self
    }

    pub fn failure_reason(mut self, reason: &'a str) -> Self {
        self.failure_reason = Some(reason);
        self
    }

    pub fn confirmation(mut self, confirmations: u64, block_number: Option<u64>) -> Self {
        self.confirmations = Some(confirmations);
        self.block_number = block_number;
        self
    }
}

/// Insert a pending payout as the next attempt for `(pool, contributor)`.
///
/// Fails with [`DbError::Constraint`] if a pending or processing payout
/// already exists for the pair.
pub fn insert(
    conn: &Connection,
    pool_id: PoolId,
    contributor_id: ContributorId,
    amount: u64,
    now: u64,
) -> Result<Payout> {
    let tx = conn.unchecked_transaction()?;
    let attempt: u32 = tx.query_row(
        "SELECT COALESCE(MAX(attempt), 0) + 1 FROM payouts WHERE pool_id = ?1 AND contributor_id = ?2",
        [pool_id.0, contributor_id.0],
        |row| row.get(0),
    )?;
    tx.execute(
        "INSERT INTO payouts (pool_id, contributor_id, amount, attempt, status, timestamp, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
        rusqlite::params![
            pool_id.0,
            contributor_id.0,
            to_sql_amount(amount)?,
            attempt,
            now as i64,
        ],
    )?;
    let id = PayoutId(tx.last_insert_rowid());
    tx.commit()?;

    Ok(Payout {
        id,
        pool_id,
        contributor_id,
        amount,
        attempt,
        reference: None,
        status: PayoutStatus::Pending,
        failure_reason: None,
        confirmations: None,
        block_number: None,
        timestamp: now,
    })
}

/// Get a payout by id.
pub fn get(conn: &Connection, id: PayoutId) -> Result<Payout> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM payouts WHERE id = ?1"),
        [id.0],
        from_row,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("payout {id}")))
}

/// Apply a status transition.
///
/// Fails with [`DbError::Constraint`] if the transition is not legal from
/// the payout's current state.
pub fn update_status(conn: &Connection, id: PayoutId, update: &StatusUpdate<'_>, now: u64) -> Result<()> {
    let from = allowed_from(update.status);
    if from.is_empty() {
        return Err(DbError::Constraint(format!(
            "payout {id} cannot move back to {}",
            update.status
        )));
    }
    let placeholders = from
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ");

    let updated = conn.execute(
        &format!(
            "UPDATE payouts SET
                status = ?1,
                reference = COALESCE(?2, reference),
                failure_reason = COALESCE(?3, failure_reason),
                confirmations = COALESCE(?4, confirmations),
                block_number = COALESCE(?5, block_number),
                updated_at = ?6
             WHERE id = ?7 AND status IN ({placeholders})"
        ),
        rusqlite::params![
            update.status.as_str(),
            update.reference.map(|r| r.to_string()),
            update.failure_reason,
            update.confirmations.map(|c| c as i64),
            update.block_number.map(|b| b as i64),
            now as i64,
            id.0,
        ],
    )?;

    if updated == 0 {
        let current = get(conn, id)?;
        return Err(DbError::Constraint(format!(
            "payout {id} cannot move from {} to {}",
            current.status, update.status
        )));
    }
    Ok(())
}

/// Record the transfer reference of a processing payout as soon as the
/// transfer is broadcast, before its outcome is known.
pub fn record_reference(conn: &Connection, id: PayoutId, reference: &TxHash, now: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE payouts SET reference = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'processing'",
        rusqlite::params![reference.to_string(), now as i64, id.0],
    )?;
    if updated == 0 {
        return Err(DbError::Constraint(format!(
            "payout {id} is not processing"
        )));
    }
    Ok(())
}

/// The pending or processing payout for a pair, if any.
pub fn active_for(conn: &Connection, pool_id: PoolId, contributor_id: ContributorId) -> Result<Option<Payout>> {
    let payout = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM payouts
                 WHERE pool_id = ?1 AND contributor_id = ?2 AND status IN ('pending', 'processing')"
            ),
            [pool_id.0, contributor_id.0],
            from_row,
        )
        .optional()?;
    Ok(payout)
}

/// The most recent attempt for a pair, if any.
pub fn latest_for(conn: &Connection, pool_id: PoolId, contributor_id: ContributorId) -> Result<Option<Payout>> {
    let payout = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM payouts
                 WHERE pool_id = ?1 AND contributor_id = ?2
                 ORDER BY attempt DESC LIMIT 1"
            ),
            [pool_id.0, contributor_id.0],
            from_row,
        )
        .optional()?;
    Ok(payout)
}

/// Every payout row of a pool, in creation order.
pub fn list_for_pool(conn: &Connection, pool_id: PoolId) -> Result<Vec<Payout>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM payouts WHERE pool_id = ?1 ORDER BY id ASC"
    ))?;
    let rows = stmt
        .query_map([pool_id.0], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The latest attempt of each contributor paid from a pool.
pub fn latest_per_contributor(conn: &Connection, pool_id: PoolId) -> Result<Vec<Payout>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM payouts p
         WHERE pool_id = ?1 AND attempt = (
             SELECT MAX(attempt) FROM payouts
             WHERE pool_id = p.pool_id AND contributor_id = p.contributor_id
         )
         ORDER BY id ASC"
    ))?;
    let rows = stmt
        .query_map([pool_id.0], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
