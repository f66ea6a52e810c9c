//! Contributor query functions.

use creatorchain_types::{Contributor, ContributorId, ContributorStatus, ProjectId, ShareBps};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{parse_col, DbError, Result};

const COLUMNS: &str = "id, project_id, wallet, share_bps, role, status, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Contributor> {
    let share_bps: u32 = row.get(3)?;
    let share = ShareBps::new(share_bps).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Integer, Box::new(e))
    })?;
    Ok(Contributor {
        id: ContributorId(row.get(0)?),
        project_id: ProjectId(row.get(1)?),
        wallet: row.get(2)?,
        share,
        role: row.get(4)?,
        status: parse_col(row, 5)?,
        created_at: row.get::<_, i64>(6)? as u64,
    })
}

/// Insert a contributor.
pub fn insert(
    conn: &Connection,
    project_id: ProjectId,
    wallet: &str,
    share: ShareBps,
    role: &str,
    status: ContributorStatus,
    created_at: u64,
) -> Result<ContributorId> {
    conn.execute(
        "INSERT INTO contributors (project_id, wallet, share_bps, role, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        rusqlite::params![
            project_id.0,
            wallet,
            share.bps(),
            role,
            status.as_str(),
            created_at as i64,
        ],
    )?;
    Ok(ContributorId(conn.last_insert_rowid()))
}

/// Get a contributor by id.
pub fn get(conn: &Connection, id: ContributorId) -> Result<Contributor> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM contributors WHERE id = ?1"),
        [id.0],
        from_row,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("contributor {id}")))
}

/// Confirmed contributors of a project in creation order.
///
/// This ordering is the allocation order used by the split calculator.
pub fn confirmed_for_project(conn: &Connection, project_id: ProjectId) -> Result<Vec<Contributor>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM contributors
         WHERE project_id = ?1 AND status = 'confirmed'
         ORDER BY created_at ASC, id ASC"
    ))?;
    let rows = stmt
        .query_map([project_id.0], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Update a contributor's onboarding status.
pub fn set_status(
    conn: &Connection,
    id: ContributorId,
    status: ContributorStatus,
    now: u64,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE contributors SET status = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![status.as_str(), now as i64, id.0],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("contributor {id}")));
    }
    Ok(())
}
