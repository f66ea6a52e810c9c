//! Project query functions.

use creatorchain_types::{Address, Project, ProjectId, ProjectStatus};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{parse_col, to_sql_amount, DbError, Result};

const COLUMNS: &str =
    "id, name, creator, status, total_revenue, total_distributed, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: ProjectId(row.get(0)?),
        name: row.get(1)?,
        creator: parse_col(row, 2)?,
        status: parse_col(row, 3)?,
        total_revenue: row.get::<_, i64>(4)? as u64,
        total_distributed: row.get::<_, i64>(5)? as u64,
        created_at: row.get::<_, i64>(6)? as u64,
    })
}

/// Insert a project.
pub fn insert(conn: &Connection, name: &str, creator: &Address, created_at: u64) -> Result<ProjectId> {
    conn.execute(
        "INSERT INTO projects (name, creator, status, created_at, updated_at)
         VALUES (?1, ?2, 'active', ?3, ?3)",
        rusqlite::params![name, creator.to_string(), created_at as i64],
    )?;
    Ok(ProjectId(conn.last_insert_rowid()))
}

/// Get a project by id.
pub fn get(conn: &Connection, id: ProjectId) -> Result<Project> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM projects WHERE id = ?1"),
        [id.0],
        from_row,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("project {id}")))
}

/// Set a project's lifecycle status.
pub fn set_status(conn: &Connection, id: ProjectId, status: ProjectStatus, now: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE projects SET status = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![status.as_str(), now as i64, id.0],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("project {id}")));
    }
    Ok(())
}

/// Add to a project's cumulative revenue.
pub fn add_revenue(conn: &Connection, id: ProjectId, delta: u64, now: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE projects SET total_revenue = total_revenue + ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![to_sql_amount(delta)?, now as i64, id.0],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("project {id}")));
    }
    Ok(())
}

/// Add to a project's cumulative distributed amount.
///
/// Fails with [`DbError::Constraint`] if the result would exceed the
/// project's total revenue.
pub fn add_distributed(conn: &Connection, id: ProjectId, delta: u64, now: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE projects SET total_distributed = total_distributed + ?1, updated_at = ?2
         WHERE id = ?3",
        rusqlite::params![to_sql_amount(delta)?, now as i64, id.0],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("project {id}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    #[test]
    fn test_insert_and_get() {
        let conn = test_db();
        let id = insert(&conn, "Album", &Address([7u8; 20]), 100).expect("insert");
        let project = get(&conn, id).expect("get");
        assert_eq!(project.name, "Album");
        assert_eq!(project.creator, Address([7u8; 20]));
        assert_eq!(project.status, ProjectStatus::Active);
        assert_eq!(project.total_revenue, 0);
        assert_eq!(project.total_distributed, 0);
    }

    #[test]
    fn test_missing_project() {
        let conn = test_db();
        assert!(matches!(get(&conn, ProjectId(99)), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_totals() {
        let conn = test_db();
        let id = insert(&conn, "Film", &Address([1u8; 20]), 100).expect("insert");
        add_revenue(&conn, id, 1_000, 101).expect("revenue");
        add_distributed(&conn, id, 980, 102).expect("distributed");
        let project = get(&conn, id).expect("get");
        assert_eq!(project.total_revenue, 1_000);
        assert_eq!(project.total_distributed, 980);
    }

    #[test]
    fn test_distributed_cannot_exceed_revenue() {
        let conn = test_db();
        let id = insert(&conn, "Game", &Address([1u8; 20]), 100).expect("insert");
        add_revenue(&conn, id, 100, 101).expect("revenue");
        let result = add_distributed(&conn, id, 101, 102);
        assert!(matches!(result, Err(DbError::Constraint(_))));
    }

    #[test]
    fn test_set_status() {
        let conn = test_db();
        let id = insert(&conn, "Zine", &Address([1u8; 20]), 100).expect("insert");
        set_status(&conn, id, ProjectStatus::Inactive, 101).expect("status");
        assert_eq!(get(&conn, id).expect("get").status, ProjectStatus::Inactive);
    }
}
