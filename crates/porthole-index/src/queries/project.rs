use rusqlite::{params, Connection, OptionalExtension};

use crate::records::ProjectRecord;
use crate::{Database, Result};

/// Insert a project if missing; fill in the working-directory path when it is
/// learned later (the directory name alone does not reveal it).
pub fn upsert(conn: &Connection, id: &str, path: Option<&str>) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO projects (id, path, created_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET
            path = COALESCE(projects.path, ?2)
        "#,
        params![id, path, Database::now()],
    )?;

    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<ProjectRecord>> {
    let result = conn
        .query_row(
            "SELECT id, path, created_at FROM projects WHERE id = ?1",
            [id],
            |row| {
                Ok(ProjectRecord {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(result)
}

pub fn list(conn: &Connection) -> Result<Vec<ProjectRecord>> {
    let mut stmt = conn.prepare("SELECT id, path, created_at FROM projects ORDER BY id")?;

    let projects = stmt
        .query_map([], |row| {
            Ok(ProjectRecord {
                id: row.get(0)?,
                path: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(projects)
}
