use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::records::{AgentLinkRecord, ToolResultLinkRecord};
use crate::Result;

pub fn insert_tool_result_links(
    conn: &Connection,
    links: &[ToolResultLinkRecord],
) -> Result<()> {
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO tool_result_links
            (session_id, tool_use_line_num, tool_result_line_num, tool_use_id)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(session_id, tool_use_id, tool_result_line_num) DO NOTHING
        "#,
    )?;

    for link in links {
        stmt.execute(params![
            &link.session_id,
            link.tool_use_line_num,
            link.tool_result_line_num,
            &link.tool_use_id,
        ])?;
    }

    Ok(())
}

pub fn tool_result_links(conn: &Connection, session_id: &str) -> Result<Vec<ToolResultLinkRecord>> {
    let mut stmt = conn.prepare(
        "SELECT session_id, tool_use_line_num, tool_result_line_num, tool_use_id \
         FROM tool_result_links WHERE session_id = ?1 \
         ORDER BY tool_result_line_num",
    )?;

    let links = stmt
        .query_map([session_id], |row| {
            Ok(ToolResultLinkRecord {
                session_id: row.get(0)?,
                tool_use_line_num: row.get(1)?,
                tool_result_line_num: row.get(2)?,
                tool_use_id: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(links)
}

pub fn delete_tool_result_links(conn: &Connection, session_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM tool_result_links WHERE session_id = ?1",
        [session_id],
    )?;

    Ok(())
}

fn agent_link_from_row(row: &Row) -> rusqlite::Result<AgentLinkRecord> {
    Ok(AgentLinkRecord {
        session_id: row.get(0)?,
        tool_use_line_num: row.get(1)?,
        tool_use_id: row.get(2)?,
        prompt: row.get(3)?,
        agent_id: row.get(4)?,
    })
}

const AGENT_COLUMNS: &str = "session_id, tool_use_line_num, tool_use_id, prompt, agent_id";

/// Register a Task tool_use the moment it is seen; the agent id arrives later
/// when the subagent session materializes.
pub fn register_task(
    conn: &Connection,
    session_id: &str,
    tool_use_line_num: i64,
    tool_use_id: &str,
    prompt: Option<&str>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO agent_links (session_id, tool_use_line_num, tool_use_id, prompt)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(session_id, tool_use_id) DO NOTHING
        "#,
        params![session_id, tool_use_line_num, tool_use_id, prompt],
    )?;

    Ok(())
}

pub fn set_agent_id(
    conn: &Connection,
    session_id: &str,
    tool_use_id: &str,
    agent_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE agent_links SET agent_id = ?3 WHERE session_id = ?1 AND tool_use_id = ?2",
        params![session_id, tool_use_id, agent_id],
    )?;

    Ok(())
}

pub fn find_by_agent_id(conn: &Connection, agent_id: &str) -> Result<Option<AgentLinkRecord>> {
    let query = format!(
        "SELECT {} FROM agent_links WHERE agent_id = ?1 LIMIT 1",
        AGENT_COLUMNS
    );

    let link = conn
        .query_row(&query, [agent_id], agent_link_from_row)
        .optional()?;

    Ok(link)
}

/// Fallback matching when the journal never surfaced an agent id for the Task:
/// the subagent's opening prompt equals the registered Task prompt.
pub fn find_unclaimed_by_prompt(
    conn: &Connection,
    prompt: &str,
) -> Result<Option<AgentLinkRecord>> {
    let query = format!(
        "SELECT {} FROM agent_links \
         WHERE agent_id IS NULL AND prompt = ?1 \
         ORDER BY tool_use_line_num LIMIT 1",
        AGENT_COLUMNS
    );

    let link = conn
        .query_row(&query, [prompt], agent_link_from_row)
        .optional()?;

    Ok(link)
}

pub fn agent_links(conn: &Connection, session_id: &str) -> Result<Vec<AgentLinkRecord>> {
    let query = format!(
        "SELECT {} FROM agent_links WHERE session_id = ?1 ORDER BY tool_use_line_num",
        AGENT_COLUMNS
    );

    let mut stmt = conn.prepare(&query)?;
    let links = stmt
        .query_map([session_id], agent_link_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn parallel_tasks_on_one_line_stay_distinct() {
        let db = Database::open_in_memory().unwrap();

        register_task(db.conn(), "s1", 4, "toolu_A", Some("explore src")).unwrap();
        register_task(db.conn(), "s1", 4, "toolu_B", Some("explore tests")).unwrap();

        set_agent_id(db.conn(), "s1", "toolu_B", "ag2").unwrap();

        let by_agent = find_by_agent_id(db.conn(), "ag2").unwrap().unwrap();
        assert_eq!(by_agent.tool_use_id, "toolu_B");

        let unclaimed = find_unclaimed_by_prompt(db.conn(), "explore src")
            .unwrap()
            .unwrap();
        assert_eq!(unclaimed.tool_use_id, "toolu_A");
    }

    #[test]
    fn tool_result_links_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let link = ToolResultLinkRecord {
            session_id: "s1".into(),
            tool_use_line_num: 2,
            tool_result_line_num: 3,
            tool_use_id: "toolu_X".into(),
        };

        insert_tool_result_links(db.conn(), &[link.clone()]).unwrap();
        insert_tool_result_links(db.conn(), &[link.clone()]).unwrap();

        let links = tool_result_links(db.conn(), "s1").unwrap();
        assert_eq!(links, vec![link]);
    }
}
