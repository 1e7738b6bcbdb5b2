use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};

use crate::db::{connection::Database, helpers::new_id, models::Column};

pub(crate) fn insert_column(conn: &Connection, team_id: &str, title: &str) -> Result<Column> {
    let position: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM columns WHERE team_id = ?1",
        params![team_id],
        |row| row.get(0),
    )?;

    let column = Column {
        id: new_id(),
        team_id: team_id.to_string(),
        title: title.to_string(),
        position,
        cards: Vec::new(),
    };

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO columns (id, team_id, title, position, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![column.id, column.team_id, column.title, column.position, now],
    )?;

    Ok(column)
}

impl Database {
    /// Append a column to the right end of a team's board.
    pub async fn create_column(&self, team_id: &str, title: String) -> Result<Column> {
        let team_id = team_id.to_string();
        self.execute(move |conn| insert_column(conn, &team_id, &title))
            .await
    }
}
