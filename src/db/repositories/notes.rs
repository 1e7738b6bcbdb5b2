use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::{connection::Database, helpers::new_id};

impl Database {
    /// Team notes content; empty when the team has never saved any.
    pub async fn get_notes(&self, team_id: &str) -> Result<String> {
        let team_id = team_id.to_string();
        self.execute(move |conn| {
            let content: Option<String> = conn
                .query_row(
                    "SELECT content FROM notes WHERE team_id = ?1",
                    params![team_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(content.unwrap_or_default())
        })
        .await
    }

    pub async fn update_notes(&self, team_id: &str, content: String) -> Result<()> {
        let team_id = team_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO notes (id, team_id, content, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(team_id) DO UPDATE SET
                     content = excluded.content,
                     updated_at = excluded.updated_at",
                params![new_id(), team_id, content, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }
}
