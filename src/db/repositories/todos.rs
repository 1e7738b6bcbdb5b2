use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, new_id, parse_datetime},
    models::TodoItem,
};

fn row_to_todo(row: &Row) -> Result<TodoItem, rusqlite::Error> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(TodoItem {
        id: row.get("id")?,
        team_id: row.get("team_id")?,
        text: row.get("text")?,
        completed: row.get("completed")?,
        created_at: parse_datetime(&created_at, "created_at").map_err(conversion_error)?,
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(conversion_error)?,
    })
}

impl Database {
    pub async fn list_todos(&self, team_id: &str) -> Result<Vec<TodoItem>> {
        let team_id = team_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, team_id, text, completed, created_at, updated_at
                 FROM todos
                 WHERE team_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let todos = stmt
                .query_map(params![team_id], row_to_todo)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(todos)
        })
        .await
    }

    pub async fn add_todo(&self, team_id: &str, text: String) -> Result<TodoItem> {
        let now = Utc::now();
        let todo = TodoItem {
            id: new_id(),
            team_id: team_id.to_string(),
            text,
            completed: false,
            created_at: now,
            updated_at: now,
        };

        let record = todo.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO todos (id, team_id, text, completed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                params![
                    record.id,
                    record.team_id,
                    record.text,
                    record.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?;

        Ok(todo)
    }

    pub async fn toggle_todo(&self, todo_id: &str, completed: bool) -> Result<TodoItem> {
        let todo_id = todo_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE todos SET completed = ?1, updated_at = ?2 WHERE id = ?3",
                params![completed, Utc::now().to_rfc3339(), todo_id],
            )?;
            if rows_affected == 0 {
                return Err(anyhow!("todo {todo_id} not found"));
            }

            conn.query_row(
                "SELECT id, team_id, text, completed, created_at, updated_at
                 FROM todos
                 WHERE id = ?1",
                params![todo_id],
                row_to_todo,
            )
            .optional()?
            .ok_or_else(|| anyhow!("todo {todo_id} not found after update"))
        })
        .await
    }

    pub async fn delete_todo(&self, todo_id: &str) -> Result<()> {
        let todo_id = todo_id.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM todos WHERE id = ?1", params![todo_id])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::repositories::test_support::seeded_team;
    use crate::db::Database;
    use tempfile::TempDir;

    #[tokio::test]
    async fn todo_lifecycle() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("board.sqlite3")).unwrap();
        let seeded = seeded_team(&db).await;

        let first = db.add_todo(&seeded.team.id, "Write docs".into()).await.unwrap();
        let second = db.add_todo(&seeded.team.id, "Ship".into()).await.unwrap();
        assert!(!first.completed);

        let toggled = db.toggle_todo(&first.id, true).await.unwrap();
        assert!(toggled.completed);

        let todos = db.list_todos(&seeded.team.id).await.unwrap();
        let ids: Vec<&str> = todos.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);

        db.delete_todo(&first.id).await.unwrap();
        assert_eq!(db.list_todos(&seeded.team.id).await.unwrap().len(), 1);
        assert!(db.toggle_todo(&first.id, false).await.is_err());
    }
}
