use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, new_id, parse_datetime},
    models::{label::validate_color, Label},
};

fn row_to_label(row: &Row) -> Result<Label, rusqlite::Error> {
    let created_at: String = row.get("created_at")?;

    Ok(Label {
        id: row.get("id")?,
        team_id: row.get("team_id")?,
        name: row.get("name")?,
        color: row.get("color")?,
        created_at: parse_datetime(&created_at, "created_at").map_err(conversion_error)?,
    })
}

pub(crate) fn labels_for_team(conn: &Connection, team_id: &str) -> Result<Vec<Label>> {
    let mut stmt = conn.prepare(
        "SELECT id, team_id, name, color, created_at
         FROM labels
         WHERE team_id = ?1
         ORDER BY created_at ASC, name ASC",
    )?;
    let labels = stmt
        .query_map(params![team_id], row_to_label)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(labels)
}

pub(crate) fn insert_label(
    conn: &Connection,
    team_id: &str,
    name: &str,
    color: &str,
) -> Result<Label> {
    validate_color(color)?;

    let label = Label {
        id: new_id(),
        team_id: team_id.to_string(),
        name: name.to_string(),
        color: color.to_string(),
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO labels (id, team_id, name, color, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            label.id,
            label.team_id,
            label.name,
            label.color,
            label.created_at.to_rfc3339(),
        ],
    )?;

    Ok(label)
}

impl Database {
    /// Create a new label for a team. The color must be `#RRGGBB` or `#RRGGBBAA`.
    pub async fn create_label(&self, team_id: &str, name: String, color: String) -> Result<Label> {
        let team_id = team_id.to_string();
        self.execute(move |conn| insert_label(conn, &team_id, &name, &color))
            .await
    }

    /// All labels of a team, oldest first
    pub async fn get_labels(&self, team_id: &str) -> Result<Vec<Label>> {
        let team_id = team_id.to_string();
        self.execute(move |conn| labels_for_team(conn, &team_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::repositories::test_support::seeded_team;
    use crate::db::Database;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_label_validates_color() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("board.sqlite3")).unwrap();
        let seeded = seeded_team(&db).await;

        let before = db.get_labels(&seeded.team.id).await.unwrap().len();
        assert!(db
            .create_label(&seeded.team.id, "Bad".into(), "red".into())
            .await
            .is_err());

        let label = db
            .create_label(&seeded.team.id, "Docs".into(), "#64b5f6".into())
            .await
            .unwrap();
        let labels = db.get_labels(&seeded.team.id).await.unwrap();
        assert_eq!(labels.len(), before + 1);
        assert!(labels.iter().any(|l| l.id == label.id && l.name == "Docs"));
    }
}
