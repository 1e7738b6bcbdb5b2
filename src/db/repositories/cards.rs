use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use chrono::Utc;
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, new_id, parse_datetime, parse_priority},
    models::{BoardData, Card, CardPatch, Column},
    repositories::labels::labels_for_team,
};
use crate::error::GatewayError;

const CARD_FIELDS: &str =
    "id, column_id, title, description, priority, assignee_id, position, created_at, updated_at";

fn row_to_card(row: &Row) -> Result<Card, rusqlite::Error> {
    let priority: String = row.get("priority")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Card {
        id: row.get("id")?,
        column_id: row.get("column_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        priority: parse_priority(&priority).map_err(conversion_error)?,
        assignee_id: row.get("assignee_id")?,
        position: row.get("position")?,
        labels: BTreeSet::new(),
        created_at: parse_datetime(&created_at, "created_at").map_err(conversion_error)?,
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(conversion_error)?,
    })
}

fn column_exists(conn: &Connection, column_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM columns WHERE id = ?1",
            params![column_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn labels_for_card(conn: &Connection, card_id: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT label_id FROM card_labels WHERE card_id = ?1")?;
    let labels = stmt
        .query_map(params![card_id], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(labels)
}

fn load_card(conn: &Connection, card_id: &str) -> Result<Option<Card>> {
    let mut stmt = conn.prepare(&format!("SELECT {CARD_FIELDS} FROM cards WHERE id = ?1"))?;
    let card = stmt.query_row(params![card_id], row_to_card).optional()?;

    match card {
        Some(mut card) => {
            card.labels = labels_for_card(conn, &card.id)?;
            Ok(Some(card))
        }
        None => Ok(None),
    }
}

/// Renumbers every column of the team so card positions run 0..n-1 in their
/// current order. Returns the number of rows rewritten.
fn compact_positions(conn: &Connection, team_id: &str) -> Result<usize> {
    let column_ids: Vec<String> = conn
        .prepare("SELECT id FROM columns WHERE team_id = ?1")?
        .query_map(params![team_id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut rewritten = 0;
    for column_id in column_ids {
        let mut stmt = conn.prepare(
            "SELECT id, position FROM cards
             WHERE column_id = ?1
             ORDER BY position ASC, created_at ASC, id ASC",
        )?;
        let rows: Vec<(String, i64)> = stmt
            .query_map(params![column_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        for (index, (card_id, position)) in rows.into_iter().enumerate() {
            let index = index as i64;
            if position != index {
                conn.execute(
                    "UPDATE cards SET position = ?1 WHERE id = ?2",
                    params![index, card_id],
                )?;
                rewritten += 1;
            }
        }
    }

    Ok(rewritten)
}

impl Database {
    /// Fetch the full board for a team: columns by position, each with its cards
    /// by position and every card's label set.
    ///
    /// Positions are compacted to 0..n-1 per column (and persisted) before the
    /// read, so callers always see dense positions.
    pub async fn fetch_board(&self, team_id: &str) -> Result<BoardData> {
        let team_id = team_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let rewritten = compact_positions(&tx, &team_id)?;
            if rewritten > 0 {
                info!("Compacted {rewritten} card positions for team {team_id}");
            }

            let mut columns: Vec<Column> = {
                let mut stmt = tx.prepare(
                    "SELECT id, team_id, title, position FROM columns
                     WHERE team_id = ?1
                     ORDER BY position ASC, created_at ASC",
                )?;
                let columns = stmt
                    .query_map(params![team_id], |row| {
                        Ok(Column {
                            id: row.get(0)?,
                            team_id: row.get(1)?,
                            title: row.get(2)?,
                            position: row.get(3)?,
                            cards: Vec::new(),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                columns
            };

            let mut labels_by_card: HashMap<String, BTreeSet<String>> = HashMap::new();
            {
                let mut stmt = tx.prepare(
                    "SELECT cl.card_id, cl.label_id
                     FROM card_labels cl
                     JOIN cards c ON c.id = cl.card_id
                     JOIN columns col ON col.id = c.column_id
                     WHERE col.team_id = ?1",
                )?;
                let mut rows = stmt.query(params![team_id])?;
                while let Some(row) = rows.next()? {
                    let card_id: String = row.get(0)?;
                    let label_id: String = row.get(1)?;
                    labels_by_card.entry(card_id).or_default().insert(label_id);
                }
            }

            {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {CARD_FIELDS} FROM cards
                     WHERE column_id = ?1
                     ORDER BY position ASC, created_at ASC, id ASC"
                ))?;
                for column in &mut columns {
                    let mut cards = stmt
                        .query_map(params![column.id], row_to_card)?
                        .collect::<Result<Vec<_>, _>>()?;
                    for card in &mut cards {
                        card.labels = labels_by_card.remove(&card.id).unwrap_or_default();
                    }
                    column.cards = cards;
                }
            }

            let labels = labels_for_team(&tx, &team_id)?;

            tx.commit()?;
            Ok(BoardData { columns, labels })
        })
        .await
    }

    /// Append a new card at the end of a column.
    pub async fn insert_card(&self, column_id: &str, title: String) -> Result<Card> {
        let column_id = column_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            if !column_exists(&tx, &column_id)? {
                return Err(GatewayError::ColumnNotFound { id: column_id }.into());
            }

            let next_position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM cards WHERE column_id = ?1",
                params![column_id],
                |row| row.get(0),
            )?;

            let id = new_id();
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO cards (id, column_id, title, priority, position, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'none', ?4, ?5, ?5)",
                params![id, column_id, title, next_position, now],
            )?;

            let card = load_card(&tx, &id)?
                .ok_or_else(|| anyhow::anyhow!("Card not found after insert"))?;
            tx.commit()?;
            Ok(card)
        })
        .await
    }

    /// Apply a patch to a card's editable fields.
    pub async fn update_card(&self, card_id: &str, patch: CardPatch) -> Result<Card> {
        let card_id = card_id.to_string();
        self.execute(move |conn| {
            // Build update query dynamically based on what's being updated
            let mut updates = Vec::new();
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(title) = patch.title {
                updates.push("title = ?");
                params_vec.push(Box::new(title));
            }
            if let Some(description) = patch.description {
                updates.push("description = ?");
                params_vec.push(Box::new(description));
            }
            if let Some(priority) = patch.priority {
                updates.push("priority = ?");
                params_vec.push(Box::new(priority.as_str()));
            }
            if let Some(assignee_id) = patch.assignee_id {
                updates.push("assignee_id = ?");
                params_vec.push(Box::new(assignee_id));
            }

            if !updates.is_empty() {
                updates.push("updated_at = ?");
                params_vec.push(Box::new(Utc::now().to_rfc3339()));

                let query = format!("UPDATE cards SET {} WHERE id = ?", updates.join(", "));
                params_vec.push(Box::new(card_id.clone()));

                let params_refs: Vec<&dyn rusqlite::ToSql> =
                    params_vec.iter().map(|b| b.as_ref()).collect();

                let rows_affected = conn.execute(&query, params_refs.as_slice())?;
                if rows_affected == 0 {
                    return Err(GatewayError::CardNotFound { id: card_id }.into());
                }
            }

            match load_card(conn, &card_id)? {
                Some(card) => Ok(card),
                None => Err(GatewayError::CardNotFound { id: card_id }.into()),
            }
        })
        .await
    }

    /// Delete a card; its label associations cascade.
    pub async fn delete_card(&self, card_id: &str) -> Result<()> {
        let card_id = card_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute("DELETE FROM cards WHERE id = ?1", params![card_id])?;
            if rows_affected == 0 {
                return Err(GatewayError::CardNotFound { id: card_id }.into());
            }
            Ok(())
        })
        .await
    }

    /// Reassign one card's column and position. The card must currently live in
    /// `from_column_id`; sibling positions are not touched here.
    pub async fn move_card(
        &self,
        card_id: &str,
        from_column_id: &str,
        to_column_id: &str,
        new_position: i64,
    ) -> Result<()> {
        let card_id = card_id.to_string();
        let from_column_id = from_column_id.to_string();
        let to_column_id = to_column_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            if !column_exists(&tx, &to_column_id)? {
                return Err(GatewayError::ColumnNotFound { id: to_column_id }.into());
            }

            let current_column: Option<String> = tx
                .query_row(
                    "SELECT column_id FROM cards WHERE id = ?1",
                    params![card_id],
                    |row| row.get(0),
                )
                .optional()?;

            match current_column {
                None => return Err(GatewayError::CardNotFound { id: card_id }.into()),
                Some(column_id) if column_id != from_column_id => {
                    return Err(GatewayError::CardNotInColumn {
                        card_id,
                        column_id: from_column_id,
                    }
                    .into());
                }
                Some(_) => {}
            }

            tx.execute(
                "UPDATE cards
                 SET column_id = ?1,
                     position = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![to_column_id, new_position, Utc::now().to_rfc3339(), card_id],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Add (`present = true`) or remove a label from a card. Idempotent.
    pub async fn set_card_label(&self, card_id: &str, label_id: &str, present: bool) -> Result<()> {
        let card_id = card_id.to_string();
        let label_id = label_id.to_string();
        self.execute(move |conn| {
            let card_team: Option<String> = conn
                .query_row(
                    "SELECT col.team_id
                     FROM cards c
                     JOIN columns col ON col.id = c.column_id
                     WHERE c.id = ?1",
                    params![card_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(team_id) = card_team else {
                return Err(GatewayError::CardNotFound { id: card_id }.into());
            };

            // Labels belong to a team; another team's label counts as missing.
            let label_found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM labels WHERE id = ?1 AND team_id = ?2",
                    params![label_id, team_id],
                    |row| row.get(0),
                )
                .optional()?;
            if label_found.is_none() {
                return Err(GatewayError::LabelNotFound { id: label_id }.into());
            }

            if present {
                conn.execute(
                    "INSERT OR IGNORE INTO card_labels (card_id, label_id) VALUES (?1, ?2)",
                    params![card_id, label_id],
                )?;
            } else {
                conn.execute(
                    "DELETE FROM card_labels WHERE card_id = ?1 AND label_id = ?2",
                    params![card_id, label_id],
                )?;
            }

            Ok(())
        })
        .await
    }

    pub async fn get_card_labels(&self, card_id: &str) -> Result<BTreeSet<String>> {
        let card_id = card_id.to_string();
        self.execute(move |conn| labels_for_card(conn, &card_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Priority;
    use crate::db::repositories::test_support::{seeded_team, SeededTeam};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database, SeededTeam) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("board.sqlite3")).unwrap();
        let seeded = seeded_team(&db).await;
        (temp, db, seeded)
    }

    #[tokio::test]
    async fn added_card_lands_last_with_defaults() {
        let (_temp, db, seeded) = setup().await;
        let todo = &seeded.columns[0];

        db.insert_card(todo, "First".into()).await.unwrap();
        let card = db.insert_card(todo, "X".into()).await.unwrap();

        assert_eq!(card.title, "X");
        assert_eq!(card.priority, Priority::None);
        assert!(card.labels.is_empty());
        assert_eq!(card.position, 1);

        let board = db.fetch_board(&seeded.team.id).await.unwrap();
        let column = board.columns.iter().find(|c| &c.id == todo).unwrap();
        let last = column.cards.last().unwrap();
        assert_eq!(last.id, card.id);
        assert_eq!(last.title, "X");
        assert_eq!(last.priority, Priority::None);
        assert!(last.labels.is_empty());
    }

    #[tokio::test]
    async fn insert_into_missing_column_is_typed() {
        let (_temp, db, _seeded) = setup().await;
        let err = db.insert_card("nope", "X".into()).await.unwrap_err();
        assert!(matches!(
            GatewayError::from_storage(err),
            GatewayError::ColumnNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn fetch_orders_columns_and_cards_by_position() {
        let (_temp, db, seeded) = setup().await;
        let board = db.fetch_board(&seeded.team.id).await.unwrap();
        let titles: Vec<&str> = board.columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["To Do", "In Progress", "Done"]);

        let col = &seeded.columns[1];
        let a = db.insert_card(col, "A".into()).await.unwrap();
        let b = db.insert_card(col, "B".into()).await.unwrap();
        db.move_card(&b.id, col, col, -5).await.unwrap();

        let board = db.fetch_board(&seeded.team.id).await.unwrap();
        let cards: Vec<&str> = board.columns[1].cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(cards, vec![b.id.as_str(), a.id.as_str()]);
    }

    #[tokio::test]
    async fn fetch_compacts_gaps_and_persists_them() {
        let (_temp, db, seeded) = setup().await;
        let col = &seeded.columns[0];
        let a = db.insert_card(col, "A".into()).await.unwrap();
        let b = db.insert_card(col, "B".into()).await.unwrap();
        let c = db.insert_card(col, "C".into()).await.unwrap();
        db.delete_card(&b.id).await.unwrap();
        db.move_card(&c.id, col, col, 40).await.unwrap();

        let board = db.fetch_board(&seeded.team.id).await.unwrap();
        let positions: Vec<(String, i64)> = board.columns[0]
            .cards
            .iter()
            .map(|card| (card.id.clone(), card.position))
            .collect();
        assert_eq!(positions, vec![(a.id.clone(), 0), (c.id.clone(), 1)]);

        let stored: i64 = db
            .execute({
                let id = c.id.clone();
                move |conn| {
                    Ok(conn.query_row(
                        "SELECT position FROM cards WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )?)
                }
            })
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn update_touches_only_patched_fields() {
        let (_temp, db, seeded) = setup().await;
        let card = db.insert_card(&seeded.columns[0], "Draft".into()).await.unwrap();

        let updated = db
            .update_card(
                &card.id,
                CardPatch {
                    priority: Some(Priority::High),
                    assignee_id: Some(Some(seeded.owner.id.clone())),
                    ..CardPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Draft");
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.assignee_id.as_deref(), Some(seeded.owner.id.as_str()));
        assert_eq!(updated.position, card.position);
        assert_eq!(updated.column_id, card.column_id);

        let cleared = db
            .update_card(&card.id, CardPatch::assignee(None))
            .await
            .unwrap();
        assert_eq!(cleared.assignee_id, None);
    }

    #[tokio::test]
    async fn update_missing_card_is_typed() {
        let (_temp, db, _seeded) = setup().await;
        let err = db.update_card("ghost", CardPatch::title("x")).await.unwrap_err();
        assert!(matches!(
            GatewayError::from_storage(err),
            GatewayError::CardNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn move_requires_card_in_source_column() {
        let (_temp, db, seeded) = setup().await;
        let card = db.insert_card(&seeded.columns[0], "A".into()).await.unwrap();

        let err = db
            .move_card(&card.id, &seeded.columns[1], &seeded.columns[2], 0)
            .await
            .unwrap_err();
        assert!(matches!(
            GatewayError::from_storage(err),
            GatewayError::CardNotInColumn { .. }
        ));

        let err = db
            .move_card(&card.id, &seeded.columns[0], "missing", 0)
            .await
            .unwrap_err();
        assert!(matches!(
            GatewayError::from_storage(err),
            GatewayError::ColumnNotFound { .. }
        ));

        db.move_card(&card.id, &seeded.columns[0], &seeded.columns[2], 0)
            .await
            .unwrap();
        let board = db.fetch_board(&seeded.team.id).await.unwrap();
        assert!(board.columns[0].cards.is_empty());
        assert_eq!(board.columns[2].cards[0].id, card.id);
        assert_eq!(board.columns[2].cards[0].column_id, seeded.columns[2]);
    }

    #[tokio::test]
    async fn label_toggles_are_idempotent_and_cascade_on_delete() {
        let (_temp, db, seeded) = setup().await;
        let card = db.insert_card(&seeded.columns[0], "A".into()).await.unwrap();
        let label = &seeded.labels[0];

        db.set_card_label(&card.id, label, true).await.unwrap();
        db.set_card_label(&card.id, label, true).await.unwrap();
        assert_eq!(db.get_card_labels(&card.id).await.unwrap().len(), 1);

        db.set_card_label(&card.id, label, false).await.unwrap();
        assert!(db.get_card_labels(&card.id).await.unwrap().is_empty());

        db.set_card_label(&card.id, label, true).await.unwrap();
        db.delete_card(&card.id).await.unwrap();
        let remaining: i64 = db
            .execute(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM card_labels", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(remaining, 0);

        let err = db.set_card_label(&card.id, label, true).await.unwrap_err();
        assert!(matches!(
            GatewayError::from_storage(err),
            GatewayError::CardNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn labels_from_another_team_are_rejected() {
        let (_temp, db, seeded) = setup().await;
        let card = db.insert_card(&seeded.columns[0], "A".into()).await.unwrap();

        let other = db.create_team("Other".into(), &seeded.owner.id).await.unwrap();
        let foreign = db.get_labels(&other.id).await.unwrap()[0].id.clone();

        let err = db.set_card_label(&card.id, &foreign, true).await.unwrap_err();
        assert!(matches!(
            GatewayError::from_storage(err),
            GatewayError::LabelNotFound { ref id } if id == &foreign
        ));
        assert!(db.get_card_labels(&card.id).await.unwrap().is_empty());
    }
}
