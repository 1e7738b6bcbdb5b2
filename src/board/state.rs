use serde::Serialize;

use crate::db::{BoardData, Card, Column, Label};

/// In-memory projection of one team's board.
///
/// Every mutation returns a new value; the store swaps whole snapshots so a
/// reader never sees a half-applied change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    pub team_id: Option<String>,
    pub columns: Vec<Column>,
    pub labels: Vec<Label>,
}

impl BoardState {
    pub fn from_data(team_id: &str, data: BoardData) -> Self {
        Self {
            team_id: Some(team_id.to_string()),
            columns: data.columns,
            labels: data.labels,
        }
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn column_index(&self, column_id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == column_id)
    }

    /// Column index and card index of a card.
    pub fn find_card(&self, card_id: &str) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(col_idx, column)| {
            column
                .cards
                .iter()
                .position(|card| card.id == card_id)
                .map(|card_idx| (col_idx, card_idx))
        })
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.find_card(card_id)
            .map(|(col_idx, card_idx)| &self.columns[col_idx].cards[card_idx])
    }

    /// Card ids of a column in display order.
    pub fn card_ids(&self, column_id: &str) -> Vec<String> {
        self.column(column_id)
            .map(|column| column.cards.iter().map(|card| card.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn card_count(&self) -> usize {
        self.columns.iter().map(|column| column.cards.len()).sum()
    }

    pub fn with_card_appended(&self, card: Card) -> Self {
        let mut next = self.clone();
        if let Some(column) = next.columns.iter_mut().find(|c| c.id == card.column_id) {
            column.cards.push(card);
        }
        next
    }

    /// Replace a card's fields in place. Column membership and ordering stay
    /// as they are locally.
    pub fn with_card_replaced(&self, card: Card) -> Self {
        let mut next = self.clone();
        if let Some((col_idx, card_idx)) = next.find_card(&card.id) {
            let slot = &mut next.columns[col_idx].cards[card_idx];
            let column_id = std::mem::take(&mut slot.column_id);
            let position = slot.position;
            *slot = Card {
                column_id,
                position,
                ..card
            };
        }
        next
    }

    pub fn with_card_edited(&self, card_id: &str, edit: impl FnOnce(&mut Card)) -> Self {
        let mut next = self.clone();
        if let Some((col_idx, card_idx)) = next.find_card(card_id) {
            edit(&mut next.columns[col_idx].cards[card_idx]);
        }
        next
    }

    pub fn without_card(&self, card_id: &str) -> Self {
        let mut next = self.clone();
        for column in &mut next.columns {
            column.cards.retain(|card| card.id != card_id);
        }
        next
    }

    pub fn with_label(&self, card_id: &str, label_id: &str, present: bool) -> Self {
        self.with_card_edited(card_id, |card| {
            if present {
                card.labels.insert(label_id.to_string());
            } else {
                card.labels.remove(label_id);
            }
        })
    }
}
