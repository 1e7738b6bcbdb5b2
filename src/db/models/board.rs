//! Kanban board data models.
//!
//! `Column` and `Card` mirror the `columns` / `cards` tables; a card's label
//! set is resolved from `card_labels` when the board is fetched.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Label;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
    #[default]
    None,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::High, Self::Medium, Self::Low, Self::None];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::None => "none",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            "none" => Ok(Priority::None),
            other => Err(anyhow::anyhow!("unknown priority '{other}'")),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub column_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub assignee_id: Option<String>,
    pub position: i64,
    pub labels: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn has_label(&self, label_id: &str) -> bool {
        self.labels.contains(label_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub team_id: String,
    pub title: String,
    pub position: i64,
    pub cards: Vec<Card>,
}

/// Fields a generic card update may touch. Column membership and position are
/// deliberately absent; those only change through a move.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    /// `Some(None)` unassigns the card.
    pub assignee_id: Option<Option<String>>,
}

impl CardPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Self::default()
        }
    }

    pub fn assignee(assignee_id: Option<String>) -> Self {
        Self {
            assignee_id: Some(assignee_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.assignee_id.is_none()
    }

    pub fn apply_to(&self, card: &mut Card) {
        if let Some(title) = &self.title {
            card.title = title.clone();
        }
        if let Some(description) = &self.description {
            card.description = description.clone();
        }
        if let Some(priority) = self.priority {
            card.priority = priority;
        }
        if let Some(assignee_id) = &self.assignee_id {
            card.assignee_id = assignee_id.clone();
        }
    }
}

/// Everything `fetch_board` returns for one team.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BoardData {
    pub columns: Vec<Column>,
    pub labels: Vec<Label>,
}
