use std::sync::Arc;

use anyhow::Result;

use super::store::{BoardStore, MutationOutcome};
use crate::db::{CardPatch, Priority};

/// Keys the title field reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKey {
    Enter,
    Escape,
}

/// Transient editing state for a single card.
///
/// The title is edited through a draft that is committed on blur or Enter and
/// dropped on Escape. The options menu stays open across selections so several
/// labels can be toggled in one go; only a click outside closes it.
pub struct CardEditor {
    store: Arc<BoardStore>,
    card_id: String,
    editing_title: bool,
    menu_open: bool,
    draft: String,
    original_title: String,
}

impl CardEditor {
    pub fn new(store: Arc<BoardStore>, card_id: impl Into<String>) -> Self {
        Self {
            store,
            card_id: card_id.into(),
            editing_title: false,
            menu_open: false,
            draft: String::new(),
            original_title: String::new(),
        }
    }

    pub fn card_id(&self) -> &str {
        &self.card_id
    }

    pub fn is_editing_title(&self) -> bool {
        self.editing_title
    }

    pub fn is_menu_open(&self) -> bool {
        self.menu_open
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Enter title editing with the card's current title as the draft.
    /// Returns false if the card is no longer on the board.
    pub async fn start_editing(&mut self) -> bool {
        let snapshot = self.store.snapshot().await;
        let Some(card) = snapshot.card(&self.card_id) else {
            return false;
        };
        self.original_title = card.title.clone();
        self.draft = card.title.clone();
        self.editing_title = true;
        true
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        if self.editing_title {
            self.draft = text.into();
        }
    }

    pub async fn key(&mut self, key: EditKey) -> Result<MutationOutcome> {
        match key {
            EditKey::Enter => self.commit().await,
            EditKey::Escape => {
                self.revert();
                Ok(MutationOutcome::Skipped)
            }
        }
    }

    pub async fn blur(&mut self) -> Result<MutationOutcome> {
        self.commit().await
    }

    async fn commit(&mut self) -> Result<MutationOutcome> {
        if !self.editing_title {
            return Ok(MutationOutcome::Skipped);
        }

        let title = self.draft.trim().to_string();
        if title.is_empty() || title == self.original_title {
            self.revert();
            return Ok(MutationOutcome::Skipped);
        }

        self.editing_title = false;
        self.draft.clear();
        self.store
            .update_card(&self.card_id, CardPatch::title(title))
            .await
    }

    fn revert(&mut self) {
        self.editing_title = false;
        self.draft = std::mem::take(&mut self.original_title);
    }

    pub fn open_menu(&mut self) {
        self.menu_open = true;
    }

    pub fn toggle_menu(&mut self) {
        self.menu_open = !self.menu_open;
    }

    pub fn outside_click(&mut self) {
        self.menu_open = false;
    }

    pub async fn select_priority(&mut self, priority: Priority) -> Result<MutationOutcome> {
        self.store.set_priority(&self.card_id, priority).await
    }

    pub async fn select_assignee(&mut self, assignee_id: Option<String>) -> Result<MutationOutcome> {
        self.store.assign(&self.card_id, assignee_id).await
    }

    pub async fn toggle_label(&mut self, label_id: &str) -> Result<MutationOutcome> {
        self.store.toggle_label(&self.card_id, label_id).await
    }
}
