use anyhow::{bail, Result};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::board::MutationOutcome;
use crate::db::{Database, TodoItem};
use crate::{log_error, log_warn};

const ENABLE_LOGS: bool = true;

/// A team's shared todo list.
///
/// Toggles and deletes are shown immediately; adds wait for the stored row.
/// Any failed write reloads the list from the database.
pub struct TodoList {
    db: Database,
    team_id: String,
    items: Mutex<Vec<TodoItem>>,
    interest: CancellationToken,
}

impl TodoList {
    pub fn new(db: Database, team_id: impl Into<String>) -> Self {
        Self {
            db,
            team_id: team_id.into(),
            items: Mutex::new(Vec::new()),
            interest: CancellationToken::new(),
        }
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub async fn items(&self) -> Vec<TodoItem> {
        self.items.lock().await.clone()
    }

    pub async fn load(&self) -> Result<()> {
        let todos = self.db.list_todos(&self.team_id).await?;
        if !self.interest.is_cancelled() {
            *self.items.lock().await = todos;
        }
        Ok(())
    }

    pub async fn add(&self, text: &str) -> Result<MutationOutcome> {
        self.ensure_live()?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(MutationOutcome::Skipped);
        }

        match self.db.add_todo(&self.team_id, text.to_string()).await {
            Ok(todo) => {
                if self.interest.is_cancelled() {
                    return Ok(MutationOutcome::Discarded);
                }
                self.items.lock().await.push(todo);
                Ok(MutationOutcome::Applied)
            }
            Err(err) => Ok(self.reconcile("add todo", &err).await),
        }
    }

    /// Flip a todo's completion flag. Unknown ids are skipped.
    pub async fn toggle(&self, todo_id: &str) -> Result<MutationOutcome> {
        self.ensure_live()?;

        let completed = {
            let mut items = self.items.lock().await;
            let Some(item) = items.iter_mut().find(|item| item.id == todo_id) else {
                return Ok(MutationOutcome::Skipped);
            };
            item.completed = !item.completed;
            item.completed
        };

        match self.db.toggle_todo(todo_id, completed).await {
            Ok(stored) => {
                if self.interest.is_cancelled() {
                    return Ok(MutationOutcome::Discarded);
                }
                let mut items = self.items.lock().await;
                if let Some(item) = items.iter_mut().find(|item| item.id == stored.id) {
                    *item = stored;
                }
                Ok(MutationOutcome::Applied)
            }
            Err(err) => Ok(self.reconcile("toggle todo", &err).await),
        }
    }

    pub async fn delete(&self, todo_id: &str) -> Result<MutationOutcome> {
        self.ensure_live()?;
        self.items.lock().await.retain(|item| item.id != todo_id);

        match self.db.delete_todo(todo_id).await {
            Ok(()) if self.interest.is_cancelled() => Ok(MutationOutcome::Discarded),
            Ok(()) => Ok(MutationOutcome::Applied),
            Err(err) => Ok(self.reconcile("delete todo", &err).await),
        }
    }

    pub async fn teardown(&self) {
        self.interest.cancel();
        self.items.lock().await.clear();
    }

    fn ensure_live(&self) -> Result<()> {
        if self.interest.is_cancelled() {
            bail!("todo list for team {} has been torn down", self.team_id);
        }
        Ok(())
    }

    async fn reconcile(&self, action: &str, err: &anyhow::Error) -> MutationOutcome {
        log_error!("Failed to {} for team {}: {:?}", action, self.team_id, err);
        if self.interest.is_cancelled() {
            return MutationOutcome::Discarded;
        }
        log_warn!("Reloading todos for team {}", self.team_id);
        if let Err(reload_err) = self.load().await {
            log_error!("Reloading todos failed: {:?}", reload_err);
        }
        MutationOutcome::Reconciled
    }
}
