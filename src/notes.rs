use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::{log_error, log_info};

const ENABLE_LOGS: bool = true;

/// Team notes with debounced autosave.
///
/// Every edit restarts the timer; only the latest content is written once the
/// timer runs out.
pub struct NotesPad {
    db: Database,
    team_id: String,
    debounce: Duration,
    content: Mutex<String>,
    unsaved: Arc<Mutex<Option<String>>>,
    save_task: Mutex<Option<JoinHandle<()>>>,
    cancel_token: CancellationToken,
}

impl NotesPad {
    pub fn new(db: Database, team_id: impl Into<String>, debounce: Duration) -> Self {
        Self {
            db,
            team_id: team_id.into(),
            debounce,
            content: Mutex::new(String::new()),
            unsaved: Arc::new(Mutex::new(None)),
            save_task: Mutex::new(None),
            cancel_token: CancellationToken::new(),
        }
    }

    pub async fn load(&self) -> Result<()> {
        let content = self.db.get_notes(&self.team_id).await?;
        *self.content.lock().await = content;
        Ok(())
    }

    pub async fn content(&self) -> String {
        self.content.lock().await.clone()
    }

    pub async fn has_unsaved_changes(&self) -> bool {
        self.unsaved.lock().await.is_some()
    }

    pub async fn edit(&self, text: impl Into<String>) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        let text = text.into();
        *self.content.lock().await = text.clone();
        *self.unsaved.lock().await = Some(text);

        let mut task = self.save_task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = Some(tokio::spawn(debounced_save(
            self.db.clone(),
            self.team_id.clone(),
            self.debounce,
            self.unsaved.clone(),
            self.cancel_token.clone(),
        )));
    }

    /// Save pending content right away instead of waiting for the timer.
    pub async fn flush(&self) -> Result<()> {
        if let Some(task) = self.save_task.lock().await.take() {
            task.abort();
        }
        let pending = self.unsaved.lock().await.take();
        if let Some(content) = pending {
            self.db.update_notes(&self.team_id, content).await?;
        }
        Ok(())
    }

    /// Stop autosaving. Unsaved edits are dropped.
    pub async fn teardown(&self) {
        self.cancel_token.cancel();
        if let Some(task) = self.save_task.lock().await.take() {
            task.abort();
        }
        self.unsaved.lock().await.take();
    }
}

async fn debounced_save(
    db: Database,
    team_id: String,
    debounce: Duration,
    unsaved: Arc<Mutex<Option<String>>>,
    cancel_token: CancellationToken,
) {
    tokio::select! {
        _ = tokio::time::sleep(debounce) => {}
        _ = cancel_token.cancelled() => return,
    }

    let Some(content) = unsaved.lock().await.take() else {
        return;
    };
    match db.update_notes(&team_id, content).await {
        Ok(()) => log_info!("Autosaved notes for team {}", team_id),
        Err(err) => log_error!("Autosaving notes for team {} failed: {:?}", team_id, err),
    }
}
