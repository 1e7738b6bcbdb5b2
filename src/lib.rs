pub mod board;
pub mod db;
pub mod error;
pub mod notes;
pub mod session;
pub mod settings;
pub mod todos;
mod utils;

use std::{path::Path, sync::Arc};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use tokio::sync::RwLock;

use board::BoardStore;
use db::{Database, Member, Team};
use notes::NotesPad;
use session::{IdentityProvider, LocalIdentity, User};
use settings::SettingsStore;
use todos::TodoList;

pub use error::{GatewayError, GatewayResult};
pub use utils::logging::init_logging;

/// Everything that belongs to one signed-in user looking at one team.
pub struct Session {
    pub user: User,
    pub team: Team,
    pub members: Vec<Member>,
    pub board: Arc<BoardStore>,
    pub todos: Arc<TodoList>,
    pub notes: Arc<NotesPad>,
}

impl Session {
    async fn teardown(&self) {
        self.board.teardown().await;
        self.todos.teardown().await;
        self.notes.teardown().await;
    }
}

/// Application state: storage, preferences and the active session.
pub struct AppState {
    db: Database,
    settings: SettingsStore,
    identity: Arc<dyn IdentityProvider>,
    session: RwLock<Option<Arc<Session>>>,
}

impl AppState {
    pub fn new(db: Database, settings: SettingsStore, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            db,
            settings,
            identity,
            session: RwLock::new(None),
        }
    }

    /// Open the database and settings under `data_dir` for a local user.
    pub fn open(data_dir: &Path, user_id: &str) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

        let db = Database::new(data_dir.join("teamboard.sqlite3"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let identity = Arc::new(LocalIdentity::new(db.clone(), user_id));
        Ok(Self::new(db, settings, identity))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub async fn session(&self) -> Option<Arc<Session>> {
        self.session.read().await.clone()
    }

    /// Start a session for the signed-in user.
    ///
    /// The team is the provider's choice if the user belongs to it, else the
    /// last team picked on this machine, else the user's first team.
    pub async fn init(&self) -> Result<Arc<Session>> {
        let Some(user) = self.identity.current_user().await? else {
            bail!("no signed-in user");
        };

        let teams = self.identity.teams_for_user(&user.id).await?;
        let preferred = [
            self.identity.current_team_id().await?,
            self.settings.last_team_id()?,
        ];
        let team = preferred
            .iter()
            .flatten()
            .find_map(|id| teams.iter().find(|team| &team.id == id))
            .or_else(|| teams.first())
            .cloned();
        let Some(team) = team else {
            bail!("user {} does not belong to any team", user.id);
        };

        info!("Starting session for {} on team {}", user.id, team.id);
        self.start(user, team).await
    }

    /// Move the session to another of the user's teams and remember the choice.
    pub async fn switch_team(&self, team_id: &str) -> Result<Arc<Session>> {
        let Some(current) = self.session().await else {
            bail!("no active session");
        };

        let teams = self.identity.teams_for_user(&current.user.id).await?;
        let Some(team) = teams.into_iter().find(|team| team.id == team_id) else {
            bail!("user {} is not a member of team {}", current.user.id, team_id);
        };

        info!("Switching {} to team {}", current.user.id, team.id);
        self.start(current.user.clone(), team).await
    }

    /// End the session. Late responses for it are dropped.
    pub async fn teardown(&self) {
        if let Some(session) = self.session.write().await.take() {
            session.teardown().await;
            info!("Session for {} ended", session.user.id);
        }
    }

    async fn start(&self, user: User, team: Team) -> Result<Arc<Session>> {
        self.teardown().await;

        let members = self.identity.team_members(&team.id).await?;
        let board = Arc::new(BoardStore::new(Arc::new(self.db.clone())));
        let todos = Arc::new(TodoList::new(self.db.clone(), team.id.clone()));
        let notes = Arc::new(NotesPad::new(
            self.db.clone(),
            team.id.clone(),
            self.settings.notes_autosave()?,
        ));

        if let Err(err) = board.load(&team.id).await {
            warn!("Board for team {} unavailable at session start: {}", team.id, err);
        }
        if let Err(err) = todos.load().await {
            warn!("Todos for team {} unavailable at session start: {:?}", team.id, err);
        }
        if let Err(err) = notes.load().await {
            warn!("Notes for team {} unavailable at session start: {:?}", team.id, err);
        }

        if let Err(err) = self.settings.set_last_team_id(Some(team.id.clone())) {
            warn!("Failed to remember team {}: {:?}", team.id, err);
        }

        let session = Arc::new(Session {
            user,
            team,
            members,
            board,
            todos,
            notes,
        });
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::MemberRole;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_restores_last_team_and_switch_persists_it() {
        crate::init_logging();
        let dir = TempDir::new().unwrap();
        let state = AppState::open(dir.path(), "ada").unwrap();
        let db = state.db().clone();

        db.create_profile("ada", "Ada".into()).await.unwrap();
        let first = db.create_team("First".into(), "ada").await.unwrap();
        let second = db.create_team("Second".into(), "ada").await.unwrap();

        let session = state.init().await.unwrap();
        assert_eq!(session.team.id, first.id);
        assert_eq!(session.board.snapshot().await.columns.len(), 3);
        assert_eq!(session.members.len(), 1);

        let switched = state.switch_team(&second.id).await.unwrap();
        assert_eq!(switched.team.id, second.id);
        assert!(session.board.is_torn_down());
        assert_eq!(
            state.settings().last_team_id().unwrap().as_deref(),
            Some(second.id.as_str())
        );

        state.teardown().await;
        assert!(state.session().await.is_none());

        let reopened = AppState::open(dir.path(), "ada").unwrap();
        let restored = reopened.init().await.unwrap();
        assert_eq!(restored.team.id, second.id);
    }

    #[tokio::test]
    async fn switch_to_foreign_team_is_refused() {
        let dir = TempDir::new().unwrap();
        let state = AppState::open(dir.path(), "ada").unwrap();
        let db = state.db().clone();

        db.create_profile("ada", "Ada".into()).await.unwrap();
        db.create_profile("bob", "Bob".into()).await.unwrap();
        db.create_team("Ada's".into(), "ada").await.unwrap();
        let bobs = db.create_team("Bob's".into(), "bob").await.unwrap();

        state.init().await.unwrap();
        assert!(state.switch_team(&bobs.id).await.is_err());

        db.add_team_member(&bobs.id, "ada", MemberRole::Member)
            .await
            .unwrap();
        let session = state.switch_team(&bobs.id).await.unwrap();
        assert_eq!(session.members.len(), 2);
    }

    #[tokio::test]
    async fn init_without_profile_fails() {
        let dir = TempDir::new().unwrap();
        let state = AppState::open(dir.path(), "ghost").unwrap();
        assert!(state.init().await.is_err());
    }
}
