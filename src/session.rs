use async_trait::async_trait;
use anyhow::Result;
use serde::Serialize;

use crate::db::{Database, Member, Team};

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar_color: String,
}

/// Who is signed in and which teams they can see.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Result<Option<User>>;

    /// Team the session should open on, if the provider has an opinion.
    async fn current_team_id(&self) -> Result<Option<String>>;

    async fn teams_for_user(&self, user_id: &str) -> Result<Vec<Team>>;

    async fn team_members(&self, team_id: &str) -> Result<Vec<Member>>;
}

/// Identity backed by the local profiles table.
pub struct LocalIdentity {
    db: Database,
    user_id: String,
    team_id: Option<String>,
}

impl LocalIdentity {
    pub fn new(db: Database, user_id: impl Into<String>) -> Self {
        Self {
            db,
            user_id: user_id.into(),
            team_id: None,
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    async fn current_user(&self) -> Result<Option<User>> {
        let profile = self.db.get_profile(&self.user_id).await?;
        Ok(profile.map(|profile| User {
            id: profile.id,
            name: profile.name,
            avatar_color: profile.avatar_color,
        }))
    }

    async fn current_team_id(&self) -> Result<Option<String>> {
        Ok(self.team_id.clone())
    }

    async fn teams_for_user(&self, user_id: &str) -> Result<Vec<Team>> {
        self.db.teams_for_user(user_id).await
    }

    async fn team_members(&self, team_id: &str) -> Result<Vec<Member>> {
        self.db.team_members(team_id).await
    }
}
