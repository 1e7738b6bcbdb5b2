use anyhow::{anyhow, Result};
use chrono::Utc;
use log::info;
use rand::seq::SliceRandom;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, new_id, parse_datetime},
    models::{Member, MemberRole, Profile, Team, AVATAR_COLORS},
    repositories::{columns::insert_column, labels::insert_label},
};

/// Columns every new team starts with, left to right.
pub const DEFAULT_COLUMNS: [&str; 3] = ["To Do", "In Progress", "Done"];

/// Labels every new team starts with.
pub const DEFAULT_LABELS: [(&str, &str); 4] = [
    ("Bug", "#e57373"),
    ("Feature", "#64b5f6"),
    ("Improvement", "#81c784"),
    ("Urgent", "#ffb74d"),
];

fn row_to_profile(row: &Row) -> Result<Profile, rusqlite::Error> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Profile {
        id: row.get("id")?,
        name: row.get("name")?,
        avatar_color: row.get("avatar_color")?,
        created_at: parse_datetime(&created_at, "created_at").map_err(conversion_error)?,
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(conversion_error)?,
    })
}

fn row_to_team(row: &Row) -> Result<Team, rusqlite::Error> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Team {
        id: row.get("id")?,
        name: row.get("name")?,
        owner_id: row.get("owner_id")?,
        created_at: parse_datetime(&created_at, "created_at").map_err(conversion_error)?,
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(conversion_error)?,
    })
}

impl Database {
    /// Create a profile with a random avatar color from the palette.
    pub async fn create_profile(&self, user_id: &str, name: String) -> Result<Profile> {
        let avatar_color = AVATAR_COLORS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(AVATAR_COLORS[0])
            .to_string();
        let now = Utc::now();
        let profile = Profile {
            id: user_id.to_string(),
            name,
            avatar_color,
            created_at: now,
            updated_at: now,
        };

        let record = profile.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO profiles (id, name, avatar_color, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.name,
                    record.avatar_color,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?;

        Ok(profile)
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let profile = conn
                .query_row(
                    "SELECT id, name, avatar_color, created_at, updated_at
                     FROM profiles
                     WHERE id = ?1",
                    params![user_id],
                    row_to_profile,
                )
                .optional()?;
            Ok(profile)
        })
        .await
    }

    /// Create a team owned by `owner_id`, enrol the owner and seed the default
    /// columns and labels, all in one transaction.
    pub async fn create_team(&self, name: String, owner_id: &str) -> Result<Team> {
        let owner_id = owner_id.to_string();
        let team = self
            .execute(move |conn| {
                let tx = conn.transaction()?;

                let owner_exists: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM profiles WHERE id = ?1",
                        params![owner_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if owner_exists.is_none() {
                    return Err(anyhow!("profile {owner_id} does not exist"));
                }

                let now = Utc::now();
                let team = Team {
                    id: new_id(),
                    name,
                    owner_id: owner_id.clone(),
                    created_at: now,
                    updated_at: now,
                };

                tx.execute(
                    "INSERT INTO teams (id, name, owner_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![team.id, team.name, team.owner_id, now.to_rfc3339()],
                )?;
                tx.execute(
                    "INSERT INTO team_members (id, team_id, user_id, role, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        new_id(),
                        team.id,
                        owner_id,
                        MemberRole::Owner.as_str(),
                        now.to_rfc3339(),
                    ],
                )?;

                for title in DEFAULT_COLUMNS {
                    insert_column(&tx, &team.id, title)?;
                }
                for (label_name, color) in DEFAULT_LABELS {
                    insert_label(&tx, &team.id, label_name, color)?;
                }

                tx.commit()?;
                Ok(team)
            })
            .await?;

        info!("Created team {} ({})", team.name, team.id);
        Ok(team)
    }

    pub async fn add_team_member(&self, team_id: &str, user_id: &str, role: MemberRole) -> Result<()> {
        let team_id = team_id.to_string();
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO team_members (id, team_id, user_id, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(team_id, user_id) DO UPDATE SET role = excluded.role",
                params![
                    new_id(),
                    team_id,
                    user_id,
                    role.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Teams the user belongs to, oldest first
    pub async fn teams_for_user(&self, user_id: &str) -> Result<Vec<Team>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.name, t.owner_id, t.created_at, t.updated_at
                 FROM teams t
                 JOIN team_members m ON m.team_id = t.id
                 WHERE m.user_id = ?1
                 ORDER BY t.created_at ASC, t.name ASC",
            )?;
            let teams = stmt
                .query_map(params![user_id], row_to_team)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(teams)
        })
        .await
    }

    pub async fn team_members(&self, team_id: &str) -> Result<Vec<Member>> {
        let team_id = team_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.name, p.avatar_color, m.role
                 FROM team_members m
                 JOIN profiles p ON p.id = m.user_id
                 WHERE m.team_id = ?1
                 ORDER BY m.created_at ASC, p.name ASC",
            )?;
            let mut rows = stmt.query(params![team_id])?;
            let mut members = Vec::new();
            while let Some(row) = rows.next()? {
                let role: String = row.get(3)?;
                members.push(Member {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    avatar_color: row.get(2)?,
                    role: role.parse()?,
                });
            }
            Ok(members)
        })
        .await
    }
}
