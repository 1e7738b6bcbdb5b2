use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

const DEFAULT_NOTES_AUTOSAVE_MS: u64 = 800;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct UserSettings {
    last_team_id: Option<String>,
    notes_autosave_ms: u64,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            last_team_id: None,
            notes_autosave_ms: DEFAULT_NOTES_AUTOSAVE_MS,
        }
    }
}

/// User preferences persisted as JSON next to the database.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn last_team_id(&self) -> Result<Option<String>> {
        Ok(self.read()?.last_team_id.clone())
    }

    pub fn set_last_team_id(&self, team_id: Option<String>) -> Result<()> {
        let mut guard = self.write()?;
        guard.last_team_id = team_id;
        self.persist(&guard)
    }

    pub fn notes_autosave(&self) -> Result<Duration> {
        Ok(Duration::from_millis(self.read()?.notes_autosave_ms))
    }

    pub fn set_notes_autosave(&self, interval: Duration) -> Result<()> {
        let mut guard = self.write()?;
        guard.notes_autosave_ms = interval.as_millis() as u64;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        *self.write()? = data;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, UserSettings>> {
        self.data
            .read()
            .map_err(|_| anyhow!("settings lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, UserSettings>> {
        self.data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
