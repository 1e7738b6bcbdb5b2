//! Label-related data models.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A team-wide label that cards can carry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

pub fn validate_color(color: &str) -> Result<()> {
    let Some(hex_part) = color.strip_prefix('#') else {
        bail!("Invalid color format. Must be hex (#RRGGBB)");
    };

    if hex_part.len() != 6 && hex_part.len() != 8 {
        bail!("Invalid color format. Must be hex (#RRGGBB or #RRGGBBAA)");
    }

    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Invalid color format. Must be hex (#RRGGBB)");
    }

    Ok(())
}
