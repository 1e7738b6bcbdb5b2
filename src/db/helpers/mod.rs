use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::Priority;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_priority(value: &str) -> Result<Priority> {
    value
        .parse::<Priority>()
        .with_context(|| format!("failed to parse priority '{value}'"))
}

/// Wraps a failure to decode a column value so it can be returned from a
/// rusqlite row mapper. The column index is not known here and is reported as 0.
pub fn conversion_error(err: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, err.into())
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
