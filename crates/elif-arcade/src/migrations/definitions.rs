//! Migration Definitions - Core types shared by the migration system

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{ArcadeError, ArcadeResult};

/// Default name of the bookkeeping document type
pub const DEFAULT_BOOKKEEPING_TYPE: &str = "ArcadeMigration";

/// Configuration for the migration system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Document type that records applied migrations
    pub bookkeeping_type: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            bookkeeping_type: DEFAULT_BOOKKEEPING_TYPE.to_string(),
        }
    }
}

impl MigrationConfig {
    pub fn new(bookkeeping_type: impl Into<String>) -> Self {
        Self {
            bookkeeping_type: bookkeeping_type.into(),
        }
    }

    /// The type name is spliced into SQL text, so it must be a plain identifier
    pub fn validate(&self) -> ArcadeResult<()> {
        let mut chars = self.bookkeeping_type.chars();
        let valid = match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(ArcadeError::Configuration(format!(
                "Invalid bookkeeping type name '{}'",
                self.bookkeeping_type
            )))
        }
    }
}

/// A bookkeeping row: one applied migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationRecord {
    /// Build a record from a result row
    pub fn from_row(row: &Value) -> ArcadeResult<Self> {
        let version = row
            .get("version")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                ArcadeError::Serialization(format!("Bookkeeping row without integer version: {}", row))
            })?;

        let name = row
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let applied_at = row.get("applied_at").and_then(parse_timestamp);

        Ok(Self {
            version,
            name,
            applied_at,
        })
    }
}

/// Direction a migration is run in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Apply the migration
    Up,
    /// Undo the migration
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "up"),
            MigrationDirection::Down => write!(f, "down"),
        }
    }
}

/// Migration status relative to the bookkeeping type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Applied,
    Pending,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStatus::Applied => write!(f, "applied"),
            MigrationStatus::Pending => write!(f, "pending"),
        }
    }
}

/// One line of a status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatusEntry {
    pub version: i64,
    pub name: String,
    pub status: MigrationStatus,
}

/// Timestamp format used when writing `applied_at`
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Accepts RFC 3339 strings, the server's `yyyy-MM-dd HH:mm:ss[.SSS]` form
/// and epoch milliseconds
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
        Value::Number(millis) => millis
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}
