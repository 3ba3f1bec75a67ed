//! Persisted issuer configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of an issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IssuerStatus {
    Active,
    Archived,
}

impl std::fmt::Display for IssuerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Durable record of a dynamically provisioned issuer.
///
/// `config` holds the YAML issuer configuration, key material included.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct IssuerRecord {
    pub id: i64,
    pub label: String,
    pub status: IssuerStatus,
    pub config: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IssuerRecord {
    /// Build a new active record; the store assigns timestamps.
    #[must_use]
    pub fn new(id: i64, label: impl Into<String>, config: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            label: label.into(),
            status: IssuerStatus::Active,
            config: config.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
