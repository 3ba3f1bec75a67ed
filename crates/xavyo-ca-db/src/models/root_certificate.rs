//! Trusted root certificate model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Trust classification of a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Trust {
    Public,
    Private,
}

/// A root certificate loaded at provisioning time.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RootCertificate {
    pub id: i64,

    /// Subject key identifier, lowercase hex.
    pub skid: String,

    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub subject: String,

    /// SHA-256 thumbprint, lowercase hex.
    pub sha256: String,

    pub trust: Trust,
    pub pem: String,
}
