//! Persisted certificate profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Issuer label that makes a profile usable by any issuer.
pub const ANY_ISSUER: &str = "*";

/// A certificate profile scoped to an issuer label (or [`ANY_ISSUER`]).
///
/// `config` holds the serialized profile policy; it is decoded once when the
/// owning issuer is built.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CertProfileRecord {
    pub id: i64,
    pub label: String,
    pub issuer_label: String,
    pub config: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CertProfileRecord {
    #[must_use]
    pub fn new(
        id: i64,
        label: impl Into<String>,
        issuer_label: impl Into<String>,
        config: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            label: label.into(),
            issuer_label: issuer_label.into(),
            config: config.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the profile is usable by every issuer.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.issuer_label == ANY_ISSUER
    }
}
