//! Certificate revocation list model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The current CRL of an issuer. At most one per `ikid`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Crl {
    pub id: i64,

    /// Key identifier of the issuer that signed the list.
    pub ikid: String,

    pub this_update: DateTime<Utc>,
    pub next_update: DateTime<Utc>,

    /// Issuer distinguished name.
    pub issuer: String,

    /// PEM-encoded signed CRL.
    pub pem: String,
}

impl Crl {
    /// Whether the list is past its next-update time.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_update
    }
}
