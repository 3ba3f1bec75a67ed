//! Revoked certificate model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::Certificate;

/// RFC 5280 certificate revocation reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum RevocationReason {
    /// Unspecified reason (0).
    #[default]
    Unspecified = 0,
    /// Key has been compromised (1).
    KeyCompromise = 1,
    /// CA has been compromised (2).
    CaCompromise = 2,
    /// Affiliation has changed (3).
    AffiliationChanged = 3,
    /// Certificate has been superseded (4).
    Superseded = 4,
    /// Certificate is no longer needed (5).
    CessationOfOperation = 5,
    /// Certificate is on hold (6).
    CertificateHold = 6,
    /// Remove from CRL (8).
    RemoveFromCrl = 8,
    /// Privilege withdrawn (9).
    PrivilegeWithdrawn = 9,
    /// AA compromise (10).
    AaCompromise = 10,
}

impl RevocationReason {
    /// Convert to i16 for storage.
    #[must_use]
    pub fn as_i16(&self) -> i16 {
        *self as i16
    }

    /// Create from the stored i16 value.
    #[must_use]
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Unspecified),
            1 => Some(Self::KeyCompromise),
            2 => Some(Self::CaCompromise),
            3 => Some(Self::AffiliationChanged),
            4 => Some(Self::Superseded),
            5 => Some(Self::CessationOfOperation),
            6 => Some(Self::CertificateHold),
            8 => Some(Self::RemoveFromCrl),
            9 => Some(Self::PrivilegeWithdrawn),
            10 => Some(Self::AaCompromise),
            _ => None,
        }
    }
}

impl std::fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unspecified => write!(f, "unspecified"),
            Self::KeyCompromise => write!(f, "key_compromise"),
            Self::CaCompromise => write!(f, "ca_compromise"),
            Self::AffiliationChanged => write!(f, "affiliation_changed"),
            Self::Superseded => write!(f, "superseded"),
            Self::CessationOfOperation => write!(f, "cessation_of_operation"),
            Self::CertificateHold => write!(f, "certificate_hold"),
            Self::RemoveFromCrl => write!(f, "remove_from_crl"),
            Self::PrivilegeWithdrawn => write!(f, "privilege_withdrawn"),
            Self::AaCompromise => write!(f, "aa_compromise"),
        }
    }
}

impl std::str::FromStr for RevocationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unspecified" => Ok(Self::Unspecified),
            "key_compromise" | "keycompromise" => Ok(Self::KeyCompromise),
            "ca_compromise" | "cacompromise" => Ok(Self::CaCompromise),
            "affiliation_changed" | "affiliationchanged" => Ok(Self::AffiliationChanged),
            "superseded" => Ok(Self::Superseded),
            "cessation_of_operation" | "cessationofoperation" => Ok(Self::CessationOfOperation),
            "certificate_hold" | "certificatehold" => Ok(Self::CertificateHold),
            "remove_from_crl" | "removefromcrl" => Ok(Self::RemoveFromCrl),
            "privilege_withdrawn" | "privilegewithdrawn" => Ok(Self::PrivilegeWithdrawn),
            "aa_compromise" | "aacompromise" => Ok(Self::AaCompromise),
            _ => Err(format!("Invalid revocation reason: {s}")),
        }
    }
}

/// A certificate moved out of the active set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedCertificate {
    /// Snapshot of the certificate at revocation time.
    pub certificate: Certificate,

    /// When the certificate was revoked.
    pub revoked_at: DateTime<Utc>,

    /// Why the certificate was revoked.
    pub reason: RevocationReason,
}

impl<'r> FromRow<'r, PgRow> for RevokedCertificate {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let certificate = Certificate::from_row(row)?;
        let revoked_at: DateTime<Utc> = row.try_get("revoked_at")?;
        let code: i16 = row.try_get("reason")?;
        let reason = RevocationReason::from_i16(code).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "reason".to_string(),
            source: format!("invalid revocation reason: {code}").into(),
        })?;
        Ok(Self {
            certificate,
            revoked_at,
            reason,
        })
    }
}
