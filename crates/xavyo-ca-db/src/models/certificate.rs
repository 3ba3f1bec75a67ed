//! Issued certificate model (the active set).

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A certificate issued by one of the registered issuers.
///
/// Uniqueness: `sha256` (the thumbprint) and the pair (`ikid`, `serial_number`).
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Certificate {
    /// Externally generated identifier.
    pub id: i64,

    /// Owning organization, `0` for engine-owned certificates.
    pub org_id: i64,

    /// Subject key identifier, lowercase hex.
    pub skid: String,

    /// Issuer key identifier, lowercase hex.
    pub ikid: String,

    /// Serial number as a decimal string.
    pub serial_number: String,

    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,

    /// Subject distinguished name.
    pub subject: String,

    /// Issuer distinguished name.
    pub issuer: String,

    /// SHA-256 thumbprint of the DER encoding, lowercase hex.
    pub sha256: String,

    /// Profile the certificate was issued under.
    pub profile: String,

    /// PEM of the leaf certificate.
    pub pem: String,

    /// PEM of the issuing chain.
    pub issuers_pem: String,

    /// Free-form label.
    pub label: String,

    /// Publication locations.
    pub locations: Vec<String>,

    /// Free-form metadata.
    #[sqlx(json)]
    pub metadata: HashMap<String, String>,
}

impl Certificate {
    /// Relative publication path: `<ikid[:4]>/<base64url(serial[:9])>`.
    ///
    /// Falls back to the first twelve characters of the decimal serial when
    /// it does not parse as an integer.
    #[must_use]
    pub fn file_name(&self) -> String {
        let prefix: String = self.ikid.chars().take(4).collect();
        let name = match BigUint::parse_bytes(self.serial_number.as_bytes(), 10) {
            Some(serial) => {
                let bytes = serial.to_bytes_be();
                let end = bytes.len().min(9);
                URL_SAFE_NO_PAD.encode(&bytes[..end])
            }
            None => self.serial_number.chars().take(12).collect(),
        };
        format!("{prefix}/{name}")
    }

    /// Whether `at` falls inside the validity window.
    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::certificate;
    use super::*;

    #[test]
    fn test_file_name_uses_ikid_prefix_and_serial_fragment() {
        let cert = certificate(1, "a1b2c3d4e5", "255");
        assert_eq!(cert.file_name(), "a1b2/_w");
    }

    #[test]
    fn test_file_name_truncates_long_serials() {
        // 2^80 encodes to eleven bytes; only the first nine are used.
        let serial = (BigUint::from(1u8) << 80u32).to_string();
        let cert = certificate(1, "ffff0000", &serial);
        let expected = URL_SAFE_NO_PAD.encode([1u8, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(cert.file_name(), format!("ffff/{expected}"));
    }

    #[test]
    fn test_file_name_falls_back_for_non_decimal_serial() {
        let cert = certificate(1, "abcd", "not-a-number-at-all");
        assert_eq!(cert.file_name(), "abcd/not-a-number");
    }

    #[test]
    fn test_validity_window() {
        let cert = certificate(1, "abcd", "1");
        assert!(cert.is_valid_at(Utc::now()));
        assert!(!cert.is_valid_at(Utc::now() + chrono::Duration::days(60)));
    }
}
