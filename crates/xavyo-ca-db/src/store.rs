//! The persistence interface consumed by the certificate authority.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbResult;
use crate::models::{
    CertProfileRecord, Certificate, Crl, IssuerRecord, IssuerStatus, RevocationReason,
    RevokedCertificate, RootCertificate,
};

/// Page size used when a caller passes `0`.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Durable store for certificates, revocations, CRLs, issuers and profiles.
///
/// Lookups report a miss as [`DbError::NotFound`](crate::DbError::NotFound);
/// uniqueness violations as [`DbError::Conflict`](crate::DbError::Conflict).
///
/// List operations are cursor-paginated: results are ordered by ascending
/// ID, include only IDs strictly greater than `after`, and an empty page
/// means there is nothing more to read. A `limit` of `0` selects
/// [`DEFAULT_PAGE_SIZE`].
#[async_trait]
pub trait CaDb: Send + Sync {
    // Roots

    async fn register_root_certificate(&self, root: &RootCertificate) -> DbResult<RootCertificate>;
    async fn list_root_certificates(&self) -> DbResult<Vec<RootCertificate>>;

    // Active certificates

    /// Upsert keyed by thumbprint; a colliding (`ikid`, `serial_number`)
    /// under a different thumbprint is a conflict.
    async fn register_certificate(&self, cert: &Certificate) -> DbResult<Certificate>;
    async fn remove_certificate(&self, id: i64) -> DbResult<()>;
    async fn update_certificate_label(&self, id: i64, label: &str) -> DbResult<Certificate>;
    async fn get_certificate(&self, id: i64) -> DbResult<Certificate>;
    async fn get_certificates_by_skid(&self, skid: &str) -> DbResult<Vec<Certificate>>;
    async fn get_certificate_by_ikid_and_serial(
        &self,
        ikid: &str,
        serial: &str,
    ) -> DbResult<Certificate>;
    async fn list_certificates(&self, ikid: &str, limit: u32, after: i64)
        -> DbResult<Vec<Certificate>>;
    async fn list_org_certificates(
        &self,
        org_id: i64,
        limit: u32,
        after: i64,
    ) -> DbResult<Vec<Certificate>>;

    // Revoked certificates

    /// Upsert keyed by thumbprint.
    async fn register_revoked_certificate(
        &self,
        revoked: &RevokedCertificate,
    ) -> DbResult<RevokedCertificate>;
    async fn remove_revoked_certificate(&self, id: i64) -> DbResult<()>;

    /// Move `cert` from the active set to the revoked set in one transaction.
    ///
    /// Either both halves commit or neither does.
    async fn revoke_certificate(
        &self,
        cert: &Certificate,
        at: DateTime<Utc>,
        reason: RevocationReason,
    ) -> DbResult<RevokedCertificate>;
    async fn get_revoked_certificate_by_ikid_and_serial(
        &self,
        ikid: &str,
        serial: &str,
    ) -> DbResult<RevokedCertificate>;
    async fn list_revoked_certificates(
        &self,
        ikid: &str,
        limit: u32,
        after: i64,
    ) -> DbResult<Vec<RevokedCertificate>>;
    async fn list_org_revoked_certificates(
        &self,
        org_id: i64,
        limit: u32,
        after: i64,
    ) -> DbResult<Vec<RevokedCertificate>>;

    // CRLs

    /// Upsert keyed by `ikid`.
    async fn register_crl(&self, crl: &Crl) -> DbResult<Crl>;
    async fn get_crl(&self, ikid: &str) -> DbResult<Crl>;
    async fn remove_crl(&self, ikid: &str) -> DbResult<()>;

    // Issuers

    /// Upsert keyed by label.
    async fn register_issuer(&self, issuer: &IssuerRecord) -> DbResult<IssuerRecord>;
    async fn update_issuer_status(&self, label: &str, status: IssuerStatus)
        -> DbResult<IssuerRecord>;
    async fn get_issuer_by_label(&self, label: &str) -> DbResult<IssuerRecord>;
    async fn list_issuers(&self, limit: u32, after: i64) -> DbResult<Vec<IssuerRecord>>;
    async fn delete_issuer(&self, label: &str) -> DbResult<()>;

    // Profiles

    /// Upsert keyed by label.
    async fn register_cert_profile(&self, profile: &CertProfileRecord)
        -> DbResult<CertProfileRecord>;
    async fn get_cert_profile(&self, label: &str) -> DbResult<CertProfileRecord>;
    async fn get_cert_profiles_by_issuer(&self, issuer_label: &str)
        -> DbResult<Vec<CertProfileRecord>>;
    async fn list_cert_profiles(&self) -> DbResult<Vec<CertProfileRecord>>;
    async fn delete_cert_profile(&self, label: &str) -> DbResult<()>;
}

/// Resolve a caller-supplied page size.
#[must_use]
pub fn page_size(limit: u32) -> usize {
    if limit == 0 {
        DEFAULT_PAGE_SIZE as usize
    } else {
        limit as usize
    }
}
