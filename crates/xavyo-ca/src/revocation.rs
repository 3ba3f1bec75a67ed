//! Revocation: move a certificate from the active set to the revoked set.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use xavyo_ca_db::{CaDb, Certificate, DbError, RevocationReason, RevokedCertificate};

use crate::crl::CrlRefreshQueue;
use crate::error::{CaError, CaResult};
use crate::metrics::CaMetrics;

/// Which certificate to revoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSelector {
    Id(i64),
    IkidSerial { ikid: String, serial: String },
    /// First certificate with this subject key identifier.
    Skid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevokeRequest {
    pub id: Option<i64>,
    pub ikid: Option<String>,
    pub serial: Option<String>,
    pub skid: Option<String>,
    pub reason: RevocationReason,
    /// Revocation time; now when absent.
    pub at: Option<DateTime<Utc>>,
}

impl RevokeRequest {
    /// The selector, checked in the order id, (ikid, serial), skid.
    pub fn selector(&self) -> CaResult<CertificateSelector> {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        if let Some(id) = self.id.filter(|id| *id != 0) {
            return Ok(CertificateSelector::Id(id));
        }
        match (non_empty(&self.ikid), non_empty(&self.serial)) {
            (Some(ikid), Some(serial)) => {
                return Ok(CertificateSelector::IkidSerial { ikid, serial })
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(CaError::invalid_argument(
                    "ikid and serial must be given together",
                ))
            }
            (None, None) => {}
        }
        if let Some(skid) = non_empty(&self.skid) {
            return Ok(CertificateSelector::Skid(skid));
        }
        Err(CaError::invalid_argument(
            "one of id, ikid and serial, or skid is required",
        ))
    }
}

pub struct RevocationProcessor {
    db: Arc<dyn CaDb>,
    crl_queue: CrlRefreshQueue,
    metrics: CaMetrics,
}

impl RevocationProcessor {
    pub fn new(db: Arc<dyn CaDb>, crl_queue: CrlRefreshQueue, metrics: CaMetrics) -> Self {
        Self {
            db,
            crl_queue,
            metrics,
        }
    }

    /// Revoke a certificate and schedule its issuer's CRL for regeneration.
    ///
    /// Returns once the revocation is durable; the CRL follows in the
    /// background.
    pub async fn revoke(&self, req: &RevokeRequest) -> CaResult<RevokedCertificate> {
        let selector = req.selector()?;
        let cert = self.find(&selector).await?;
        let at = req.at.unwrap_or_else(Utc::now).trunc_subsecs(0);

        let revoked = self
            .db
            .revoke_certificate(&cert, at, req.reason)
            .await
            .map_err(|e| lookup_error(&e, "failed to revoke certificate"))?;

        self.metrics
            .cert_revoked
            .get_or_create(&CaMetrics::issuer(&cert.ikid))
            .inc();
        info!(
            id = cert.id,
            ikid = %cert.ikid,
            serial = %cert.serial_number,
            reason = %req.reason,
            "Certificate revoked"
        );

        self.crl_queue.enqueue(&cert.ikid);
        Ok(revoked)
    }

    async fn find(&self, selector: &CertificateSelector) -> CaResult<Certificate> {
        let result = match selector {
            CertificateSelector::Id(id) => self.db.get_certificate(*id).await,
            CertificateSelector::IkidSerial { ikid, serial } => {
                self.db.get_certificate_by_ikid_and_serial(ikid, serial).await
            }
            CertificateSelector::Skid(skid) => match self.db.get_certificates_by_skid(skid).await {
                Ok(certs) => certs
                    .into_iter()
                    .next()
                    .ok_or_else(|| DbError::NotFound(format!("certificate skid={skid}"))),
                Err(e) => Err(e),
            },
        };
        result.map_err(|e| lookup_error(&e, "failed to look up certificate"))
    }
}

fn lookup_error(e: &DbError, internal: &str) -> CaError {
    if e.is_not_found() {
        CaError::not_found("unable to find certificate")
    } else {
        error!(error = %e, "{internal}");
        CaError::internal(internal)
    }
}
