//! OCSP responder.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::{debug, error};
use xavyo_ca_db::CaDb;

use crate::error::{CaError, CaResult};
use crate::issuer::Issuer;
use crate::ocsp::{
    self, CertStatus, OcspRequest, OcspSignRequest, INTERNAL_ERROR_RESPONSE,
    MALFORMED_REQUEST_RESPONSE, UNAUTHORIZED_RESPONSE,
};
use crate::profile::to_chrono;
use crate::registry::IssuerRegistry;

/// Answers OCSP requests from the revoked set.
///
/// A serial with no revocation record is reported good; the responder does
/// not check that the serial was ever issued.
pub struct OcspResponder {
    registry: Arc<IssuerRegistry>,
    db: Arc<dyn CaDb>,
}

impl OcspResponder {
    pub fn new(registry: Arc<IssuerRegistry>, db: Arc<dyn CaDb>) -> Self {
        Self { registry, db }
    }

    /// Answer a DER `OCSPRequest` with a signed DER `OCSPResponse`.
    pub async fn respond(&self, der: &[u8]) -> CaResult<Vec<u8>> {
        let request = ocsp::parse_request(der).map_err(|e| {
            debug!(error = %e, "Malformed OCSP request");
            CaError::invalid_argument(format!("malformed OCSP request: {e}"))
        })?;
        let issuer = self.resolve_issuer(&request)?;

        let ikid = issuer.skid();
        let serial = request.cert_id.serial_number.to_string();
        let status = match self
            .db
            .get_revoked_certificate_by_ikid_and_serial(ikid, &serial)
            .await
        {
            Ok(revoked) => CertStatus::Revoked {
                revoked_at: revoked.revoked_at,
                reason: Some(revoked.reason),
            },
            Err(e) if e.is_not_found() => CertStatus::Good,
            Err(e) => {
                error!(ikid = %ikid, serial = %serial, error = %e, "Failed to look up revocation");
                return Err(CaError::internal("failed to look up certificate status"));
            }
        };

        let now = Utc::now().trunc_subsecs(0);
        let expiry = to_chrono(issuer.urls().ocsp_expiry);
        let sign_request = OcspSignRequest {
            cert_id: request.cert_id,
            status,
            produced_at: now,
            this_update: now,
            next_update: (expiry > chrono::Duration::zero()).then(|| now + expiry),
            responder_key_hash: issuer.responder_key_hash().to_vec(),
        };

        issuer
            .signer()
            .sign_ocsp(&sign_request)
            .await
            .map_err(|e| {
                error!(ikid = %ikid, serial = %serial, error = %e, "Failed to sign OCSP response");
                CaError::internal("failed to sign OCSP response")
            })
    }

    fn resolve_issuer(&self, request: &OcspRequest) -> CaResult<Arc<Issuer>> {
        let id = &request.cert_id;
        if !id.issuer_key_hash.is_empty() {
            self.registry
                .resolve_by_ocsp_key_hash(id.hash_algorithm, &id.issuer_key_hash)
        } else if !id.issuer_name_hash.is_empty() {
            self.registry
                .resolve_by_ocsp_name_hash(id.hash_algorithm, &id.issuer_name_hash)
        } else {
            Err(CaError::invalid_argument("issuer not specified"))
        }
    }
}

/// The fixed OCSP error body for a failed request.
#[must_use]
pub fn error_response(err: &CaError) -> &'static [u8] {
    match err {
        CaError::InvalidArgument(_) => MALFORMED_REQUEST_RESPONSE,
        CaError::NotFound(_) => UNAUTHORIZED_RESPONSE,
        _ => INTERNAL_ERROR_RESPONSE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::fixtures::root_issuer;
    use crate::ocsp::{parse_response, CertId, HashAlgorithm, ResponseStatus};
    use num_bigint::BigUint;
    use xavyo_ca_db::MemoryCaDb;

    fn responder() -> (OcspResponder, Arc<Issuer>) {
        let registry = Arc::new(IssuerRegistry::new());
        let issuer = registry.add(root_issuer("root", &[])).unwrap();
        let responder = OcspResponder::new(registry, Arc::new(MemoryCaDb::new()));
        (responder, issuer)
    }

    #[tokio::test]
    async fn test_unknown_serial_is_good() {
        let (responder, issuer) = responder();
        let id = CertId::new(
            HashAlgorithm::Sha1,
            &issuer.certificate().raw_subject,
            &issuer.certificate().public_key,
            BigUint::from(12_345u32),
        );

        let der = responder.respond(&ocsp::encode_request(&id)).await.unwrap();
        let response = parse_response(&der).unwrap();
        assert_eq!(response.status, ResponseStatus::Successful);
        let basic = response.basic.unwrap();
        assert_eq!(basic.responses[0].status, CertStatus::Good);
        assert_eq!(basic.responses[0].cert_id, id);
        assert_eq!(
            basic.responder_key_hash.as_deref(),
            Some(issuer.responder_key_hash())
        );
    }

    #[tokio::test]
    async fn test_unknown_issuer_is_not_found() {
        let (responder, _) = responder();
        let id = CertId::new(HashAlgorithm::Sha256, b"name", b"key", BigUint::from(1u32));
        let err = responder
            .respond(&ocsp::encode_request(&id))
            .await
            .unwrap_err();
        assert!(matches!(err, CaError::NotFound(_)));
        assert_eq!(error_response(&err), UNAUTHORIZED_RESPONSE);
    }

    #[tokio::test]
    async fn test_missing_issuer_hashes() {
        let (responder, _) = responder();
        let id = CertId {
            hash_algorithm: HashAlgorithm::Sha1,
            issuer_name_hash: vec![],
            issuer_key_hash: vec![],
            serial_number: BigUint::from(1u32),
        };
        let err = responder
            .respond(&ocsp::encode_request(&id))
            .await
            .unwrap_err();
        assert_eq!(err, CaError::invalid_argument("issuer not specified"));
    }

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        let (responder, _) = responder();
        let err = responder.respond(b"garbage").await.unwrap_err();
        assert_eq!(error_response(&err), MALFORMED_REQUEST_RESPONSE);
        assert_eq!(
            error_response(&CaError::internal("x")),
            INTERNAL_ERROR_RESPONSE
        );
    }
}
