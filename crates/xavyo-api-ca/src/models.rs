//! Request and response bodies for the certificate authority API.
//!
//! Signing and revocation reuse the engine's [`xavyo_ca::SignRequest`] and
//! [`xavyo_ca::RevokeRequest`] as JSON bodies.

use serde::{Deserialize, Serialize};
use xavyo_ca::IssuerInfo;
use xavyo_ca_db::{Certificate, Crl, RevokedCertificate};

/// Pagination shared by the listing endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    /// Issuer key identifier, required when listing by issuer.
    pub ikid: Option<String>,
    /// Page size; 0 or absent uses the default.
    pub limit: u32,
    /// Return rows with an id greater than this.
    pub after: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLabelRequest {
    pub label: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublishCrlsRequest {
    /// Issuer to publish; every issuer when empty.
    pub ikid: String,
}

/// Encoding of a returned CRL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrlFormat {
    #[default]
    Pem,
    Der,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrlQuery {
    pub format: CrlFormat,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileQuery {
    /// Expected issuer label.
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateListResponse {
    pub certificates: Vec<Certificate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevokedListResponse {
    pub revoked: Vec<RevokedCertificate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuerListResponse {
    pub issuers: Vec<IssuerInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrlListResponse {
    pub crls: Vec<Crl>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub issuers: usize,
}
