//! Crypto backend abstraction.
//!
//! A [`CryptoBackend`] turns key material into [`IssuerSigner`]s and generates
//! new keys. Signers are shared read-only between concurrent operations.

pub mod software;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xavyo_ca_db::RevocationReason;

use crate::ocsp::{self, OcspSignRequest, SignatureAlgorithm};
use crate::profile::{ExtKeyUsage, KeyUsage};
use crate::x509::{NameAttribute, SubjectAltNames};

pub use software::SoftwareBackend;

/// Crypto backend errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("encoding failed: {0}")]
    Encoding(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Algorithms for newly generated keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAlgorithm {
    #[default]
    EcdsaP256,
    EcdsaP384,
    Ed25519,
}

/// An extension copied verbatim into the certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSpec {
    pub oid: Vec<u64>,
    pub critical: bool,
    pub value: Vec<u8>,
}

/// Everything the signer needs to issue one certificate.
///
/// Policy has already been applied; the signer encodes what it is given.
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    /// PEM CSR carrying the subject public key.
    pub csr_pem: String,
    pub subject: Vec<(NameAttribute, String)>,
    pub sans: SubjectAltNames,
    /// Big-endian serial, top bit clear.
    pub serial: Vec<u8>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub key_usages: Vec<KeyUsage>,
    pub ext_key_usages: Vec<ExtKeyUsage>,
    pub is_ca: bool,
    pub max_path_len: Option<u8>,
    pub ocsp_no_check: bool,
    pub issuer_urls: Vec<String>,
    pub ocsp_urls: Vec<String>,
    pub crl_urls: Vec<String>,
    pub extensions: Vec<ExtensionSpec>,
}

/// A freshly signed certificate.
#[derive(Debug, Clone)]
pub struct SignedCertificate {
    pub der: Vec<u8>,
    pub pem: String,
}

/// One entry of a CRL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedEntry {
    /// Big-endian serial.
    pub serial: Vec<u8>,
    pub revoked_at: DateTime<Utc>,
    pub reason: RevocationReason,
}

/// A generated key and the CSR it signed.
#[derive(Clone)]
pub struct GeneratedKey {
    pub key_label: String,
    pub csr_pem: String,
    pub key_pem: String,
}

impl fmt::Debug for GeneratedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedKey")
            .field("key_label", &self.key_label)
            .field("csr_pem", &self.csr_pem)
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

/// The private half of an issuer.
#[async_trait]
pub trait IssuerSigner: Send + Sync {
    /// Algorithm of signatures made by [`sign_message`](Self::sign_message).
    fn signature_algorithm(&self) -> SignatureAlgorithm;

    async fn sign_certificate(&self, template: &CertificateTemplate)
        -> CryptoResult<SignedCertificate>;

    /// Build and sign a CRL; returns DER.
    async fn create_crl(
        &self,
        entries: &[RevokedEntry],
        this_update: DateTime<Utc>,
        next_update: DateTime<Utc>,
        crl_number: u64,
    ) -> CryptoResult<Vec<u8>>;

    /// Sign raw bytes.
    async fn sign_message(&self, message: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Build and sign a basic OCSP response; returns DER.
    async fn sign_ocsp(&self, request: &OcspSignRequest) -> CryptoResult<Vec<u8>> {
        let tbs = ocsp::encode_response_data(request);
        let signature = self.sign_message(&tbs).await?;
        Ok(ocsp::encode_basic_response(
            &tbs,
            self.signature_algorithm(),
            &signature,
        ))
    }
}

/// Key storage able to create signers and new keys.
#[async_trait]
pub trait CryptoBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Build a signer from a PEM private key and the matching certificate.
    async fn signer_from_key_material(
        &self,
        key_pem: &str,
        cert_pem: &str,
    ) -> CryptoResult<Arc<dyn IssuerSigner>>;

    /// Generate a key and a CSR for it with `common_name` as subject.
    async fn generate_key_and_request(
        &self,
        key_label: &str,
        algorithm: KeyAlgorithm,
        common_name: &str,
    ) -> CryptoResult<GeneratedKey>;
}

/// Backends by `manufacturer[/model]`, with a default.
#[derive(Clone)]
pub struct CryptoProviders {
    default: Arc<dyn CryptoBackend>,
    providers: HashMap<String, Arc<dyn CryptoBackend>>,
}

impl CryptoProviders {
    pub fn new(default: Arc<dyn CryptoBackend>) -> Self {
        Self {
            default,
            providers: HashMap::new(),
        }
    }

    /// Register a backend under a manufacturer and optional model.
    pub fn register(&mut self, manufacturer: &str, model: Option<&str>, backend: Arc<dyn CryptoBackend>) {
        self.providers.insert(provider_key(manufacturer, model), backend);
    }

    pub fn default_backend(&self) -> Arc<dyn CryptoBackend> {
        Arc::clone(&self.default)
    }

    /// Select a backend; an empty manufacturer selects the default.
    ///
    /// A model-specific entry wins over the manufacturer-wide one.
    pub fn select(&self, manufacturer: &str, model: &str) -> CryptoResult<Arc<dyn CryptoBackend>> {
        if manufacturer.is_empty() {
            return Ok(self.default_backend());
        }
        let model = Some(model).filter(|m| !m.is_empty());
        self.providers
            .get(&provider_key(manufacturer, model))
            .or_else(|| self.providers.get(&provider_key(manufacturer, None)))
            .cloned()
            .ok_or_else(|| {
                CryptoError::Unsupported(format!("no crypto provider for {manufacturer:?}"))
            })
    }
}

impl Default for CryptoProviders {
    fn default() -> Self {
        Self::new(Arc::new(SoftwareBackend::new()))
    }
}

fn provider_key(manufacturer: &str, model: Option<&str>) -> String {
    match model {
        Some(model) => format!("{}/{}", manufacturer.to_lowercase(), model.to_lowercase()),
        None => manufacturer.to_lowercase(),
    }
}
