//! A live issuing authority: certificate chain, signer and bound profiles.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use xavyo_ca_db::IssuerStatus;

use crate::config::{AiaConfig, IssuerConfig, IssuerKind, IssuerMaterial, ISSUER_ID_PLACEHOLDER};
use crate::crypto::IssuerSigner;
use crate::error::{CaError, CaResult};
use crate::ocsp::HashAlgorithm;
use crate::profile::{CertProfile, ProfileCatalog};
use crate::x509::{self, CertificateInfo};

/// AIA, CRL and OCSP settings with `${ISSUER_ID}` expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuerUrls {
    pub issuer: Vec<String>,
    pub crl: Vec<String>,
    pub ocsp: Vec<String>,
    pub crl_expiry: Duration,
    pub ocsp_expiry: Duration,
    pub crl_renewal: Duration,
}

impl IssuerUrls {
    fn resolve(aia: &AiaConfig, issuer_id: &str) -> Self {
        let expand = |template: &str| -> Vec<String> {
            let template = template.trim();
            if template.is_empty() {
                Vec::new()
            } else {
                vec![template.replace(ISSUER_ID_PLACEHOLDER, issuer_id)]
            }
        };
        Self {
            issuer: expand(&aia.issuer_url),
            crl: expand(&aia.crl_url),
            ocsp: expand(&aia.ocsp_url),
            crl_expiry: aia.crl_expiry,
            ocsp_expiry: aia.ocsp_expiry,
            crl_renewal: aia.crl_renewal,
        }
    }
}

#[derive(Debug, Clone)]
struct OcspHashes {
    algorithm: HashAlgorithm,
    key_hash: Vec<u8>,
    name_hash: Vec<u8>,
}

/// An issuing authority as held by the registry.
///
/// Values are immutable; a status change produces a new value that the
/// registry publishes in place of the old one.
#[derive(Clone)]
pub struct Issuer {
    label: String,
    kind: IssuerKind,
    status: IssuerStatus,
    config: IssuerConfig,
    cert_pem: String,
    ca_bundle_pem: String,
    root_bundle_pem: String,
    cert: Arc<CertificateInfo>,
    signer: Arc<dyn IssuerSigner>,
    profiles: ProfileCatalog,
    urls: IssuerUrls,
    ocsp_hashes: Vec<OcspHashes>,
    responder_key_hash: Vec<u8>,
}

impl std::fmt::Debug for Issuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Issuer")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("subject", &self.cert.subject)
            .field("skid", &self.cert.skid)
            .field("profiles", &self.profiles.names())
            .finish_non_exhaustive()
    }
}

impl Issuer {
    /// Assemble an issuer from its configuration, loaded material, signer and
    /// compiled profiles. `default_aia` applies when the configuration has no
    /// `aia` section of its own.
    pub fn create(
        config: IssuerConfig,
        material: IssuerMaterial,
        signer: Arc<dyn IssuerSigner>,
        profiles: ProfileCatalog,
        default_aia: &AiaConfig,
    ) -> CaResult<Self> {
        if config.label.trim().is_empty() {
            return Err(CaError::invalid_argument("issuer label is required"));
        }
        let cert = x509::certificate_info_from_pem(&material.cert_pem).map_err(|e| {
            CaError::invalid_argument(format!("issuer {:?}: {e}", config.label))
        })?;
        if !cert.is_ca {
            return Err(CaError::invalid_argument(format!(
                "issuer {:?}: certificate is not a CA",
                config.label
            )));
        }

        let root_bundle_pem = if material.root_bundle_pem.trim().is_empty() && cert.is_self_signed()
        {
            material.cert_pem.clone()
        } else {
            material.root_bundle_pem.clone()
        };

        let urls = IssuerUrls::resolve(config.aia.as_ref().unwrap_or(default_aia), &cert.skid);
        let ocsp_hashes = HashAlgorithm::ALL
            .iter()
            .map(|alg| OcspHashes {
                algorithm: *alg,
                key_hash: alg.digest(&cert.public_key),
                name_hash: alg.digest(&cert.raw_subject),
            })
            .collect();
        let responder_key_hash = x509::sha1_digest(&cert.public_key);

        Ok(Self {
            label: config.label.clone(),
            kind: config.kind,
            status: IssuerStatus::Active,
            cert_pem: material.cert_pem,
            ca_bundle_pem: material.ca_bundle_pem,
            root_bundle_pem,
            config,
            cert: Arc::new(cert),
            signer,
            profiles,
            urls,
            ocsp_hashes,
            responder_key_hash,
        })
    }

    /// A copy of this issuer with another status.
    #[must_use]
    pub fn with_status(&self, status: IssuerStatus) -> Self {
        let mut issuer = self.clone();
        issuer.status = status;
        issuer
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn kind(&self) -> IssuerKind {
        self.kind
    }

    #[must_use]
    pub fn status(&self) -> IssuerStatus {
        self.status
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == IssuerStatus::Active
    }

    #[must_use]
    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Subject key identifier of the issuer certificate; the IKID of every
    /// certificate it signs.
    #[must_use]
    pub fn skid(&self) -> &str {
        &self.cert.skid
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.cert.subject
    }

    #[must_use]
    pub fn not_after(&self) -> DateTime<Utc> {
        self.cert.not_after
    }

    #[must_use]
    pub fn certificate(&self) -> &CertificateInfo {
        &self.cert
    }

    #[must_use]
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    #[must_use]
    pub fn ca_bundle_pem(&self) -> &str {
        &self.ca_bundle_pem
    }

    #[must_use]
    pub fn root_bundle_pem(&self) -> &str {
        &self.root_bundle_pem
    }

    /// Issuer certificate followed by its intermediates.
    #[must_use]
    pub fn chain_pem(&self) -> String {
        x509::join_pem(&[&self.cert_pem, &self.ca_bundle_pem])
    }

    #[must_use]
    pub fn signer(&self) -> &Arc<dyn IssuerSigner> {
        &self.signer
    }

    #[must_use]
    pub fn profiles(&self) -> &ProfileCatalog {
        &self.profiles
    }

    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&Arc<CertProfile>> {
        self.profiles.get(name)
    }

    #[must_use]
    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains(name)
    }

    /// Whether `name` is bound to this issuer specifically rather than through
    /// a wildcard profile.
    #[must_use]
    pub fn owns_profile(&self, name: &str) -> bool {
        self.profiles.get(name).is_some_and(|p| !p.is_wildcard())
    }

    #[must_use]
    pub fn urls(&self) -> &IssuerUrls {
        &self.urls
    }

    /// SHA-1 of the issuer public key, used as OCSP responder ID.
    #[must_use]
    pub fn responder_key_hash(&self) -> &[u8] {
        &self.responder_key_hash
    }

    #[must_use]
    pub fn matches_key_hash(&self, algorithm: HashAlgorithm, hash: &[u8]) -> bool {
        self.ocsp_hashes
            .iter()
            .any(|h| h.algorithm == algorithm && h.key_hash == hash)
    }

    #[must_use]
    pub fn matches_name_hash(&self, algorithm: HashAlgorithm, hash: &[u8]) -> bool {
        self.ocsp_hashes
            .iter()
            .any(|h| h.algorithm == algorithm && h.name_hash == hash)
    }

    /// Public view of the issuer.
    #[must_use]
    pub fn info(&self) -> IssuerInfo {
        IssuerInfo {
            label: self.label.clone(),
            kind: self.kind,
            status: self.status,
            subject: self.cert.subject.clone(),
            skid: self.cert.skid.clone(),
            not_before: self.cert.not_before,
            not_after: self.cert.not_after,
            certificate: self.cert_pem.clone(),
            intermediates: self.ca_bundle_pem.clone(),
            root: self.root_bundle_pem.clone(),
            profiles: self.profiles.names(),
            issuer_urls: self.urls.issuer.clone(),
            crl_urls: self.urls.crl.clone(),
            ocsp_urls: self.urls.ocsp.clone(),
        }
    }
}

/// Issuer as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuerInfo {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: IssuerKind,
    pub status: IssuerStatus,
    pub subject: String,
    pub skid: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub certificate: String,
    pub intermediates: String,
    pub root: String,
    pub profiles: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issuer_urls: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub crl_urls: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ocsp_urls: Vec<String>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeMap;

    use super::*;
    use crate::crypto::software::{create_root_ca, SoftwareSigner};
    use crate::crypto::KeyAlgorithm;
    use crate::profile::CertProfileConfig;

    pub fn server_profile() -> CertProfileConfig {
        CertProfileConfig {
            usages: vec!["signing".to_string(), "server auth".to_string()],
            ..CertProfileConfig::default()
        }
    }

    /// A self-signed root issuer carrying the given profile names.
    pub fn root_issuer(label: &str, profiles: &[&str]) -> Issuer {
        root_issuer_with_signer(label, profiles, |signer| signer)
    }

    /// Like [`root_issuer`], with the software signer wrapped by `wrap`.
    pub fn root_issuer_with_signer(
        label: &str,
        profiles: &[&str],
        wrap: impl FnOnce(Arc<dyn IssuerSigner>) -> Arc<dyn IssuerSigner>,
    ) -> Issuer {
        let (cert_pem, key_pem) =
            create_root_ca(label, KeyAlgorithm::EcdsaP256, chrono::Duration::days(365)).unwrap();
        let signer: Arc<dyn IssuerSigner> =
            Arc::new(SoftwareSigner::new(&key_pem, &cert_pem).unwrap());
        let signer = wrap(signer);
        let configs: BTreeMap<String, CertProfileConfig> = profiles
            .iter()
            .map(|name| (name.to_string(), server_profile()))
            .collect();
        let config = IssuerConfig {
            label: label.to_string(),
            ..IssuerConfig::default()
        };
        let material = IssuerMaterial {
            cert_pem,
            key_pem,
            ca_bundle_pem: String::new(),
            root_bundle_pem: String::new(),
        };
        let aia = AiaConfig {
            crl_url: "http://ca.example.com/crl/${ISSUER_ID}".to_string(),
            ..AiaConfig::default()
        };
        Issuer::create(
            config,
            material,
            signer,
            ProfileCatalog::compile(&configs).unwrap(),
            &aia,
        )
        .unwrap()
    }
}
