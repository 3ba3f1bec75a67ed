//! Certificate signing with profile enforcement.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use xavyo_ca_db::{CaDb, Certificate, DbError, IdGenerator};

use crate::crypto::software::random_serial;
use crate::crypto::{CertificateTemplate, ExtensionSpec};
use crate::error::{CaError, CaResult};
use crate::issuer::Issuer;
use crate::metrics::CaMetrics;
use crate::profile::{parse_oid, CertProfile};
use crate::publisher::Publisher;
use crate::registry::IssuerRegistry;
use crate::x509::{self, NameAttribute, SubjectAltNames, OID_SUBJECT_ALT_NAME};

/// Encoding of [`SignRequest::request`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestFormat {
    #[default]
    Pem,
    /// Standard base64 of the DER request.
    Der,
}

/// One subject name entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectName {
    #[serde(rename = "C", alias = "country")]
    pub country: String,
    #[serde(rename = "ST", alias = "state")]
    pub state: String,
    #[serde(rename = "L", alias = "locality")]
    pub locality: String,
    #[serde(rename = "O", alias = "organisation")]
    pub organisation: String,
    #[serde(rename = "OU", alias = "organisational_unit")]
    pub organisational_unit: String,
}

/// Subject override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subject {
    #[serde(rename = "CN", alias = "common_name")]
    pub common_name: String,
    pub names: Vec<SubjectName>,
}

impl Subject {
    fn attributes(&self) -> Vec<(NameAttribute, String)> {
        let mut attrs = Vec::new();
        for name in &self.names {
            for (attr, value) in [
                (NameAttribute::Country, &name.country),
                (NameAttribute::Province, &name.state),
                (NameAttribute::Locality, &name.locality),
                (NameAttribute::Organization, &name.organisation),
                (NameAttribute::OrganizationalUnit, &name.organisational_unit),
            ] {
                if !value.is_empty() {
                    attrs.push((attr, value.clone()));
                }
            }
        }
        if !self.common_name.is_empty() {
            attrs.push((NameAttribute::CommonName, self.common_name.clone()));
        }
        attrs
    }
}

/// An extension supplied with the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestExtension {
    /// Dotted OID.
    pub id: String,
    #[serde(default)]
    pub critical: bool,
    /// Standard base64 of the DER extension value.
    pub value: String,
}

/// A certificate signing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignRequest {
    pub request: String,
    pub request_format: RequestFormat,
    pub profile: String,
    pub issuer_label: Option<String>,
    pub subject: Option<Subject>,
    pub san: Vec<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub extensions: Vec<RequestExtension>,
    pub org_id: i64,
    pub label: String,
    pub metadata: HashMap<String, String>,
}

/// Validates requests against issuer and profile, signs, records and
/// publishes certificates.
pub struct SigningEngine {
    registry: Arc<IssuerRegistry>,
    db: Arc<dyn CaDb>,
    ids: Arc<dyn IdGenerator>,
    publisher: Option<Arc<dyn Publisher>>,
    metrics: CaMetrics,
}

impl SigningEngine {
    pub fn new(
        registry: Arc<IssuerRegistry>,
        db: Arc<dyn CaDb>,
        ids: Arc<dyn IdGenerator>,
        publisher: Option<Arc<dyn Publisher>>,
        metrics: CaMetrics,
    ) -> Self {
        Self {
            registry,
            db,
            ids,
            publisher,
            metrics,
        }
    }

    /// Sign a request and return the durable certificate record.
    pub async fn sign(&self, req: &SignRequest) -> CaResult<Certificate> {
        if req.profile.is_empty() {
            return Err(CaError::invalid_argument("missing profile"));
        }
        if req.request.trim().is_empty() {
            return Err(CaError::invalid_argument("missing request"));
        }

        let csr_pem = decode_request(&req.request, req.request_format)?;
        let issuer = self.resolve_issuer(req)?;
        let profile = issuer.profile(&req.profile).cloned().ok_or_else(|| {
            CaError::invalid_argument(format!(
                "issuer {:?} does not support profile {:?}",
                issuer.label(),
                req.profile
            ))
        })?;

        let template = build_template(&issuer, &profile, req, csr_pem)?;

        let signed = match issuer.signer().sign_certificate(&template).await {
            Ok(signed) => signed,
            Err(e) => {
                self.metrics
                    .cert_sign_failed
                    .get_or_create(&CaMetrics::signing(&req.profile, issuer.label()))
                    .inc();
                error!(
                    issuer = %issuer.label(),
                    profile = %req.profile,
                    error = %e,
                    "Failed to sign certificate"
                );
                return Err(CaError::internal("failed to sign certificate"));
            }
        };

        let info = x509::certificate_info(&signed.der).map_err(|e| {
            error!(error = %e, "Failed to parse signed certificate");
            CaError::internal("failed to parse signed certificate")
        })?;

        let mut cert = Certificate {
            id: self.ids.next_id(),
            org_id: req.org_id,
            skid: info.skid,
            ikid: info.akid.unwrap_or_else(|| issuer.skid().to_string()),
            serial_number: info.serial_number,
            not_before: info.not_before,
            not_after: info.not_after,
            subject: info.subject,
            issuer: info.issuer,
            sha256: info.sha256,
            profile: req.profile.clone(),
            pem: signed.pem,
            issuers_pem: issuer.chain_pem(),
            label: req.label.clone(),
            locations: Vec::new(),
            metadata: req.metadata.clone(),
        };
        if let Some(publisher) = &self.publisher {
            cert.locations.push(publisher.certificate_location(&cert));
        }

        let cert = self.register(&cert).await?;
        self.metrics
            .cert_issued
            .get_or_create(&CaMetrics::signing(&req.profile, issuer.label()))
            .inc();
        info!(
            id = cert.id,
            issuer = %issuer.label(),
            profile = %cert.profile,
            ikid = %cert.ikid,
            serial = %cert.serial_number,
            subject = %cert.subject,
            "Certificate issued"
        );

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish_certificate(&cert).await {
                self.metrics
                    .cert_publish_failed
                    .get_or_create(&CaMetrics::signing(&req.profile, issuer.label()))
                    .inc();
                error!(id = cert.id, error = %e, "Failed to publish certificate");
                return Err(CaError::internal("failed to publish certificate"));
            }
        }

        Ok(cert)
    }

    fn resolve_issuer(&self, req: &SignRequest) -> CaResult<Arc<Issuer>> {
        let issuer = match req.issuer_label.as_deref().filter(|l| !l.is_empty()) {
            Some(label) => self.registry.resolve_by_label(label),
            None => self.registry.resolve_by_profile(&req.profile),
        }
        .map_err(|e| {
            warn!(profile = %req.profile, error = %e, "Issuer not resolved");
            CaError::invalid_argument(format!(
                "issuer not found for profile {:?}",
                req.profile
            ))
        })?;

        if !issuer.is_active() {
            return Err(CaError::invalid_argument(format!(
                "issuer {:?} is archived",
                issuer.label()
            )));
        }
        Ok(issuer)
    }

    async fn register(&self, cert: &Certificate) -> CaResult<Certificate> {
        self.db.register_certificate(cert).await.map_err(|e| match e {
            DbError::Conflict(_) => CaError::already_exists("the key was already used"),
            other => {
                error!(ikid = %cert.ikid, serial = %cert.serial_number, error = %other, "Failed to register certificate");
                CaError::internal("failed to register certificate")
            }
        })
    }
}

fn decode_request(request: &str, format: RequestFormat) -> CaResult<String> {
    match format {
        RequestFormat::Pem => Ok(request.to_string()),
        RequestFormat::Der => {
            let der = STANDARD
                .decode(request.trim())
                .map_err(|_| CaError::invalid_argument("request is not valid base64"))?;
            Ok(x509::der_to_pem(x509::PEM_CERTIFICATE_REQUEST, &der))
        }
    }
}

/// Apply profile policy to a request.
fn build_template(
    issuer: &Issuer,
    profile: &CertProfile,
    req: &SignRequest,
    csr_pem: String,
) -> CaResult<CertificateTemplate> {
    let csr = x509::parse_request(&csr_pem)
        .map_err(|e| CaError::invalid_argument(format!("invalid request: {e}")))?;

    for oid in &csr.extension_oids {
        if oid.as_slice() != OID_SUBJECT_ALT_NAME && !profile.permits_csr_extension(oid) {
            return Err(CaError::invalid_argument(format!(
                "extension {} is not allowed by profile {:?}",
                format_oid(oid),
                profile.name()
            )));
        }
    }

    let allowed = profile.allowed_fields();

    let mut subject = match &req.subject {
        Some(subject) => subject.attributes(),
        None => csr.subject.clone(),
    };
    if !allowed.subject {
        subject.retain(|(attr, _)| *attr == NameAttribute::CommonName);
    }
    if let Some((_, cn)) = subject.iter().find(|(a, _)| *a == NameAttribute::CommonName) {
        profile.check_common_name(cn)?;
    }

    let mut sans = if req.san.is_empty() {
        csr.sans.clone()
    } else {
        SubjectAltNames::classify(&req.san)
    };
    if !allowed.dns {
        sans.dns.clear();
    }
    if !allowed.ip {
        sans.ips.clear();
    }
    if !allowed.email {
        sans.emails.clear();
    }
    for dns in &sans.dns {
        profile.check_dns_name(dns)?;
    }
    for email in &sans.emails {
        profile.check_email(email)?;
    }

    let mut extensions = Vec::with_capacity(req.extensions.len());
    for ext in &req.extensions {
        let oid = parse_oid(&ext.id)
            .ok_or_else(|| CaError::invalid_argument(format!("invalid extension id {:?}", ext.id)))?;
        if !profile.permits_extension(&oid) {
            return Err(CaError::invalid_argument(format!(
                "extension {} is not allowed by profile {:?}",
                ext.id,
                profile.name()
            )));
        }
        let value = STANDARD.decode(ext.value.trim()).map_err(|_| {
            CaError::invalid_argument(format!("extension {} value is not valid base64", ext.id))
        })?;
        extensions.push(ExtensionSpec {
            oid,
            critical: ext.critical,
            value,
        });
    }

    let (not_before, not_after) = validity(issuer, profile, req)?;
    let ca = profile.ca_constraint();
    let urls = issuer.urls();

    Ok(CertificateTemplate {
        csr_pem,
        subject,
        sans,
        serial: random_serial(),
        not_before,
        not_after,
        key_usages: profile.key_usages().to_vec(),
        ext_key_usages: profile.ext_key_usages().to_vec(),
        is_ca: ca.is_ca,
        max_path_len: ca.max_path_len,
        ocsp_no_check: profile.ocsp_no_check(),
        issuer_urls: urls.issuer.clone(),
        ocsp_urls: urls.ocsp.clone(),
        crl_urls: urls.crl.clone(),
        extensions,
    })
}

/// Validity window: explicit values win, otherwise `now - backdate` to
/// `now + expiry`. The end never exceeds the issuer's own expiry.
fn validity(
    issuer: &Issuer,
    profile: &CertProfile,
    req: &SignRequest,
) -> CaResult<(DateTime<Utc>, DateTime<Utc>)> {
    let now = Utc::now().trunc_subsecs(0);
    let not_before = req
        .not_before
        .map_or(now - profile.backdate(), |t| t.trunc_subsecs(0));
    let not_after = req
        .not_after
        .map_or(now + profile.expiry(), |t| t.trunc_subsecs(0))
        .min(issuer.not_after());
    if not_after <= not_before {
        return Err(CaError::invalid_argument(
            "not_after must be later than not_before",
        ));
    }
    Ok((not_before, not_after))
}

fn format_oid(oid: &[u64]) -> String {
    oid.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CryptoError, CryptoResult, IssuerSigner, RevokedEntry, SignedCertificate};
    use crate::issuer::fixtures::{root_issuer, root_issuer_with_signer};
    use crate::ocsp::SignatureAlgorithm;
    use crate::publisher::PublishError;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use xavyo_ca_db::{MemoryCaDb, SnowflakeIdGenerator};

    fn csr(cn: &str, sans: &[&str]) -> String {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params =
            rcgen::CertificateParams::new(sans.iter().map(|s| s.to_string()).collect::<Vec<_>>())
                .unwrap();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, cn);
        params.serialize_request(&key).unwrap().pem().unwrap()
    }

    /// Refuses to sign certificates; everything else goes to `inner`.
    struct BrokenSigner {
        inner: Arc<dyn IssuerSigner>,
    }

    #[async_trait]
    impl IssuerSigner for BrokenSigner {
        fn signature_algorithm(&self) -> SignatureAlgorithm {
            self.inner.signature_algorithm()
        }

        async fn sign_certificate(
            &self,
            _template: &CertificateTemplate,
        ) -> CryptoResult<SignedCertificate> {
            Err(CryptoError::Signing("token removed".to_string()))
        }

        async fn create_crl(
            &self,
            entries: &[RevokedEntry],
            this_update: DateTime<Utc>,
            next_update: DateTime<Utc>,
            crl_number: u64,
        ) -> CryptoResult<Vec<u8>> {
            self.inner
                .create_crl(entries, this_update, next_update, crl_number)
                .await
        }

        async fn sign_message(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
            self.inner.sign_message(message).await
        }
    }

    /// Records locations but cannot publish anything.
    struct OfflinePublisher;

    #[async_trait]
    impl Publisher for OfflinePublisher {
        fn certificate_location(&self, cert: &Certificate) -> String {
            format!("mem://{}", cert.serial_number)
        }

        async fn publish_certificate(&self, _cert: &Certificate) -> Result<(), PublishError> {
            Err(PublishError::Io {
                path: PathBuf::from("/certs"),
                source: std::io::Error::other("disk full"),
            })
        }

        async fn publish_crl(&self, _ikid: &str, _der: &[u8]) -> Result<(), PublishError> {
            Ok(())
        }
    }

    fn engine_with(
        issuer: Issuer,
        publisher: Option<Arc<dyn Publisher>>,
        metrics: CaMetrics,
    ) -> (SigningEngine, Arc<IssuerRegistry>, Arc<MemoryCaDb>) {
        let registry = Arc::new(IssuerRegistry::new());
        registry.add(issuer).unwrap();
        let db = Arc::new(MemoryCaDb::new());
        let engine = SigningEngine::new(
            Arc::clone(&registry),
            db.clone(),
            Arc::new(SnowflakeIdGenerator::new(1)),
            publisher,
            metrics,
        );
        (engine, registry, db)
    }

    fn engine() -> (SigningEngine, Arc<IssuerRegistry>, Arc<MemoryCaDb>) {
        engine_with(root_issuer("root", &["server"]), None, CaMetrics::new())
    }

    fn request(csr_pem: String) -> SignRequest {
        SignRequest {
            request: csr_pem,
            profile: "server".to_string(),
            org_id: 42,
            label: "web".to_string(),
            ..SignRequest::default()
        }
    }

    #[tokio::test]
    async fn test_sign_records_certificate() {
        let (engine, registry, db) = engine();
        let cert = engine
            .sign(&request(csr("web.example.com", &["web.example.com"])))
            .await
            .unwrap();

        let issuer = registry.resolve_by_label("root").unwrap();
        assert_eq!(cert.ikid, issuer.skid());
        assert_eq!(cert.issuer, issuer.subject());
        assert_eq!(cert.org_id, 42);
        assert_eq!(cert.label, "web");
        assert_eq!(cert.profile, "server");
        assert!(cert.subject.contains("web.example.com"));
        assert_eq!(db.get_certificate(cert.id).await.unwrap(), cert);
        assert!(cert.not_after <= issuer.not_after());
    }

    #[tokio::test]
    async fn test_signer_failure_is_internal() {
        let metrics = CaMetrics::new();
        let issuer = root_issuer_with_signer("root", &["server"], |inner| -> Arc<dyn IssuerSigner> {
            Arc::new(BrokenSigner { inner })
        });
        let (engine, _, db) = engine_with(issuer, None, metrics.clone());

        let err = engine.sign(&request(csr("x", &[]))).await.unwrap_err();
        assert_eq!(err, CaError::internal("failed to sign certificate"));
        assert_eq!(db.certificates_count(), 0);

        let labels = CaMetrics::signing("server", "root");
        assert_eq!(metrics.cert_sign_failed.get_or_create(&labels).get(), 1);
        assert_eq!(metrics.cert_issued.get_or_create(&labels).get(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_stored_certificate() {
        let metrics = CaMetrics::new();
        let publisher: Arc<dyn Publisher> = Arc::new(OfflinePublisher);
        let (engine, _, db) = engine_with(
            root_issuer("root", &["server"]),
            Some(publisher),
            metrics.clone(),
        );

        let err = engine
            .sign(&request(csr("web.example.com", &["web.example.com"])))
            .await
            .unwrap_err();
        assert_eq!(err, CaError::internal("failed to publish certificate"));
        assert_eq!(db.certificates_count(), 1);

        let labels = CaMetrics::signing("server", "root");
        assert_eq!(metrics.cert_issued.get_or_create(&labels).get(), 1);
        assert_eq!(metrics.cert_publish_failed.get_or_create(&labels).get(), 1);
        assert_eq!(metrics.cert_sign_failed.get_or_create(&labels).get(), 0);
    }

    #[tokio::test]
    async fn test_der_request_is_decoded() {
        let (engine, _, _) = engine();
        let der = x509::pem_to_der(&csr("der", &[]), x509::PEM_CERTIFICATE_REQUEST).unwrap();
        let mut req = request(STANDARD.encode(der));
        req.request_format = RequestFormat::Der;
        assert!(engine.sign(&req).await.is_ok());

        req.request = "!!not base64!!".to_string();
        assert!(matches!(
            engine.sign(&req).await,
            Err(CaError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected() {
        let (engine, _, _) = engine();
        let mut req = request(csr("x", &[]));
        req.profile.clear();
        assert_eq!(
            engine.sign(&req).await.unwrap_err(),
            CaError::invalid_argument("missing profile")
        );

        let mut req = request(String::new());
        req.profile = "server".to_string();
        assert_eq!(
            engine.sign(&req).await.unwrap_err(),
            CaError::invalid_argument("missing request")
        );
    }

    #[tokio::test]
    async fn test_unknown_profile_on_explicit_issuer() {
        let (engine, _, _) = engine();
        let mut req = request(csr("x", &[]));
        req.profile = "client".to_string();
        req.issuer_label = Some("root".to_string());
        let err = engine.sign(&req).await.unwrap_err();
        assert_eq!(
            err,
            CaError::invalid_argument("issuer \"root\" does not support profile \"client\"")
        );
    }

    #[tokio::test]
    async fn test_archived_issuer_refuses_signing() {
        let (engine, registry, _) = engine();
        registry
            .set_status("root", xavyo_ca_db::IssuerStatus::Archived)
            .unwrap();

        let mut req = request(csr("x", &[]));
        req.issuer_label = Some("root".to_string());
        assert!(matches!(
            engine.sign(&req).await,
            Err(CaError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_explicit_validity_and_inverted_window() {
        let (engine, _, _) = engine();
        let start = Utc::now().trunc_subsecs(0) - chrono::Duration::hours(1);
        let mut req = request(csr("x", &[]));
        req.not_before = Some(start);
        req.not_after = Some(start + chrono::Duration::days(2));
        let cert = engine.sign(&req).await.unwrap();
        assert_eq!(cert.not_before, start);
        assert_eq!(cert.not_after, start + chrono::Duration::days(2));

        let mut req = request(csr("y", &[]));
        req.not_before = Some(start);
        req.not_after = Some(start - chrono::Duration::seconds(1));
        assert!(matches!(
            engine.sign(&req).await,
            Err(CaError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_request_extension_requires_allow_list() {
        let (engine, _, _) = engine();
        let mut req = request(csr("x", &[]));
        req.extensions = vec![RequestExtension {
            id: "1.2.3.4".to_string(),
            critical: false,
            value: STANDARD.encode([0x05, 0x00]),
        }];
        let err = engine.sign(&req).await.unwrap_err();
        assert!(err.message().contains("1.2.3.4"));
    }

    #[test]
    fn test_subject_attribute_order() {
        let subject = Subject {
            common_name: "svc".to_string(),
            names: vec![SubjectName {
                country: "FR".to_string(),
                organisation: "Acme".to_string(),
                ..SubjectName::default()
            }],
        };
        assert_eq!(
            subject.attributes(),
            vec![
                (NameAttribute::Country, "FR".to_string()),
                (NameAttribute::Organization, "Acme".to_string()),
                (NameAttribute::CommonName, "svc".to_string()),
            ]
        );
    }

    #[test]
    fn test_sign_request_json() {
        let req: SignRequest = serde_json::from_str(
            r#"{"request":"pem","profile":"server","subject":{"CN":"svc","names":[{"O":"Acme"}]},"san":["a.example.com"]}"#,
        )
        .unwrap();
        assert_eq!(req.request_format, RequestFormat::Pem);
        assert_eq!(req.subject.unwrap().names[0].organisation, "Acme");
        assert_eq!(req.san, vec!["a.example.com".to_string()]);
    }
}
