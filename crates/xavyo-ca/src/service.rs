//! The certificate authority facade.
//!
//! [`CaService`] wires the registry, signing, revocation, CRL, OCSP and
//! delegated provisioning components over one store and exposes the
//! operations transports call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use prometheus_client::registry::Registry;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use xavyo_ca_db::{
    CaDb, Certificate, Crl, IdGenerator, MemoryCaDb, RevokedCertificate, RootCertificate,
    SnowflakeIdGenerator, Trust,
};

use crate::config::CaConfig;
use crate::crl::{spawn_periodic_publish, CrlBuilder, CrlPublishError, CrlRefreshQueue};
use crate::crypto::CryptoProviders;
use crate::error::{CaError, CaResult};
use crate::issuer::{Issuer, IssuerInfo};
use crate::metrics::CaMetrics;
use crate::profile::{CertProfileConfig, ProfileCatalog};
use crate::provisioner::DelegatedIssuerProvisioner;
use crate::publisher::{FilePublisher, Publisher};
use crate::registry::IssuerRegistry;
use crate::responder::OcspResponder;
use crate::revocation::{RevocationProcessor, RevokeRequest};
use crate::signing::{SignRequest, SigningEngine};
use crate::x509;

/// Page size of listings when the caller passes `0`.
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Largest page a listing returns.
pub const MAX_LIST_LIMIT: u32 = 500;

/// Profile assigned to the records of issuer certificates.
pub const ISSUER_CERT_PROFILE: &str = "ca";

fn list_limit(limit: u32) -> u32 {
    match limit {
        0 => DEFAULT_LIST_LIMIT,
        n => n.min(MAX_LIST_LIMIT),
    }
}

/// Issuer and policy serving a profile.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileInfo {
    pub name: String,
    pub issuer_label: String,
    pub issuer_certificate: String,
    pub profile: CertProfileConfig,
}

/// Certificates owned by one organization.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrgCertificates {
    pub certificates: Vec<Certificate>,
    pub revoked: Vec<RevokedCertificate>,
}

/// Builder for [`CaService`].
///
/// Unset parts default to an in-memory store, node `0` IDs, the software
/// crypto backend and a file publisher when `publisher.dir` is configured.
pub struct CaServiceBuilder {
    config: CaConfig,
    db: Option<Arc<dyn CaDb>>,
    ids: Option<Arc<dyn IdGenerator>>,
    providers: Option<CryptoProviders>,
    publisher: Option<Arc<dyn Publisher>>,
    metrics: Option<CaMetrics>,
}

impl CaServiceBuilder {
    #[must_use]
    pub fn db(mut self, db: Arc<dyn CaDb>) -> Self {
        self.db = Some(db);
        self
    }

    #[must_use]
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    #[must_use]
    pub fn providers(mut self, providers: CryptoProviders) -> Self {
        self.providers = Some(providers);
        self
    }

    #[must_use]
    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: CaMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Assemble the service and start the CRL refresh worker.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn build(self) -> CaService {
        let config = self.config;
        let db = self.db.unwrap_or_else(|| Arc::new(MemoryCaDb::new()));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(SnowflakeIdGenerator::new(0)));
        let providers = self.providers.unwrap_or_default();
        let metrics = self.metrics.unwrap_or_default();
        let publisher = self.publisher.or_else(|| {
            config.publisher.dir.as_ref().map(|dir| {
                Arc::new(FilePublisher::new(dir.clone(), config.publisher.base_url.clone()))
                    as Arc<dyn Publisher>
            })
        });

        let registry = Arc::new(IssuerRegistry::new());
        let signing = Arc::new(SigningEngine::new(
            Arc::clone(&registry),
            Arc::clone(&db),
            Arc::clone(&ids),
            publisher.clone(),
            metrics.clone(),
        ));
        let crl = Arc::new(CrlBuilder::new(
            Arc::clone(&registry),
            Arc::clone(&db),
            Arc::clone(&ids),
            publisher,
            metrics.clone(),
            config.crl_page_size,
        ));
        let (crl_queue, _worker) = CrlRefreshQueue::start(Arc::clone(&crl), config.crl_queue_capacity);
        let revocation = RevocationProcessor::new(Arc::clone(&db), crl_queue.clone(), metrics.clone());
        let responder = OcspResponder::new(Arc::clone(&registry), Arc::clone(&db));
        let provisioner = DelegatedIssuerProvisioner::new(
            Arc::clone(&registry),
            Arc::clone(&db),
            Arc::clone(&ids),
            Arc::clone(&signing),
            providers.clone(),
            config.delegated_issuers.clone(),
            config.cluster_name.clone(),
            config.aia.clone(),
        );

        CaService {
            config,
            db,
            ids,
            providers,
            metrics,
            registry,
            signing,
            revocation,
            crl,
            crl_queue,
            responder,
            provisioner,
        }
    }
}

/// The certificate authority.
pub struct CaService {
    config: CaConfig,
    db: Arc<dyn CaDb>,
    ids: Arc<dyn IdGenerator>,
    providers: CryptoProviders,
    metrics: CaMetrics,
    registry: Arc<IssuerRegistry>,
    signing: Arc<SigningEngine>,
    revocation: RevocationProcessor,
    crl: Arc<CrlBuilder>,
    crl_queue: CrlRefreshQueue,
    responder: OcspResponder,
    provisioner: DelegatedIssuerProvisioner,
}

impl CaService {
    #[must_use]
    pub fn builder(config: CaConfig) -> CaServiceBuilder {
        CaServiceBuilder {
            config,
            db: None,
            ids: None,
            providers: None,
            publisher: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CaConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<IssuerRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn db(&self) -> &Arc<dyn CaDb> {
        &self.db
    }

    /// Register the engine counters.
    pub fn register_metrics(&self, registry: &mut Registry) {
        self.metrics.register(registry);
    }

    // Startup

    /// Load configured issuers, record their certificates and the trusted
    /// roots, then restore stored delegated issuers.
    ///
    /// Safe to run against a store populated by a previous start: every
    /// record is upserted.
    pub async fn bootstrap(&self) -> CaResult<()> {
        for issuer_config in &self.config.issuers {
            let material = issuer_config.load_material().map_err(|e| {
                CaError::invalid_argument(format!("issuer {:?}: {e}", issuer_config.label))
            })?;
            let signer = self
                .providers
                .default_backend()
                .signer_from_key_material(&material.key_pem, &material.cert_pem)
                .await
                .map_err(|e| {
                    CaError::invalid_argument(format!("issuer {:?}: {e}", issuer_config.label))
                })?;
            let profiles = ProfileCatalog::compile(&self.config.profiles_for(issuer_config))
                .map_err(|e| {
                    CaError::invalid_argument(format!("issuer {:?}: {e}", issuer_config.label))
                })?;
            let issuer = Issuer::create(
                issuer_config.clone(),
                material,
                signer,
                profiles,
                &self.config.aia,
            )?;
            let issuer = self.registry.add(issuer)?;
            self.register_issuer_certificate(&issuer).await?;
        }

        self.register_roots(&self.config.private_roots, Trust::Private)
            .await?;
        self.register_roots(&self.config.public_roots, Trust::Public)
            .await?;

        let restored = self.provisioner.restore().await?;
        info!(
            issuers = self.registry.len(),
            delegated_restored = restored,
            "Certificate authority ready"
        );
        Ok(())
    }

    async fn register_issuer_certificate(&self, issuer: &Issuer) -> CaResult<()> {
        let info = issuer.certificate();
        let cert = Certificate {
            id: self.ids.next_id(),
            org_id: 0,
            skid: info.skid.clone(),
            ikid: info.akid.clone().unwrap_or_else(|| info.skid.clone()),
            serial_number: info.serial_number.clone(),
            not_before: info.not_before,
            not_after: info.not_after,
            subject: info.subject.clone(),
            issuer: info.issuer.clone(),
            sha256: info.sha256.clone(),
            profile: ISSUER_CERT_PROFILE.to_string(),
            pem: issuer.cert_pem().to_string(),
            issuers_pem: issuer.ca_bundle_pem().to_string(),
            label: issuer.label().to_string(),
            locations: Vec::new(),
            metadata: Default::default(),
        };
        self.db.register_certificate(&cert).await.map_err(|e| {
            error!(label = %issuer.label(), error = %e, "Failed to register issuer certificate");
            CaError::internal("failed to register issuer certificate")
        })?;
        Ok(())
    }

    async fn register_roots(&self, paths: &[PathBuf], trust: Trust) -> CaResult<()> {
        for path in paths {
            let Some(bundle) = read_optional(path).await? else {
                continue;
            };
            let certs = x509::certificates_from_pem_bundle(&bundle).map_err(|e| {
                CaError::invalid_argument(format!("root bundle {}: {e}", path.display()))
            })?;
            for cert in certs {
                let root = RootCertificate {
                    id: self.ids.next_id(),
                    skid: cert.skid.clone(),
                    not_before: cert.not_before,
                    not_after: cert.not_after,
                    subject: cert.subject.clone(),
                    sha256: cert.sha256.clone(),
                    trust,
                    pem: x509::der_to_pem(x509::PEM_CERTIFICATE, &cert.der),
                };
                self.db.register_root_certificate(&root).await.map_err(|e| {
                    error!(path = %path.display(), error = %e, "Failed to register root");
                    CaError::internal("failed to register root certificate")
                })?;
                info!(subject = %root.subject, ?trust, "Root certificate registered");
            }
        }
        Ok(())
    }

    /// Start one periodic CRL publisher per issuer that has a CRL URL and a
    /// non-zero renewal interval.
    pub fn schedule_crl_publishing(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.registry
            .list()
            .into_iter()
            .filter(|issuer| {
                let urls = issuer.urls();
                !urls.crl_renewal.is_zero() && !urls.crl.is_empty()
            })
            .map(|issuer| {
                spawn_periodic_publish(
                    Arc::clone(&self.crl),
                    issuer.skid().to_string(),
                    issuer.urls().crl_renewal,
                    shutdown.clone(),
                )
            })
            .collect()
    }

    // Certificates

    pub async fn sign_certificate(&self, req: &SignRequest) -> CaResult<Certificate> {
        self.signing.sign(req).await
    }

    pub async fn get_certificate(&self, id: i64) -> CaResult<Certificate> {
        self.db
            .get_certificate(id)
            .await
            .map_err(|e| lookup_error(&e, "unable to find certificate"))
    }

    /// First certificate with this subject key identifier.
    pub async fn get_certificate_by_skid(&self, skid: &str) -> CaResult<Certificate> {
        let certs = self
            .db
            .get_certificates_by_skid(skid)
            .await
            .map_err(|e| lookup_error(&e, "unable to find certificate"))?;
        certs
            .into_iter()
            .next()
            .ok_or_else(|| CaError::not_found("unable to find certificate"))
    }

    pub async fn update_certificate_label(&self, id: i64, label: &str) -> CaResult<Certificate> {
        self.db
            .update_certificate_label(id, label)
            .await
            .map_err(|e| lookup_error(&e, "unable to update certificate"))
    }

    pub async fn revoke_certificate(&self, req: &RevokeRequest) -> CaResult<RevokedCertificate> {
        self.revocation.revoke(req).await
    }

    pub async fn list_certificates(
        &self,
        ikid: &str,
        limit: u32,
        after: i64,
    ) -> CaResult<Vec<Certificate>> {
        self.db
            .list_certificates(ikid, list_limit(limit), after)
            .await
            .map_err(|e| list_error(&e))
    }

    pub async fn list_revoked_certificates(
        &self,
        ikid: &str,
        limit: u32,
        after: i64,
    ) -> CaResult<Vec<RevokedCertificate>> {
        self.db
            .list_revoked_certificates(ikid, list_limit(limit), after)
            .await
            .map_err(|e| list_error(&e))
    }

    /// Active and revoked certificates of an organization, one page each.
    pub async fn get_org_certificates(
        &self,
        org_id: i64,
        limit: u32,
        after: i64,
    ) -> CaResult<OrgCertificates> {
        let limit = list_limit(limit);
        let certificates = self
            .db
            .list_org_certificates(org_id, limit, after)
            .await
            .map_err(|e| list_error(&e))?;
        let revoked = self
            .db
            .list_org_revoked_certificates(org_id, limit, after)
            .await
            .map_err(|e| list_error(&e))?;
        Ok(OrgCertificates {
            certificates,
            revoked,
        })
    }

    // Revocation status

    pub async fn get_crl(&self, ikid: &str) -> CaResult<Crl> {
        if ikid.is_empty() {
            return Err(CaError::invalid_argument("missing ikid"));
        }
        self.crl.get(ikid).await
    }

    /// Regenerate the CRL of `ikid`, or of every issuer when empty.
    pub async fn publish_crls(&self, ikid: &str) -> Result<Vec<Crl>, CrlPublishError> {
        self.crl.build_and_publish(ikid).await
    }

    /// Wait for background CRL refreshes enqueued so far.
    pub async fn flush_crl_queue(&self) {
        self.crl_queue.flush().await;
    }

    pub async fn sign_ocsp(&self, der: &[u8]) -> CaResult<Vec<u8>> {
        self.responder.respond(der).await
    }

    // Issuers

    #[must_use]
    pub fn issuers(&self) -> Vec<IssuerInfo> {
        self.registry.list().iter().map(|i| i.info()).collect()
    }

    pub fn get_issuer(&self, label: &str) -> CaResult<IssuerInfo> {
        Ok(self.registry.resolve_by_label(label)?.info())
    }

    /// The issuer serving `profile`; with `label`, also check that it is
    /// that issuer.
    pub fn profile_info(&self, profile: &str, label: Option<&str>) -> CaResult<ProfileInfo> {
        if profile.is_empty() {
            return Err(CaError::invalid_argument("missing profile"));
        }
        let issuer = self
            .registry
            .resolve_by_profile(profile)
            .map_err(|_| CaError::not_found("profile not found"))?;
        if let Some(label) = label.filter(|l| !l.is_empty()) {
            if label != issuer.label() {
                return Err(CaError::not_found(format!(
                    "profile {profile:?} is served by {} issuer",
                    issuer.label()
                )));
            }
        }
        let compiled = issuer
            .profile(profile)
            .ok_or_else(|| CaError::not_found("profile not found"))?;

        Ok(ProfileInfo {
            name: profile.to_string(),
            issuer_label: issuer.label().to_string(),
            issuer_certificate: issuer.cert_pem().to_string(),
            profile: compiled.config().clone(),
        })
    }

    pub async fn register_delegated_issuer(&self, req: &SignRequest) -> CaResult<IssuerInfo> {
        self.provisioner.provision(req).await
    }

    pub async fn archive_delegated_issuer(&self, label: &str) -> CaResult<IssuerInfo> {
        self.provisioner.archive(label).await
    }

    pub async fn list_delegated_issuers(&self, limit: u32, after: i64) -> CaResult<Vec<IssuerInfo>> {
        self.provisioner.list(list_limit(limit), after).await
    }
}

async fn read_optional(path: &Path) -> CaResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Root bundle not found, skipping");
            Ok(None)
        }
        Err(e) => Err(CaError::invalid_argument(format!(
            "root bundle {}: {e}",
            path.display()
        ))),
    }
}

fn lookup_error(e: &xavyo_ca_db::DbError, message: &str) -> CaError {
    if e.is_not_found() {
        CaError::not_found(message)
    } else {
        error!(error = %e, "{message}");
        CaError::internal(message)
    }
}

fn list_error(e: &xavyo_ca_db::DbError) -> CaError {
    error!(error = %e, "Failed to list certificates");
    CaError::internal("unable to list certificates")
}
