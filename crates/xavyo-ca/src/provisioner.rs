//! Delegated issuers: issuers created at runtime under a parent issuer.
//!
//! Provisioning generates a key, has the parent sign a CA certificate for
//! it through the regular signing path, publishes the new issuer in the
//! registry and then persists its configuration. The last two steps are not
//! atomic: when the write fails the issuer stays live until restart.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use xavyo_ca_db::{CaDb, IdGenerator, IssuerRecord, IssuerStatus};

use crate::config::{AiaConfig, DelegatedIssuersConfig, IssuerConfig, IssuerKind};
use crate::crypto::{CryptoBackend, CryptoProviders, KeyAlgorithm};
use crate::error::{CaError, CaResult};
use crate::issuer::{Issuer, IssuerInfo};
use crate::profile::{CertProfile, CertProfileConfig, ProfileCatalog};
use crate::registry::IssuerRegistry;
use crate::signing::{RequestFormat, SignRequest, SigningEngine};
use crate::x509;

/// Page size used when reading issuer records back at startup.
const RESTORE_PAGE_SIZE: u32 = 100;

pub struct DelegatedIssuerProvisioner {
    registry: Arc<IssuerRegistry>,
    db: Arc<dyn CaDb>,
    ids: Arc<dyn IdGenerator>,
    signing: Arc<SigningEngine>,
    providers: CryptoProviders,
    config: DelegatedIssuersConfig,
    cluster_name: String,
    default_aia: AiaConfig,
}

impl DelegatedIssuerProvisioner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<IssuerRegistry>,
        db: Arc<dyn CaDb>,
        ids: Arc<dyn IdGenerator>,
        signing: Arc<SigningEngine>,
        providers: CryptoProviders,
        config: DelegatedIssuersConfig,
        cluster_name: impl Into<String>,
        default_aia: AiaConfig,
    ) -> Self {
        Self {
            registry,
            db,
            ids,
            signing,
            providers,
            config,
            cluster_name: cluster_name.into(),
            default_aia,
        }
    }

    /// Label under which stored profiles are scoped to an organization.
    #[must_use]
    pub fn profile_scope(&self, org_id: i64) -> String {
        format!("{}{org_id}", self.config.issuer_label_prefix)
    }

    fn backend(&self) -> CaResult<Arc<dyn CryptoBackend>> {
        self.providers
            .select(&self.config.crypto_provider, &self.config.crypto_model)
            .map_err(|e| {
                error!(
                    provider = %self.config.crypto_provider,
                    model = %self.config.crypto_model,
                    error = %e,
                    "Failed to select crypto provider"
                );
                CaError::internal("unable to load crypto provider")
            })
    }

    /// Create, register and persist a delegated issuer.
    ///
    /// `req.label` names the new issuer and `req.profile` selects the parent
    /// and the profile its certificate is signed under. Key material is
    /// always generated here, so `req.request` must be empty.
    pub async fn provision(&self, req: &SignRequest) -> CaResult<IssuerInfo> {
        if req.label.is_empty() || req.profile.is_empty() || !req.request.is_empty() || req.org_id == 0
        {
            return Err(CaError::invalid_argument("invalid request"));
        }
        if self.config.disabled {
            return Err(CaError::unimplemented("delegated issuers not allowed"));
        }
        if self.registry.contains(&req.label) {
            return Err(CaError::already_exists(
                "issuer already registered with this label",
            ));
        }

        let parent = self.registry.resolve_by_profile(&req.profile).map_err(|_| {
            CaError::not_found(format!("issuer not found for profile: {}", req.profile))
        })?;

        let profiles = self.load_profiles(req.org_id).await?;

        let backend = self.backend()?;
        let key_label = format!(
            "{}-delegated-{}-{}",
            self.cluster_name,
            req.org_id,
            Utc::now().format("%Y%m%d-%H%M")
        );
        let common_name = req
            .subject
            .as_ref()
            .map(|s| s.common_name.clone())
            .filter(|cn| !cn.is_empty())
            .unwrap_or_else(|| req.label.clone());
        let generated = backend
            .generate_key_and_request(&key_label, KeyAlgorithm::EcdsaP256, &common_name)
            .await
            .map_err(|e| {
                error!(label = %req.label, error = %e, "Failed to generate key");
                CaError::internal("failed to create key")
            })?;

        let sign_request = SignRequest {
            request: generated.csr_pem.clone(),
            request_format: RequestFormat::Pem,
            issuer_label: Some(parent.label().to_string()),
            ..req.clone()
        };
        let signed = self.signing.sign(&sign_request).await?;

        let config = IssuerConfig {
            label: req.label.clone(),
            kind: IssuerKind::Delegated,
            cert: Some(signed.pem.clone()),
            key: Some(generated.key_pem.clone()),
            ca_bundle: Some(signed.issuers_pem.clone()),
            root_bundle: Some(parent.root_bundle_pem().to_string()),
            aia: self.config.aia.clone(),
            allowed_profiles: self.config.allowed_profiles.clone(),
            profiles: profiles.configs(),
            ..IssuerConfig::default()
        };

        let signer = backend
            .signer_from_key_material(&generated.key_pem, &signed.pem)
            .await
            .map_err(|e| {
                error!(label = %req.label, error = %e, "Failed to create signer");
                CaError::internal("unable to create signer from private key")
            })?;
        let material = config
            .load_material()
            .map_err(|e| CaError::internal(format!("failed to create issuer: {e}")))?;
        let issuer = Issuer::create(config, material, signer, profiles, &self.default_aia)
            .map_err(|e| {
                error!(label = %req.label, error = %e, "Failed to create issuer");
                CaError::internal("failed to create issuer")
            })?;

        let issuer = self.registry.add(issuer)?;
        self.persist(&issuer).await?;

        info!(
            label = %issuer.label(),
            parent = %parent.label(),
            org_id = req.org_id,
            skid = %issuer.skid(),
            "Delegated issuer provisioned"
        );
        Ok(issuer.info())
    }

    /// Stored profiles scoped to the organization plus the wildcard profiles
    /// the delegated issuers accept.
    async fn load_profiles(&self, org_id: i64) -> CaResult<ProfileCatalog> {
        let scope = self.profile_scope(org_id);
        let records = self.db.get_cert_profiles_by_issuer(&scope).await.map_err(|e| {
            error!(scope = %scope, error = %e, "Failed to load profiles");
            CaError::internal("unable to load profiles")
        })?;

        let mut catalog = ProfileCatalog::new();
        for record in records {
            let mut config: CertProfileConfig = serde_yaml::from_str(&record.config)
                .map_err(|e| CaError::invalid_argument(format!("unable to decode profile: {e}")))?;
            config.issuer_label = record.issuer_label.clone();
            let profile = CertProfile::compile(&record.label, config)
                .map_err(|e| CaError::invalid_argument(format!("unable to decode profile: {e}")))?;
            catalog.insert(profile);
        }

        let allowed = &self.config.allowed_profiles;
        for (name, profile) in self.registry.wildcard_profiles() {
            if allowed.is_empty() || allowed.contains(&name) {
                catalog.insert_if_absent(profile);
            }
        }
        Ok(catalog)
    }

    async fn persist(&self, issuer: &Issuer) -> CaResult<()> {
        let yaml = serde_yaml::to_string(issuer.config()).map_err(|e| {
            error!(label = %issuer.label(), error = %e, "Failed to encode issuer");
            CaError::internal("failed to save issuer")
        })?;
        let record = IssuerRecord::new(self.ids.next_id(), issuer.label(), yaml);
        self.db.register_issuer(&record).await.map_err(|e| {
            warn!(
                label = %issuer.label(),
                error = %e,
                "Delegated issuer is registered but not persisted; it will not survive a restart"
            );
            CaError::internal("failed to save issuer")
        })?;
        Ok(())
    }

    /// Archive a delegated issuer in the store and in the registry.
    pub async fn archive(&self, label: &str) -> CaResult<IssuerInfo> {
        if label.is_empty() {
            return Err(CaError::invalid_argument("missing label"));
        }
        let issuer = self.registry.resolve_by_label(label)?;
        if issuer.kind() != IssuerKind::Delegated {
            return Err(CaError::invalid_argument(format!(
                "issuer {label:?} is not a delegated issuer"
            )));
        }

        self.db
            .update_issuer_status(label, IssuerStatus::Archived)
            .await
            .map_err(|e| {
                error!(label = %label, error = %e, "Failed to archive issuer");
                if e.is_not_found() {
                    CaError::not_found(format!("issuer {label:?} not found"))
                } else {
                    CaError::internal("failed to archive issuer")
                }
            })?;
        let archived = self.registry.set_status(label, IssuerStatus::Archived)?;

        info!(label = %label, "Delegated issuer archived");
        Ok(archived.info())
    }

    /// Delegated issuers as stored.
    pub async fn list(&self, limit: u32, after: i64) -> CaResult<Vec<IssuerInfo>> {
        let records = self.db.list_issuers(limit, after).await.map_err(|e| {
            error!(error = %e, "Failed to list issuers");
            CaError::internal("unable to list issuers")
        })?;

        records
            .iter()
            .map(|record| {
                // A live issuer carries the current status and resolved URLs.
                if let Ok(live) = self.registry.resolve_by_label(&record.label) {
                    return Ok(live.info());
                }
                record_info(record)
            })
            .collect()
    }

    /// Rebuild stored delegated issuers into the registry.
    ///
    /// Returns the number of issuers restored. A record whose label is
    /// already registered is skipped.
    pub async fn restore(&self) -> CaResult<usize> {
        let backend = self.backend()?;
        let mut restored = 0;
        let mut after = 0;
        loop {
            let page = self
                .db
                .list_issuers(RESTORE_PAGE_SIZE, after)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to list issuers");
                    CaError::internal("unable to list issuers")
                })?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.id;

            for record in &page {
                if self.registry.contains(&record.label) {
                    warn!(label = %record.label, "Stored issuer shadowed by a configured issuer");
                    continue;
                }
                let issuer = self.rebuild(backend.as_ref(), record).await?;
                self.registry.add(issuer)?;
                restored += 1;
            }
        }
        Ok(restored)
    }

    async fn rebuild(&self, backend: &dyn CryptoBackend, record: &IssuerRecord) -> CaResult<Issuer> {
        let invalid = |e: &dyn std::fmt::Display| {
            error!(label = %record.label, error = %e, "Failed to restore issuer");
            CaError::internal(format!("failed to restore issuer {:?}", record.label))
        };

        let config: IssuerConfig = serde_yaml::from_str(&record.config).map_err(|e| invalid(&e))?;
        let material = config.load_material().map_err(|e| invalid(&e))?;
        let signer = backend
            .signer_from_key_material(&material.key_pem, &material.cert_pem)
            .await
            .map_err(|e| invalid(&e))?;
        let profiles = ProfileCatalog::compile(&config.profiles).map_err(|e| invalid(&e))?;
        let issuer = Issuer::create(config, material, signer, profiles, &self.default_aia)?;
        Ok(issuer.with_status(record.status))
    }
}

fn record_info(record: &IssuerRecord) -> CaResult<IssuerInfo> {
    let config: IssuerConfig = serde_yaml::from_str(&record.config).map_err(|e| {
        error!(label = %record.label, error = %e, "Failed to decode issuer");
        CaError::internal("unable to decode configuration")
    })?;
    let cert_pem = config.cert.clone().unwrap_or_default();
    let cert = x509::certificate_info_from_pem(&cert_pem).map_err(|e| {
        error!(label = %record.label, error = %e, "Failed to decode issuer certificate");
        CaError::internal("unable to decode configuration")
    })?;

    Ok(IssuerInfo {
        label: record.label.clone(),
        kind: IssuerKind::Delegated,
        status: record.status,
        subject: cert.subject,
        skid: cert.skid,
        not_before: cert.not_before,
        not_after: cert.not_after,
        certificate: cert_pem,
        intermediates: config.ca_bundle.unwrap_or_default(),
        root: config.root_bundle.unwrap_or_default(),
        profiles: config.profiles.keys().cloned().collect(),
        issuer_urls: Vec::new(),
        crl_urls: Vec::new(),
        ocsp_urls: Vec::new(),
    })
}
