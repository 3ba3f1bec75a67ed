//! In-process implementation of [`CaDb`].
//!
//! All collections live behind one lock, so every operation (the revoke
//! transaction included) is atomic with respect to every other.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{DbError, DbResult};
use crate::models::{
    CertProfileRecord, Certificate, Crl, IssuerRecord, IssuerStatus, RevocationReason,
    RevokedCertificate, RootCertificate,
};
use crate::store::{page_size, CaDb};

#[derive(Debug, Default)]
struct State {
    roots: BTreeMap<i64, RootCertificate>,
    certificates: BTreeMap<i64, Certificate>,
    revoked: BTreeMap<i64, RevokedCertificate>,
    crls: HashMap<String, Crl>,
    issuers: BTreeMap<i64, IssuerRecord>,
    profiles: BTreeMap<String, CertProfileRecord>,
}

impl State {
    fn find_certificate_by_thumbprint(&self, sha256: &str) -> Option<i64> {
        self.certificates
            .values()
            .find(|c| c.sha256 == sha256)
            .map(|c| c.id)
    }

    fn find_revoked_by_thumbprint(&self, sha256: &str) -> Option<i64> {
        self.revoked
            .values()
            .find(|r| r.certificate.sha256 == sha256)
            .map(|r| r.certificate.id)
    }

    fn ikid_serial_taken(&self, cert: &Certificate) -> bool {
        self.certificates.values().any(|c| {
            c.ikid == cert.ikid && c.serial_number == cert.serial_number && c.sha256 != cert.sha256
        })
    }

    fn upsert_revoked(&mut self, revoked: &RevokedCertificate) -> RevokedCertificate {
        if let Some(id) = self.find_revoked_by_thumbprint(&revoked.certificate.sha256) {
            if let Some(existing) = self.revoked.get_mut(&id) {
                existing.certificate.org_id = revoked.certificate.org_id;
                existing.certificate.issuers_pem = revoked.certificate.issuers_pem.clone();
                return existing.clone();
            }
        }
        self.revoked
            .insert(revoked.certificate.id, revoked.clone());
        revoked.clone()
    }
}

/// Store backed by process memory; state is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCaDb {
    state: RwLock<State>,
}

impl MemoryCaDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of certificates in the active set.
    #[must_use]
    pub fn certificates_count(&self) -> usize {
        self.state.read().certificates.len()
    }

    /// Number of certificates in the revoked set.
    #[must_use]
    pub fn revoked_count(&self) -> usize {
        self.state.read().revoked.len()
    }
}

fn page<T: Clone>(
    items: &BTreeMap<i64, T>,
    after: i64,
    limit: u32,
    filter: impl Fn(&T) -> bool,
) -> Vec<T> {
    items
        .range((after.saturating_add(1))..)
        .map(|(_, v)| v)
        .filter(|v| filter(v))
        .take(page_size(limit))
        .cloned()
        .collect()
}

#[async_trait]
impl CaDb for MemoryCaDb {
    async fn register_root_certificate(&self, root: &RootCertificate) -> DbResult<RootCertificate> {
        let mut state = self.state.write();
        let existing = state
            .roots
            .values()
            .find(|r| r.skid == root.skid)
            .map(|r| r.id);
        let mut stored = root.clone();
        if let Some(id) = existing {
            stored.id = id;
        }
        state.roots.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn list_root_certificates(&self) -> DbResult<Vec<RootCertificate>> {
        Ok(self.state.read().roots.values().cloned().collect())
    }

    async fn register_certificate(&self, cert: &Certificate) -> DbResult<Certificate> {
        let mut state = self.state.write();
        if let Some(id) = state.find_certificate_by_thumbprint(&cert.sha256) {
            let existing = state
                .certificates
                .get_mut(&id)
                .ok_or_else(|| DbError::not_found(format!("certificate {id}")))?;
            existing.org_id = cert.org_id;
            existing.issuers_pem = cert.issuers_pem.clone();
            existing.label = cert.label.clone();
            existing.locations = cert.locations.clone();
            existing.metadata = cert.metadata.clone();
            return Ok(existing.clone());
        }
        if state.ikid_serial_taken(cert) {
            return Err(DbError::Conflict("certificates_ikid_serial_key".to_string()));
        }
        if state.certificates.contains_key(&cert.id) || state.revoked.contains_key(&cert.id) {
            return Err(DbError::Conflict("certificates_pkey".to_string()));
        }
        state.certificates.insert(cert.id, cert.clone());
        Ok(cert.clone())
    }

    async fn remove_certificate(&self, id: i64) -> DbResult<()> {
        self.state.write().certificates.remove(&id);
        Ok(())
    }

    async fn update_certificate_label(&self, id: i64, label: &str) -> DbResult<Certificate> {
        let mut state = self.state.write();
        let cert = state
            .certificates
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found(format!("certificate {id}")))?;
        cert.label = label.to_string();
        Ok(cert.clone())
    }

    async fn get_certificate(&self, id: i64) -> DbResult<Certificate> {
        self.state
            .read()
            .certificates
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::not_found(format!("certificate {id}")))
    }

    async fn get_certificates_by_skid(&self, skid: &str) -> DbResult<Vec<Certificate>> {
        let found: Vec<Certificate> = self
            .state
            .read()
            .certificates
            .values()
            .filter(|c| c.skid == skid)
            .cloned()
            .collect();
        if found.is_empty() {
            return Err(DbError::not_found(format!("certificate skid={skid}")));
        }
        Ok(found)
    }

    async fn get_certificate_by_ikid_and_serial(
        &self,
        ikid: &str,
        serial: &str,
    ) -> DbResult<Certificate> {
        self.state
            .read()
            .certificates
            .values()
            .find(|c| c.ikid == ikid && c.serial_number == serial)
            .cloned()
            .ok_or_else(|| DbError::not_found(format!("certificate ikid={ikid} serial={serial}")))
    }

    async fn list_certificates(
        &self,
        ikid: &str,
        limit: u32,
        after: i64,
    ) -> DbResult<Vec<Certificate>> {
        let state = self.state.read();
        Ok(page(&state.certificates, after, limit, |c| c.ikid == ikid))
    }

    async fn list_org_certificates(
        &self,
        org_id: i64,
        limit: u32,
        after: i64,
    ) -> DbResult<Vec<Certificate>> {
        let state = self.state.read();
        Ok(page(&state.certificates, after, limit, |c| c.org_id == org_id))
    }

    async fn register_revoked_certificate(
        &self,
        revoked: &RevokedCertificate,
    ) -> DbResult<RevokedCertificate> {
        Ok(self.state.write().upsert_revoked(revoked))
    }

    async fn remove_revoked_certificate(&self, id: i64) -> DbResult<()> {
        self.state.write().revoked.remove(&id);
        Ok(())
    }

    async fn revoke_certificate(
        &self,
        cert: &Certificate,
        at: DateTime<Utc>,
        reason: RevocationReason,
    ) -> DbResult<RevokedCertificate> {
        let mut state = self.state.write();
        let active = state
            .certificates
            .remove(&cert.id)
            .ok_or_else(|| DbError::not_found(format!("certificate {}", cert.id)))?;
        let revoked = RevokedCertificate {
            certificate: active,
            revoked_at: at,
            reason,
        };
        Ok(state.upsert_revoked(&revoked))
    }

    async fn get_revoked_certificate_by_ikid_and_serial(
        &self,
        ikid: &str,
        serial: &str,
    ) -> DbResult<RevokedCertificate> {
        self.state
            .read()
            .revoked
            .values()
            .find(|r| r.certificate.ikid == ikid && r.certificate.serial_number == serial)
            .cloned()
            .ok_or_else(|| DbError::not_found(format!("revoked ikid={ikid} serial={serial}")))
    }

    async fn list_revoked_certificates(
        &self,
        ikid: &str,
        limit: u32,
        after: i64,
    ) -> DbResult<Vec<RevokedCertificate>> {
        let state = self.state.read();
        Ok(page(&state.revoked, after, limit, |r| r.certificate.ikid == ikid))
    }

    async fn list_org_revoked_certificates(
        &self,
        org_id: i64,
        limit: u32,
        after: i64,
    ) -> DbResult<Vec<RevokedCertificate>> {
        let state = self.state.read();
        Ok(page(&state.revoked, after, limit, |r| {
            r.certificate.org_id == org_id
        }))
    }

    async fn register_crl(&self, crl: &Crl) -> DbResult<Crl> {
        let mut state = self.state.write();
        let stored = match state.crls.get(&crl.ikid) {
            Some(existing) => Crl {
                id: existing.id,
                ..crl.clone()
            },
            None => crl.clone(),
        };
        state.crls.insert(stored.ikid.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_crl(&self, ikid: &str) -> DbResult<Crl> {
        self.state
            .read()
            .crls
            .get(ikid)
            .cloned()
            .ok_or_else(|| DbError::not_found(format!("crl ikid={ikid}")))
    }

    async fn remove_crl(&self, ikid: &str) -> DbResult<()> {
        self.state.write().crls.remove(ikid);
        Ok(())
    }

    async fn register_issuer(&self, issuer: &IssuerRecord) -> DbResult<IssuerRecord> {
        let mut state = self.state.write();
        let existing = state
            .issuers
            .values()
            .find(|i| i.label == issuer.label)
            .cloned();
        let stored = match existing {
            Some(existing) => IssuerRecord {
                id: existing.id,
                label: existing.label,
                status: issuer.status,
                config: issuer.config.clone(),
                created_at: existing.created_at,
                updated_at: Utc::now(),
            },
            None => issuer.clone(),
        };
        state.issuers.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_issuer_status(
        &self,
        label: &str,
        status: IssuerStatus,
    ) -> DbResult<IssuerRecord> {
        let mut state = self.state.write();
        let record = state
            .issuers
            .values_mut()
            .find(|i| i.label == label)
            .ok_or_else(|| DbError::not_found(format!("issuer {label}")))?;
        record.status = status;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn get_issuer_by_label(&self, label: &str) -> DbResult<IssuerRecord> {
        self.state
            .read()
            .issuers
            .values()
            .find(|i| i.label == label)
            .cloned()
            .ok_or_else(|| DbError::not_found(format!("issuer {label}")))
    }

    async fn list_issuers(&self, limit: u32, after: i64) -> DbResult<Vec<IssuerRecord>> {
        let state = self.state.read();
        Ok(page(&state.issuers, after, limit, |_| true))
    }

    async fn delete_issuer(&self, label: &str) -> DbResult<()> {
        self.state.write().issuers.retain(|_, i| i.label != label);
        Ok(())
    }

    async fn register_cert_profile(
        &self,
        profile: &CertProfileRecord,
    ) -> DbResult<CertProfileRecord> {
        let mut state = self.state.write();
        let stored = match state.profiles.get(&profile.label) {
            Some(existing) => CertProfileRecord {
                id: existing.id,
                created_at: existing.created_at,
                updated_at: Utc::now(),
                ..profile.clone()
            },
            None => profile.clone(),
        };
        state.profiles.insert(stored.label.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_cert_profile(&self, label: &str) -> DbResult<CertProfileRecord> {
        self.state
            .read()
            .profiles
            .get(label)
            .cloned()
            .ok_or_else(|| DbError::not_found(format!("profile {label}")))
    }

    async fn get_cert_profiles_by_issuer(
        &self,
        issuer_label: &str,
    ) -> DbResult<Vec<CertProfileRecord>> {
        Ok(self
            .state
            .read()
            .profiles
            .values()
            .filter(|p| p.issuer_label == issuer_label)
            .cloned()
            .collect())
    }

    async fn list_cert_profiles(&self) -> DbResult<Vec<CertProfileRecord>> {
        Ok(self.state.read().profiles.values().cloned().collect())
    }

    async fn delete_cert_profile(&self, label: &str) -> DbResult<()> {
        self.state.write().profiles.remove(label);
        Ok(())
    }
}
