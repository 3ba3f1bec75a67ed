//! In-memory set of issuing authorities.
//!
//! Readers load an immutable snapshot through [`ArcSwap`] and never block.
//! Writers serialise on a mutex, build the next snapshot from the current one
//! and publish it with a single `store`, so a reader sees either the old or
//! the new set and never a half-built issuer.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::info;
use xavyo_ca_db::IssuerStatus;

use crate::error::{CaError, CaResult};
use crate::issuer::Issuer;
use crate::ocsp::HashAlgorithm;
use crate::profile::CertProfile;

/// Issuers in registration order.
type Snapshot = Vec<Arc<Issuer>>;

pub struct IssuerRegistry {
    issuers: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
}

impl Default for IssuerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IssuerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<String> = self
            .issuers
            .load()
            .iter()
            .map(|i| i.label().to_string())
            .collect();
        f.debug_struct("IssuerRegistry")
            .field("issuers", &labels)
            .finish()
    }
}

impl IssuerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            issuers: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Publish a new issuer. Fails with `AlreadyExists` on a label collision.
    pub fn add(&self, issuer: Issuer) -> CaResult<Arc<Issuer>> {
        let _guard = self.write_lock.lock();
        let current = self.issuers.load_full();
        if current.iter().any(|i| i.label() == issuer.label()) {
            return Err(CaError::already_exists(format!(
                "issuer {:?} already exists",
                issuer.label()
            )));
        }

        let issuer = Arc::new(issuer);
        let mut next: Snapshot = current.as_ref().clone();
        next.push(Arc::clone(&issuer));
        self.issuers.store(Arc::new(next));

        info!(
            label = %issuer.label(),
            kind = %issuer.kind(),
            skid = %issuer.skid(),
            "Issuer registered"
        );
        Ok(issuer)
    }

    /// Replace an issuer with a copy carrying `status`.
    pub fn set_status(&self, label: &str, status: IssuerStatus) -> CaResult<Arc<Issuer>> {
        let _guard = self.write_lock.lock();
        let current = self.issuers.load_full();
        let position = current
            .iter()
            .position(|i| i.label() == label)
            .ok_or_else(|| CaError::not_found(format!("issuer {label:?} not found")))?;

        let updated = Arc::new(current[position].with_status(status));
        let mut next: Snapshot = current.as_ref().clone();
        next[position] = Arc::clone(&updated);
        self.issuers.store(Arc::new(next));

        info!(label = %label, status = %status, "Issuer status changed");
        Ok(updated)
    }

    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.issuers.load().iter().any(|i| i.label() == label)
    }

    /// Every issuer, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<Issuer>> {
        self.issuers.load_full().as_ref().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issuers.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issuers.load().is_empty()
    }

    pub fn resolve_by_label(&self, label: &str) -> CaResult<Arc<Issuer>> {
        self.find(|i| i.label() == label)
            .ok_or_else(|| CaError::not_found(format!("issuer {label:?} not found")))
    }

    /// Resolve by the issuer's subject key identifier.
    pub fn resolve_by_ikid(&self, ikid: &str) -> CaResult<Arc<Issuer>> {
        self.find(|i| i.skid() == ikid)
            .ok_or_else(|| CaError::not_found(format!("issuer {ikid:?} not found")))
    }

    /// First active issuer able to sign `profile`.
    ///
    /// An issuer the profile is scoped to wins over one that only carries it
    /// as a wildcard profile.
    pub fn resolve_by_profile(&self, profile: &str) -> CaResult<Arc<Issuer>> {
        let snapshot = self.issuers.load();
        snapshot
            .iter()
            .find(|i| i.is_active() && i.owns_profile(profile))
            .or_else(|| {
                snapshot
                    .iter()
                    .find(|i| i.is_active() && i.has_profile(profile))
            })
            .cloned()
            .ok_or_else(|| CaError::not_found(format!("no issuer found for profile {profile:?}")))
    }

    pub fn resolve_by_ocsp_key_hash(
        &self,
        algorithm: HashAlgorithm,
        hash: &[u8],
    ) -> CaResult<Arc<Issuer>> {
        self.find(|i| i.matches_key_hash(algorithm, hash))
            .ok_or_else(|| CaError::not_found("issuer not found for key hash"))
    }

    pub fn resolve_by_ocsp_name_hash(
        &self,
        algorithm: HashAlgorithm,
        hash: &[u8],
    ) -> CaResult<Arc<Issuer>> {
        self.find(|i| i.matches_name_hash(algorithm, hash))
            .ok_or_else(|| CaError::not_found("issuer not found for name hash"))
    }

    /// Wildcard profiles carried by any registered issuer, by name.
    #[must_use]
    pub fn wildcard_profiles(&self) -> BTreeMap<String, Arc<CertProfile>> {
        let mut profiles = BTreeMap::new();
        for issuer in self.issuers.load().iter() {
            for profile in issuer.profiles().iter().filter(|p| p.is_wildcard()) {
                profiles
                    .entry(profile.name().to_string())
                    .or_insert_with(|| Arc::clone(profile));
            }
        }
        profiles
    }

    fn find(&self, predicate: impl Fn(&Issuer) -> bool) -> Option<Arc<Issuer>> {
        self.issuers
            .load()
            .iter()
            .find(|i| predicate(i))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::fixtures::root_issuer;

    #[test]
    fn test_add_rejects_duplicate_label() {
        let registry = IssuerRegistry::new();
        registry.add(root_issuer("root", &["server"])).unwrap();
        let err = registry.add(root_issuer("root", &[])).unwrap_err();
        assert!(matches!(err, CaError::AlreadyExists(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_by_label_and_ikid() {
        let registry = IssuerRegistry::new();
        let issuer = registry.add(root_issuer("root", &[])).unwrap();

        assert_eq!(registry.resolve_by_label("root").unwrap().label(), "root");
        assert_eq!(
            registry.resolve_by_ikid(issuer.skid()).unwrap().label(),
            "root"
        );
        assert!(matches!(
            registry.resolve_by_label("missing"),
            Err(CaError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_by_profile_skips_archived() {
        let registry = IssuerRegistry::new();
        registry.add(root_issuer("first", &["server"])).unwrap();
        registry.add(root_issuer("second", &["server"])).unwrap();

        assert_eq!(registry.resolve_by_profile("server").unwrap().label(), "first");

        registry.set_status("first", IssuerStatus::Archived).unwrap();
        assert_eq!(
            registry.resolve_by_profile("server").unwrap().label(),
            "second"
        );
        // Archived issuers stay resolvable by label.
        assert!(!registry.resolve_by_label("first").unwrap().is_active());

        assert!(matches!(
            registry.resolve_by_profile("client"),
            Err(CaError::NotFound(_))
        ));
    }

    #[test]
    fn test_snapshot_is_stable_across_add() {
        let registry = IssuerRegistry::new();
        registry.add(root_issuer("a", &[])).unwrap();
        let before = registry.list();
        registry.add(root_issuer("b", &[])).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_set_status_unknown_label() {
        let registry = IssuerRegistry::new();
        assert!(matches!(
            registry.set_status("nope", IssuerStatus::Archived),
            Err(CaError::NotFound(_))
        ));
    }
}
