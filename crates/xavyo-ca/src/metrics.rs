//! Prometheus counters for certificate lifecycle events.
//!
//! Families are cheap to clone and share their underlying counters, so the
//! engine components each hold a clone of [`CaMetrics`].

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

/// Labels for signing counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SigningLabels {
    pub profile: String,
    pub issuer: String,
}

/// Labels for revocation and CRL counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct IssuerLabels {
    pub ikid: String,
}

/// Engine counters.
#[derive(Clone, Default)]
pub struct CaMetrics {
    pub cert_issued: Family<SigningLabels, Counter>,
    pub cert_sign_failed: Family<SigningLabels, Counter>,
    pub cert_publish_failed: Family<SigningLabels, Counter>,
    pub cert_revoked: Family<IssuerLabels, Counter>,
    pub crl_published: Family<IssuerLabels, Counter>,
    pub crl_publish_failed: Family<IssuerLabels, Counter>,
}

impl CaMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every family under the `ca_` prefix.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "ca_cert_issued",
            "Certificates issued",
            self.cert_issued.clone(),
        );
        registry.register(
            "ca_cert_sign_failed",
            "Certificate signing failures",
            self.cert_sign_failed.clone(),
        );
        registry.register(
            "ca_cert_publish_failed",
            "Certificate publication failures",
            self.cert_publish_failed.clone(),
        );
        registry.register(
            "ca_cert_revoked",
            "Certificates revoked",
            self.cert_revoked.clone(),
        );
        registry.register(
            "ca_crl_published",
            "CRLs published",
            self.crl_published.clone(),
        );
        registry.register(
            "ca_crl_publish_failed",
            "CRL publication failures",
            self.crl_publish_failed.clone(),
        );
    }

    pub(crate) fn signing(profile: &str, issuer: &str) -> SigningLabels {
        SigningLabels {
            profile: profile.to_string(),
            issuer: issuer.to_string(),
        }
    }

    pub(crate) fn issuer(ikid: &str) -> IssuerLabels {
        IssuerLabels {
            ikid: ikid.to_string(),
        }
    }
}
