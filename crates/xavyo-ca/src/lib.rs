//! xavyo certificate authority engine
//!
//! Issues, tracks and revokes X.509 certificates for a set of issuers, and
//! answers revocation status through CRLs and OCSP.
//!
//! # Modules
//!
//! - [`registry`] - Live issuers, resolved by label, profile, key identifier or OCSP hash
//! - [`signing`] - Profile-enforced certificate issuance
//! - [`revocation`] - Active to revoked transitions
//! - [`crl`] - CRL generation, background refresh and periodic publication
//! - [`responder`] - OCSP responses
//! - [`provisioner`] - Delegated issuers created at runtime
//! - [`crypto`] - Signing backends
//! - [`service`] - The [`CaService`] facade over all of the above
//!
//! # Example
//!
//! ```no_run
//! use xavyo_ca::{CaConfig, CaService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaConfig::from_file(CaConfig::config_path())?;
//! let service = CaService::builder(config).build();
//! service.bootstrap().await?;
//! for issuer in service.issuers() {
//!     println!("{} {}", issuer.label, issuer.skid);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crl;
pub mod crypto;
pub mod error;
pub mod issuer;
pub mod metrics;
pub mod ocsp;
pub mod profile;
pub mod provisioner;
pub mod publisher;
pub mod registry;
pub mod responder;
pub mod revocation;
pub mod service;
pub mod signing;
pub mod x509;

pub use config::{AiaConfig, CaConfig, DelegatedIssuersConfig, IssuerConfig, IssuerKind};
pub use crl::{CrlBuilder, CrlPublishError, CrlRefreshQueue};
pub use crypto::{CryptoBackend, CryptoProviders, IssuerSigner, KeyAlgorithm};
pub use error::{CaError, CaResult, ConfigError, ErrorKind};
pub use issuer::{Issuer, IssuerInfo};
pub use metrics::CaMetrics;
pub use profile::{CertProfile, CertProfileConfig, ProfileCatalog};
pub use publisher::{FilePublisher, Publisher};
pub use registry::IssuerRegistry;
pub use responder::OcspResponder;
pub use revocation::{RevocationProcessor, RevokeRequest};
pub use service::{CaService, CaServiceBuilder, OrgCertificates, ProfileInfo};
pub use signing::{RequestFormat, SignRequest, SigningEngine, Subject, SubjectName};
