//! Durable models of the certificate authority.

pub mod cert_profile;
pub mod certificate;
pub mod crl;
pub mod issuer;
pub mod revoked_certificate;
pub mod root_certificate;

pub use cert_profile::{CertProfileRecord, ANY_ISSUER};
pub use certificate::Certificate;
pub use crl::Crl;
pub use issuer::{IssuerRecord, IssuerStatus};
pub use revoked_certificate::{RevocationReason, RevokedCertificate};
pub use root_certificate::{RootCertificate, Trust};
