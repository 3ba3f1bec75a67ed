//! HTTP handlers for the certificate authority API.

pub mod certificates;
pub mod crls;
pub mod health;
pub mod issuers;
pub mod ocsp;
