//! HTTP API for the xavyo certificate authority.
//!
//! This crate exposes the [`xavyo_ca::CaService`] operations over REST:
//! - Certificate signing, lookup, relabeling and revocation
//! - CRL retrieval and publication
//! - OCSP over GET and POST (RFC 6960)
//! - Issuer, profile and delegated issuer management
//! - Liveness and Prometheus metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use xavyo_api_ca::{ca_router, CaState};
//! use axum::Router;
//!
//! let state = CaState::new(Arc::new(service));
//! let app = Router::new().merge(ca_router(state));
//! ```

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;

// Re-export public API
pub use error::{ApiError, ApiResult, ProblemDetails};
pub use router::{ca_router, CaState};
