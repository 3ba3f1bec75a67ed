//! Router and state for the certificate authority API.
//!
//! Provides the `CaState` struct and `ca_router()` function that create the
//! Axum router for certificate, CRL, OCSP and issuer endpoints.

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};
use parking_lot::Mutex;
use prometheus_client::registry::Registry;
use xavyo_ca::CaService;

use crate::handlers;

/// Shared state for CA routes.
#[derive(Clone)]
pub struct CaState {
    /// The bootstrapped engine.
    pub service: Arc<CaService>,
    /// Metrics registry exposed on `/metrics`.
    pub metrics: Arc<Mutex<Registry>>,
}

impl CaState {
    /// Create a new `CaState` and register the engine metrics.
    pub fn new(service: Arc<CaService>) -> Self {
        let mut registry = Registry::default();
        service.register_metrics(&mut registry);
        Self {
            service,
            metrics: Arc::new(Mutex::new(registry)),
        }
    }
}

/// Create the CA router.
///
/// - POST   /v1/ca/certificates                 - Sign a certificate
/// - GET    /v1/ca/certificates                 - List certificates of an issuer
/// - GET    /v1/ca/certificates/:id             - Get by id, or by subject key id
/// - PATCH  /v1/ca/certificates/:id/label       - Relabel
/// - POST   /v1/ca/certificates/revoke          - Revoke
/// - GET    /v1/ca/revoked                      - List revoked certificates of an issuer
/// - GET    /v1/ca/orgs/:org_id/certificates    - Active and revoked certificates of an org
/// - GET    /v1/ca/crls/:ikid                   - Latest CRL
/// - POST   /v1/ca/crls/publish                 - Regenerate and publish CRLs
/// - GET    /v1/ca/issuers                      - List issuers
/// - GET    /v1/ca/issuers/:label               - Get issuer
/// - GET    /v1/ca/profiles/:profile            - Profile and its issuer
/// - GET    /v1/ca/delegated                    - List delegated issuers
/// - POST   /v1/ca/delegated                    - Provision a delegated issuer
/// - POST   /v1/ca/delegated/:label/archive     - Archive a delegated issuer
/// - GET    /v1/ocsp/*encoded                   - OCSP (RFC 6960 GET)
/// - POST   /v1/ocsp                            - OCSP (RFC 6960 POST)
/// - GET    /health                             - Liveness
/// - GET    /metrics                            - Prometheus metrics
pub fn ca_router(state: CaState) -> Router {
    Router::new()
        // Certificates
        .route(
            "/v1/ca/certificates",
            post(handlers::certificates::sign_certificate)
                .get(handlers::certificates::list_certificates),
        )
        .route(
            "/v1/ca/certificates/revoke",
            post(handlers::certificates::revoke_certificate),
        )
        .route(
            "/v1/ca/certificates/:id",
            get(handlers::certificates::get_certificate),
        )
        .route(
            "/v1/ca/certificates/:id/label",
            patch(handlers::certificates::update_certificate_label),
        )
        .route(
            "/v1/ca/revoked",
            get(handlers::certificates::list_revoked_certificates),
        )
        .route(
            "/v1/ca/orgs/:org_id/certificates",
            get(handlers::certificates::get_org_certificates),
        )
        // CRLs
        .route("/v1/ca/crls/publish", post(handlers::crls::publish_crls))
        .route("/v1/ca/crls/:ikid", get(handlers::crls::get_crl))
        // Issuers and profiles
        .route("/v1/ca/issuers", get(handlers::issuers::list_issuers))
        .route("/v1/ca/issuers/:label", get(handlers::issuers::get_issuer))
        .route("/v1/ca/profiles/:profile", get(handlers::issuers::get_profile))
        .route(
            "/v1/ca/delegated",
            get(handlers::issuers::list_delegated_issuers)
                .post(handlers::issuers::register_delegated_issuer),
        )
        .route(
            "/v1/ca/delegated/:label/archive",
            post(handlers::issuers::archive_delegated_issuer),
        )
        // OCSP
        .route("/v1/ocsp", post(handlers::ocsp::ocsp_post))
        .route("/v1/ocsp/*encoded", get(handlers::ocsp::ocsp_get))
        // Operations
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::health::metrics))
        .with_state(state)
}
