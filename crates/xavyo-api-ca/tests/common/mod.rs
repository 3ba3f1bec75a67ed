//! Test helpers for the CA API.
//!
//! Builds a bootstrapped service over the in-memory store with a single
//! software root, `root`, serving `server` and `intermediate`.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Once};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use tower::ServiceExt;
use xavyo_api_ca::{ca_router, CaState};
use xavyo_ca::crypto::software::create_root_ca;
use xavyo_ca::profile::CaConstraint;
use xavyo_ca::{
    CaConfig, CaService, CertProfileConfig, DelegatedIssuersConfig, IssuerConfig, KeyAlgorithm,
    SignRequest,
};
use xavyo_ca_db::{MemoryCaDb, SnowflakeIdGenerator};

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

fn profile(usages: &[&str]) -> CertProfileConfig {
    CertProfileConfig {
        usages: usages.iter().map(|u| (*u).to_string()).collect(),
        issuer_label: "root".to_string(),
        ..CertProfileConfig::default()
    }
}

pub fn test_config() -> CaConfig {
    let (cert, key) = create_root_ca(
        "API Test Root CA",
        KeyAlgorithm::EcdsaP256,
        chrono::Duration::days(365),
    )
    .expect("Failed to create root");

    let mut intermediate = profile(&["cert sign", "crl sign"]);
    intermediate.ca_constraint = CaConstraint {
        is_ca: true,
        max_path_len: Some(0),
    };

    CaConfig {
        cluster_name: "api".to_string(),
        issuers: vec![IssuerConfig {
            label: "root".to_string(),
            cert: Some(cert),
            key: Some(key),
            ..IssuerConfig::default()
        }],
        profiles: BTreeMap::from([
            (
                "server".to_string(),
                profile(&["signing", "key encipherment", "server auth"]),
            ),
            ("intermediate".to_string(), intermediate),
        ]),
        delegated_issuers: DelegatedIssuersConfig {
            issuer_label_prefix: "org-".to_string(),
            ..DelegatedIssuersConfig::default()
        },
        ..CaConfig::default()
    }
}

pub struct TestApp {
    pub service: Arc<CaService>,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        init_test_logging();
        let service = CaService::builder(test_config())
            .db(Arc::new(MemoryCaDb::new()))
            .ids(Arc::new(SnowflakeIdGenerator::new(9)))
            .build();
        service.bootstrap().await.expect("Failed to bootstrap");
        let service = Arc::new(service);
        let router = ca_router(CaState::new(Arc::clone(&service)));
        Self { service, router }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn json(&self, method: &str, uri: &str, body: &serde_json::Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
        )
        .await
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body")
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("Body is not JSON")
}

/// A PEM CSR for a fresh key.
pub fn csr(cn: &str) -> String {
    let key = rcgen::KeyPair::generate().expect("Failed to generate key");
    let mut params = rcgen::CertificateParams::new(vec![cn.to_string()]).expect("Invalid SAN");
    params.distinguished_name = rcgen::DistinguishedName::new();
    params.distinguished_name.push(rcgen::DnType::CommonName, cn);
    params
        .serialize_request(&key)
        .and_then(|req| req.pem())
        .expect("Failed to create CSR")
}

pub fn sign_body(profile: &str, cn: &str) -> serde_json::Value {
    serde_json::to_value(SignRequest {
        request: csr(cn),
        profile: profile.to_string(),
        org_id: 42,
        label: cn.to_string(),
        ..SignRequest::default()
    })
    .unwrap()
}
