//! Integration test helpers for xavyo-ca.
//!
//! Builds a service over the in-memory store with two freshly generated
//! software roots, `root-a` and `root-b`.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Once};

use num_bigint::BigUint;
use xavyo_ca::crypto::software::create_root_ca;
use xavyo_ca::ocsp::{self, CertId, CertStatus, HashAlgorithm};
use xavyo_ca::profile::CaConstraint;
use xavyo_ca::{
    AiaConfig, CaConfig, CaService, CertProfileConfig, DelegatedIssuersConfig, IssuerConfig,
    KeyAlgorithm, SignRequest, Subject,
};
use xavyo_ca_db::{Certificate, MemoryCaDb, SnowflakeIdGenerator};

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

/// Revoked certificates fetched per CRL page in these tests.
pub const CRL_PAGE_SIZE: u32 = 3;

/// Label prefix scoping stored delegated profiles.
pub const DELEGATED_PREFIX: &str = "org-";

fn root(label: &str) -> IssuerConfig {
    let (cert, key) = create_root_ca(
        &format!("{label} Root CA"),
        KeyAlgorithm::EcdsaP256,
        chrono::Duration::days(3650),
    )
    .expect("Failed to create root");
    IssuerConfig {
        label: label.to_string(),
        cert: Some(cert),
        key: Some(key),
        ..IssuerConfig::default()
    }
}

fn profile(issuer_label: &str, usages: &[&str]) -> CertProfileConfig {
    CertProfileConfig {
        usages: usages.iter().map(|u| (*u).to_string()).collect(),
        issuer_label: issuer_label.to_string(),
        ..CertProfileConfig::default()
    }
}

/// Configuration with `server` and `intermediate` on `root-a` and `client`
/// on `root-b`.
pub fn test_config() -> CaConfig {
    let mut intermediate = profile("root-a", &["cert sign", "crl sign"]);
    intermediate.ca_constraint = CaConstraint {
        is_ca: true,
        max_path_len: Some(0),
    };

    let profiles = BTreeMap::from([
        (
            "server".to_string(),
            profile("root-a", &["signing", "key encipherment", "server auth"]),
        ),
        (
            "client".to_string(),
            profile("root-b", &["signing", "client auth"]),
        ),
        ("intermediate".to_string(), intermediate),
    ]);

    CaConfig {
        cluster_name: "test".to_string(),
        crl_page_size: CRL_PAGE_SIZE,
        aia: AiaConfig {
            issuer_url: "http://ca.example.com/issuer/${ISSUER_ID}.crt".to_string(),
            crl_url: "http://ca.example.com/crl/${ISSUER_ID}".to_string(),
            ocsp_url: "http://ca.example.com/ocsp".to_string(),
            ..AiaConfig::default()
        },
        issuers: vec![root("root-a"), root("root-b")],
        profiles,
        delegated_issuers: DelegatedIssuersConfig {
            issuer_label_prefix: DELEGATED_PREFIX.to_string(),
            ..DelegatedIssuersConfig::default()
        },
        ..CaConfig::default()
    }
}

pub struct CaTestContext {
    pub config: CaConfig,
    pub db: Arc<MemoryCaDb>,
    pub service: CaService,
}

impl CaTestContext {
    /// A bootstrapped service over a fresh store.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: CaConfig) -> Self {
        init_test_logging();
        let db = Arc::new(MemoryCaDb::new());
        let service = Self::start(config.clone(), Arc::clone(&db)).await;
        Self {
            config,
            db,
            service,
        }
    }

    /// A second service over the same configuration and store, as after a
    /// process restart.
    pub async fn restart(&self) -> CaService {
        Self::start(self.config.clone(), Arc::clone(&self.db)).await
    }

    async fn start(config: CaConfig, db: Arc<MemoryCaDb>) -> CaService {
        let service = CaService::builder(config)
            .db(db)
            .ids(Arc::new(SnowflakeIdGenerator::new(5)))
            .build();
        service.bootstrap().await.expect("Failed to bootstrap");
        service
    }

    /// Sign a fresh key under `profile`.
    pub async fn issue(&self, profile: &str, cn: &str) -> Certificate {
        self.service
            .sign_certificate(&sign_request(profile, cn))
            .await
            .expect("Failed to sign certificate")
    }

    /// OCSP status of `cert` as answered by the service.
    pub async fn ocsp_status(&self, cert: &Certificate) -> CertStatus {
        let issuer = self
            .service
            .registry()
            .resolve_by_ikid(&cert.ikid)
            .expect("Issuer not registered");
        let serial: BigUint = cert.serial_number.parse().expect("Decimal serial");
        let id = CertId::new(
            HashAlgorithm::Sha1,
            &issuer.certificate().raw_subject,
            &issuer.certificate().public_key,
            serial,
        );
        let der = self
            .service
            .sign_ocsp(&ocsp::encode_request(&id))
            .await
            .expect("Failed to answer OCSP request");
        let response = ocsp::parse_response(&der).expect("Invalid OCSP response");
        let basic = response.basic.expect("Missing basic response");
        assert_eq!(basic.responses[0].cert_id, id);
        basic.responses[0].status.clone()
    }
}

/// A PEM CSR for a fresh key.
pub fn csr(cn: &str, sans: &[&str]) -> String {
    let key = rcgen::KeyPair::generate().expect("Failed to generate key");
    let mut params =
        rcgen::CertificateParams::new(sans.iter().map(|s| (*s).to_string()).collect::<Vec<_>>())
            .expect("Invalid SANs");
    params.distinguished_name = rcgen::DistinguishedName::new();
    params.distinguished_name.push(rcgen::DnType::CommonName, cn);
    params
        .serialize_request(&key)
        .and_then(|req| req.pem())
        .expect("Failed to create CSR")
}

pub fn sign_request(profile: &str, cn: &str) -> SignRequest {
    SignRequest {
        request: csr(cn, &[cn]),
        profile: profile.to_string(),
        org_id: 1,
        label: cn.to_string(),
        ..SignRequest::default()
    }
}

/// Request provisioning a delegated issuer for `org_id`.
pub fn delegated_request(label: &str, org_id: i64) -> SignRequest {
    SignRequest {
        profile: "intermediate".to_string(),
        label: label.to_string(),
        org_id,
        subject: Some(Subject {
            common_name: format!("{label} Issuing CA"),
            names: Vec::new(),
        }),
        ..SignRequest::default()
    }
}
