//! Store contract tests against the in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use xavyo_ca_db::{
    CaDb, Certificate, IdGenerator, MemoryCaDb, RevocationReason, SnowflakeIdGenerator,
};

fn certificate(id: i64, ikid: &str, serial: &str, org_id: i64) -> Certificate {
    let now = Utc::now();
    Certificate {
        id,
        org_id,
        skid: format!("{id:040x}"),
        ikid: ikid.to_string(),
        serial_number: serial.to_string(),
        not_before: now - Duration::minutes(10),
        not_after: now + Duration::days(90),
        subject: format!("CN=host-{id}.example.com"),
        issuer: "CN=Example Issuing CA".to_string(),
        sha256: format!("{id:064x}"),
        profile: "server".to_string(),
        pem: String::new(),
        issuers_pem: String::new(),
        label: String::new(),
        locations: vec![],
        metadata: HashMap::new(),
    }
}

async fn drain_active(db: &MemoryCaDb, ikid: &str, page: u32) -> Vec<i64> {
    let mut ids = Vec::new();
    let mut after = 0;
    loop {
        let batch = db.list_certificates(ikid, page, after).await.unwrap();
        let Some(last) = batch.last() else { break };
        after = last.id;
        ids.extend(batch.iter().map(|c| c.id));
    }
    ids
}

async fn drain_revoked(db: &MemoryCaDb, ikid: &str, page: u32) -> Vec<i64> {
    let mut ids = Vec::new();
    let mut after = 0;
    loop {
        let batch = db.list_revoked_certificates(ikid, page, after).await.unwrap();
        let Some(last) = batch.last() else { break };
        after = last.certificate.id;
        ids.extend(batch.iter().map(|r| r.certificate.id));
    }
    ids
}

#[tokio::test]
async fn test_concurrent_revocation_keeps_sets_disjoint() {
    let db = Arc::new(MemoryCaDb::new());
    let ids = SnowflakeIdGenerator::new(1);
    let mut certs = Vec::new();
    for n in 0..50 {
        let cert = certificate(ids.next_id(), "ik01", &n.to_string(), 1);
        certs.push(db.register_certificate(&cert).await.unwrap());
    }

    let mut handles = Vec::new();
    for cert in certs.iter().step_by(2).cloned() {
        let db = Arc::clone(&db);
        handles.push(tokio::spawn(async move {
            db.revoke_certificate(&cert, Utc::now(), RevocationReason::Superseded)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let active: HashSet<i64> = drain_active(&db, "ik01", 7).await.into_iter().collect();
    let revoked: HashSet<i64> = drain_revoked(&db, "ik01", 7).await.into_iter().collect();

    assert_eq!(active.len(), 25);
    assert_eq!(revoked.len(), 25);
    assert!(active.is_disjoint(&revoked));
    let all: HashSet<i64> = certs.iter().map(|c| c.id).collect();
    assert_eq!(&active | &revoked, all);
}

#[tokio::test]
async fn test_double_revocation_fails_second_time() {
    let db = MemoryCaDb::new();
    let cert = db
        .register_certificate(&certificate(10, "ik01", "10", 1))
        .await
        .unwrap();

    db.revoke_certificate(&cert, Utc::now(), RevocationReason::KeyCompromise)
        .await
        .unwrap();
    let err = db
        .revoke_certificate(&cert, Utc::now(), RevocationReason::KeyCompromise)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(db.revoked_count(), 1);
}

#[tokio::test]
async fn test_org_listing_spans_issuers() {
    let db = MemoryCaDb::new();
    db.register_certificate(&certificate(1, "ik01", "1", 7))
        .await
        .unwrap();
    db.register_certificate(&certificate(2, "ik02", "1", 7))
        .await
        .unwrap();
    db.register_certificate(&certificate(3, "ik01", "3", 8))
        .await
        .unwrap();

    let org = db.list_org_certificates(7, 0, 0).await.unwrap();
    assert_eq!(org.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);

    let cert = db.get_certificate(2).await.unwrap();
    db.revoke_certificate(&cert, Utc::now(), RevocationReason::Unspecified)
        .await
        .unwrap();
    let revoked = db.list_org_revoked_certificates(7, 0, 0).await.unwrap();
    assert_eq!(revoked.len(), 1);
    assert_eq!(revoked[0].certificate.ikid, "ik02");
}

#[tokio::test]
async fn test_lookup_by_skid_and_serial() {
    let db = MemoryCaDb::new();
    let cert = db
        .register_certificate(&certificate(42, "ik01", "4242", 1))
        .await
        .unwrap();

    let by_skid = db.get_certificates_by_skid(&cert.skid).await.unwrap();
    assert_eq!(by_skid.len(), 1);
    let by_serial = db
        .get_certificate_by_ikid_and_serial("ik01", "4242")
        .await
        .unwrap();
    assert_eq!(by_serial.id, 42);

    assert!(db
        .get_certificate_by_ikid_and_serial("ik02", "4242")
        .await
        .unwrap_err()
        .is_not_found());
    assert!(db
        .get_certificates_by_skid("missing")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_update_label() {
    let db = MemoryCaDb::new();
    db.register_certificate(&certificate(1, "ik01", "1", 1))
        .await
        .unwrap();

    let updated = db.update_certificate_label(1, "frontend").await.unwrap();
    assert_eq!(updated.label, "frontend");
    assert!(db
        .update_certificate_label(2, "x")
        .await
        .unwrap_err()
        .is_not_found());
}
