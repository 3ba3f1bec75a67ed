//! Delegated issuers provisioned through the service.

mod common;

use common::{delegated_request, sign_request, test_config, CaTestContext, DELEGATED_PREFIX};
use xavyo_ca::{x509, CaError, IssuerKind};
use xavyo_ca_db::{CaDb, CertProfileRecord, IssuerStatus};

async fn store_tenant_profile(ctx: &CaTestContext, org_id: i64) {
    let record = CertProfileRecord::new(
        900 + org_id,
        format!("tenant-{org_id}-server"),
        format!("{DELEGATED_PREFIX}{org_id}"),
        "usages: [signing, server auth]\nexpiry: 720h\n",
    );
    ctx.db.register_cert_profile(&record).await.unwrap();
}

#[tokio::test]
async fn test_delegated_issuer_round_trip() {
    let ctx = CaTestContext::new().await;
    store_tenant_profile(&ctx, 7).await;

    let info = ctx
        .service
        .register_delegated_issuer(&delegated_request("tenant-7", 7))
        .await
        .unwrap();
    assert_eq!(info.kind, IssuerKind::Delegated);
    assert!(!info.intermediates.trim().is_empty());
    assert!(!info.root.trim().is_empty());
    assert!(info.profiles.contains(&"tenant-7-server".to_string()));

    let parent = ctx.service.registry().resolve_by_label("root-a").unwrap();
    assert_eq!(info.root, parent.root_bundle_pem());
    let issuer_cert = x509::certificate_info_from_pem(&info.certificate).unwrap();
    assert!(issuer_cert.is_ca);
    assert_eq!(issuer_cert.issuer, parent.subject());
    assert_eq!(issuer_cert.akid.as_deref(), Some(parent.skid()));

    let cert = ctx.issue("tenant-7-server", "app.tenant7.example.com").await;
    assert_eq!(cert.issuer, info.subject);
    assert_eq!(cert.ikid, info.skid);

    // The delegated certificate itself is recorded under the parent.
    let record = ctx
        .service
        .get_certificate_by_skid(&info.skid)
        .await
        .unwrap();
    assert_eq!(record.profile, "intermediate");
    assert_eq!(record.org_id, 7);
    assert_eq!(record.ikid, parent.skid());
}

#[tokio::test]
async fn test_duplicate_label_is_rejected() {
    let ctx = CaTestContext::new().await;
    ctx.service
        .register_delegated_issuer(&delegated_request("tenant", 3))
        .await
        .unwrap();

    let err = ctx
        .service
        .register_delegated_issuer(&delegated_request("tenant", 4))
        .await
        .unwrap_err();
    assert!(matches!(err, CaError::AlreadyExists(_)));

    let matching = ctx
        .service
        .issuers()
        .into_iter()
        .filter(|i| i.label == "tenant")
        .count();
    assert_eq!(matching, 1);
}

#[tokio::test]
async fn test_delegated_issuers_survive_restart() {
    let ctx = CaTestContext::new().await;
    store_tenant_profile(&ctx, 8).await;
    let info = ctx
        .service
        .register_delegated_issuer(&delegated_request("tenant-8", 8))
        .await
        .unwrap();

    let restarted = ctx.restart().await;
    let restored = restarted.get_issuer("tenant-8").unwrap();
    assert_eq!(restored.skid, info.skid);
    assert_eq!(restored.kind, IssuerKind::Delegated);
    assert_eq!(restored.profiles, info.profiles);

    let listed = restarted.list_delegated_issuers(0, 0).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].label, "tenant-8");
}

#[tokio::test]
async fn test_archived_issuer_stops_signing() {
    let ctx = CaTestContext::new().await;
    store_tenant_profile(&ctx, 9).await;
    ctx.service
        .register_delegated_issuer(&delegated_request("tenant-9", 9))
        .await
        .unwrap();
    let cert = ctx.issue("tenant-9-server", "before.example.com").await;

    let archived = ctx.service.archive_delegated_issuer("tenant-9").await.unwrap();
    assert_eq!(archived.status, IssuerStatus::Archived);
    assert_eq!(
        ctx.db.get_issuer_by_label("tenant-9").await.unwrap().status,
        IssuerStatus::Archived
    );

    let err = ctx
        .service
        .sign_certificate(&sign_request("tenant-9-server", "after.example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, CaError::InvalidArgument(_)));

    // Status queries keep working for what it already issued.
    assert_eq!(
        ctx.ocsp_status(&cert).await,
        xavyo_ca::ocsp::CertStatus::Good
    );
    assert!(ctx.service.get_crl(&cert.ikid).await.is_ok());

    assert!(matches!(
        ctx.service.archive_delegated_issuer("root-a").await,
        Err(CaError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_disabled_provisioning() {
    let mut config = test_config();
    config.delegated_issuers.disabled = true;
    let ctx = CaTestContext::with_config(config).await;

    let err = ctx
        .service
        .register_delegated_issuer(&delegated_request("tenant", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CaError::Unimplemented(_)));
    assert!(ctx.service.get_issuer("tenant").is_err());
}
