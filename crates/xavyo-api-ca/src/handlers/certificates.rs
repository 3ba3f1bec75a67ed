//! Certificate handlers.
//!
//! - POST  /v1/ca/certificates - Sign a certificate
//! - GET   /v1/ca/certificates - List certificates of an issuer
//! - GET   /v1/ca/certificates/:id - Get a certificate by id or subject key id
//! - PATCH /v1/ca/certificates/:id/label - Update the label
//! - POST  /v1/ca/certificates/revoke - Revoke a certificate
//! - GET   /v1/ca/revoked - List revoked certificates of an issuer
//! - GET   /v1/ca/orgs/:org_id/certificates - Certificates of an organization

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use xavyo_ca::{OrgCertificates, RevokeRequest, SignRequest};
use xavyo_ca_db::{Certificate, RevokedCertificate};

use crate::error::{ApiError, ApiResult};
use crate::models::{
    CertificateListResponse, ListParams, RevokedListResponse, UpdateLabelRequest,
};
use crate::router::CaState;

/// POST /v1/ca/certificates
pub async fn sign_certificate(
    State(state): State<CaState>,
    Json(request): Json<SignRequest>,
) -> ApiResult<(StatusCode, Json<Certificate>)> {
    let cert = state.service.sign_certificate(&request).await?;
    Ok((StatusCode::CREATED, Json(cert)))
}

/// GET /v1/ca/certificates/:id
///
/// A numeric path segment is a certificate id; anything else is looked up as
/// a subject key identifier.
pub async fn get_certificate(
    State(state): State<CaState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Certificate>> {
    let cert = match id.parse::<i64>() {
        Ok(id) => state.service.get_certificate(id).await?,
        Err(_) => state.service.get_certificate_by_skid(&id).await?,
    };
    Ok(Json(cert))
}

/// PATCH /v1/ca/certificates/:id/label
pub async fn update_certificate_label(
    State(state): State<CaState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateLabelRequest>,
) -> ApiResult<Json<Certificate>> {
    let cert = state
        .service
        .update_certificate_label(id, &request.label)
        .await?;
    Ok(Json(cert))
}

/// POST /v1/ca/certificates/revoke
pub async fn revoke_certificate(
    State(state): State<CaState>,
    Json(request): Json<RevokeRequest>,
) -> ApiResult<Json<RevokedCertificate>> {
    let revoked = state.service.revoke_certificate(&request).await?;
    Ok(Json(revoked))
}

/// GET /v1/ca/certificates?ikid=&limit=&after=
pub async fn list_certificates(
    State(state): State<CaState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<CertificateListResponse>> {
    let ikid = required_ikid(&params)?;
    let certificates = state
        .service
        .list_certificates(ikid, params.limit, params.after)
        .await?;
    Ok(Json(CertificateListResponse { certificates }))
}

/// GET /v1/ca/revoked?ikid=&limit=&after=
pub async fn list_revoked_certificates(
    State(state): State<CaState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<RevokedListResponse>> {
    let ikid = required_ikid(&params)?;
    let revoked = state
        .service
        .list_revoked_certificates(ikid, params.limit, params.after)
        .await?;
    Ok(Json(RevokedListResponse { revoked }))
}

/// GET /v1/ca/orgs/:org_id/certificates
pub async fn get_org_certificates(
    State(state): State<CaState>,
    Path(org_id): Path<i64>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<OrgCertificates>> {
    let certs = state
        .service
        .get_org_certificates(org_id, params.limit, params.after)
        .await?;
    Ok(Json(certs))
}

fn required_ikid(params: &ListParams) -> ApiResult<&str> {
    params
        .ikid
        .as_deref()
        .filter(|ikid| !ikid.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing ikid".to_string()))
}
