//! Issuer, profile and delegated issuer handlers.
//!
//! - GET  /v1/ca/issuers
//! - GET  /v1/ca/issuers/:label
//! - GET  /v1/ca/profiles/:profile?label=
//! - GET  /v1/ca/delegated?limit=&after=
//! - POST /v1/ca/delegated
//! - POST /v1/ca/delegated/:label/archive

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use xavyo_ca::{IssuerInfo, ProfileInfo, SignRequest};

use crate::error::ApiResult;
use crate::models::{IssuerListResponse, ListParams, ProfileQuery};
use crate::router::CaState;

pub async fn list_issuers(State(state): State<CaState>) -> Json<IssuerListResponse> {
    Json(IssuerListResponse {
        issuers: state.service.issuers(),
    })
}

pub async fn get_issuer(
    State(state): State<CaState>,
    Path(label): Path<String>,
) -> ApiResult<Json<IssuerInfo>> {
    Ok(Json(state.service.get_issuer(&label)?))
}

pub async fn get_profile(
    State(state): State<CaState>,
    Path(profile): Path<String>,
    Query(query): Query<ProfileQuery>,
) -> ApiResult<Json<ProfileInfo>> {
    let info = state
        .service
        .profile_info(&profile, query.label.as_deref())?;
    Ok(Json(info))
}

pub async fn list_delegated_issuers(
    State(state): State<CaState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<IssuerListResponse>> {
    let issuers = state
        .service
        .list_delegated_issuers(params.limit, params.after)
        .await?;
    Ok(Json(IssuerListResponse { issuers }))
}

/// POST /v1/ca/delegated
///
/// The body names the parent's profile, the new label and the owning org.
pub async fn register_delegated_issuer(
    State(state): State<CaState>,
    Json(request): Json<SignRequest>,
) -> ApiResult<(StatusCode, Json<IssuerInfo>)> {
    let info = state.service.register_delegated_issuer(&request).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn archive_delegated_issuer(
    State(state): State<CaState>,
    Path(label): Path<String>,
) -> ApiResult<Json<IssuerInfo>> {
    Ok(Json(state.service.archive_delegated_issuer(&label).await?))
}
