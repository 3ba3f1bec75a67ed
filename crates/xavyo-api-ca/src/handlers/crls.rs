//! CRL handlers.
//!
//! - GET  /v1/ca/crls/:ikid - Latest CRL of an issuer, PEM or DER
//! - POST /v1/ca/crls/publish - Regenerate and publish CRLs

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;
use xavyo_ca::{x509, CaError};

use crate::error::ApiResult;
use crate::models::{CrlFormat, CrlListResponse, CrlQuery, PublishCrlsRequest};
use crate::router::CaState;

/// GET /v1/ca/crls/:ikid?format=pem|der
pub async fn get_crl(
    State(state): State<CaState>,
    Path(ikid): Path<String>,
    Query(query): Query<CrlQuery>,
) -> ApiResult<Response> {
    let crl = state.service.get_crl(&ikid).await?;
    let response = match query.format {
        CrlFormat::Pem => {
            ([(header::CONTENT_TYPE, "application/x-pem-file")], crl.pem).into_response()
        }
        CrlFormat::Der => {
            let der = x509::pem_to_der(&crl.pem, x509::PEM_CRL).map_err(|e| {
                error!(ikid = %ikid, error = %e, "Stored CRL is not valid PEM");
                CaError::internal("unable to decode CRL")
            })?;
            ([(header::CONTENT_TYPE, "application/pkix-crl")], der).into_response()
        }
    };
    Ok(response)
}

/// POST /v1/ca/crls/publish
///
/// On a partial failure the problem body lists the issuers already published.
pub async fn publish_crls(
    State(state): State<CaState>,
    body: Option<Json<PublishCrlsRequest>>,
) -> ApiResult<Json<CrlListResponse>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let crls = state.service.publish_crls(&request.ikid).await?;
    Ok(Json(CrlListResponse { crls }))
}
