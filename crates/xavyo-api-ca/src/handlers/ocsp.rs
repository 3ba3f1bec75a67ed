//! OCSP handlers (RFC 6960 appendix A).
//!
//! - GET  /v1/ocsp/{base64 request}
//! - POST /v1/ocsp with an `application/ocsp-request` body
//!
//! Both always answer 200 with an OCSP response; failures use the fixed
//! unsuccessful responses rather than problem details.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;
use xavyo_ca::responder;
use xavyo_ca::CaError;

use crate::router::CaState;

const OCSP_RESPONSE: &str = "application/ocsp-response";

/// GET /v1/ocsp/*encoded
pub async fn ocsp_get(State(state): State<CaState>, Path(encoded): Path<String>) -> Response {
    match decode_get_request(&encoded) {
        Ok(der) => respond(&state, &der).await,
        Err(err) => ocsp_response(responder::error_response(&err).to_vec()),
    }
}

/// POST /v1/ocsp
pub async fn ocsp_post(State(state): State<CaState>, body: Bytes) -> Response {
    respond(&state, &body).await
}

async fn respond(state: &CaState, der: &[u8]) -> Response {
    match state.service.sign_ocsp(der).await {
        Ok(body) => ocsp_response(body),
        Err(err) => {
            debug!(error = %err, "OCSP request failed");
            ocsp_response(responder::error_response(&err).to_vec())
        }
    }
}

/// Recover the DER request from the URL-decoded path of a GET request.
///
/// Clients do not always escape `+` in the base64 text, so a space left by
/// URL decoding is read back as `+`. DER requests never encode to a leading
/// `/`, so one is dropped.
pub fn decode_get_request(encoded: &str) -> Result<Vec<u8>, CaError> {
    let normalized = encoded.replace(' ', "+");
    let trimmed = normalized.strip_prefix('/').unwrap_or(&normalized);
    if trimmed.is_empty() {
        return Err(CaError::invalid_argument("missing request"));
    }
    STANDARD
        .decode(trimmed)
        .map_err(|_| CaError::invalid_argument("malformed base64 request"))
}

fn ocsp_response(body: Vec<u8>) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(OCSP_RESPONSE));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
