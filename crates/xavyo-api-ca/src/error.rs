//! Error types for the certificate authority API.
//!
//! Uses RFC 7807 Problem Details for HTTP APIs. OCSP endpoints do not use
//! these; they always answer with an OCSP response body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xavyo_ca::{CaError, CrlPublishError, ErrorKind};

/// Base URL for error type URIs.
const ERROR_BASE_URL: &str = "https://xavyo.net/errors/ca";

/// RFC 7807 Problem Details structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI identifying the problem type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// Short human-readable summary.
    pub title: String,

    /// HTTP status code.
    pub status: u16,

    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Issuers whose CRL was published before a publication failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<Vec<String>>,
}

impl ProblemDetails {
    #[must_use]
    pub fn new(error_type: &str, title: &str, status: StatusCode) -> Self {
        Self {
            error_type: format!("{ERROR_BASE_URL}/{error_type}"),
            title: title.to_string(),
            status: status.as_u16(),
            detail: None,
            published: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failure reported by the engine.
    #[error(transparent)]
    Ca(#[from] CaError),

    /// CRL publication stopped part-way.
    #[error(transparent)]
    CrlPublish(#[from] CrlPublishError),

    /// Malformed path or query parameter.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Ca(err) => status_for(err.kind()),
            ApiError::CrlPublish(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Convert to `ProblemDetails`.
    #[must_use]
    pub fn to_problem_details(&self) -> ProblemDetails {
        let status = self.status_code();
        match self {
            ApiError::Ca(err) => {
                let (error_type, title) = match err.kind() {
                    ErrorKind::InvalidArgument => ("invalid-argument", "Invalid Argument"),
                    ErrorKind::NotFound => ("not-found", "Not Found"),
                    ErrorKind::AlreadyExists => ("already-exists", "Already Exists"),
                    ErrorKind::Unimplemented => ("unimplemented", "Not Implemented"),
                    ErrorKind::Internal => ("internal-error", "Internal Server Error"),
                };
                ProblemDetails::new(error_type, title, status).with_detail(err.message())
            }
            ApiError::CrlPublish(err) => {
                let mut problem =
                    ProblemDetails::new("crl-publish-failed", "CRL Publication Failed", status)
                        .with_detail(err.source.message());
                problem.published = Some(err.published.iter().map(|c| c.ikid.clone()).collect());
                problem
            }
            ApiError::BadRequest(msg) => {
                ProblemDetails::new("bad-request", "Bad Request", status).with_detail(msg.clone())
            }
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let problem = self.to_problem_details();

        let mut response = (status, Json(problem)).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );

        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
