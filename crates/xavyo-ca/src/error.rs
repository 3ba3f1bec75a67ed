//! Error types for the certificate lifecycle engine.
//!
//! Every engine operation reports one of five kinds. Messages are fixed per
//! operation and never carry raw storage or crypto backend text; the detail
//! goes to the logs instead.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result alias for engine operations.
pub type CaResult<T> = Result<T, CaError>;

/// Coarse error classification shared with transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Unimplemented,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Unimplemented => "unimplemented",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaError {
    /// Malformed, missing or contradictory input.
    #[error("{0}")]
    InvalidArgument(String),

    /// Issuer, profile or certificate lookup miss.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate issuer label or duplicate key.
    #[error("{0}")]
    AlreadyExists(String),

    /// Feature administratively disabled.
    #[error("{0}")]
    Unimplemented(String),

    /// Crypto, persistence, encoding or publication failure.
    #[error("{0}")]
    Internal(String),
}

impl CaError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn unimplemented(msg: impl Into<String>) -> Self {
        Self::Unimplemented(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::Unimplemented(_) => ErrorKind::Unimplemented,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The caller-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument(m)
            | Self::NotFound(m)
            | Self::AlreadyExists(m)
            | Self::Unimplemented(m)
            | Self::Internal(m) => m,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
