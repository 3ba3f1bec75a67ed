//! Publication of issued certificates and CRLs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use xavyo_ca_db::Certificate;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Destination for issued certificates and CRLs.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Where `cert` will be reachable once published.
    fn certificate_location(&self, cert: &Certificate) -> String;

    async fn publish_certificate(&self, cert: &Certificate) -> Result<(), PublishError>;

    /// Publish a DER CRL for the issuer `ikid`.
    async fn publish_crl(&self, ikid: &str, der: &[u8]) -> Result<(), PublishError>;
}

/// Writes files under a directory served at `base_url`.
///
/// Certificates land at `<dir>/<ikid[:4]>/<serial fragment>.crt` as PEM,
/// CRLs at `<dir>/<ikid>.crl` as DER.
#[derive(Debug, Clone)]
pub struct FilePublisher {
    dir: PathBuf,
    base_url: String,
}

impl FilePublisher {
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write(&self, relative: &str, contents: &[u8]) -> Result<(), PublishError> {
        let path = self.dir.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PublishError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|source| PublishError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "Published");
        Ok(())
    }
}

#[async_trait]
impl Publisher for FilePublisher {
    fn certificate_location(&self, cert: &Certificate) -> String {
        format!("{}/{}.crt", self.base_url, cert.file_name())
    }

    async fn publish_certificate(&self, cert: &Certificate) -> Result<(), PublishError> {
        self.write(&format!("{}.crt", cert.file_name()), cert.pem.as_bytes())
            .await
    }

    async fn publish_crl(&self, ikid: &str, der: &[u8]) -> Result<(), PublishError> {
        self.write(&format!("{ikid}.crl"), der).await
    }
}
