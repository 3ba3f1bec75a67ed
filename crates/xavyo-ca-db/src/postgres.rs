//! PostgreSQL implementation of [`CaDb`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

use crate::error::{DbError, DbResult};
use crate::models::{
    CertProfileRecord, Certificate, Crl, IssuerRecord, IssuerStatus, RevocationReason,
    RevokedCertificate, RootCertificate,
};
use crate::store::{page_size, CaDb};

const CERT_COLUMNS: &str = "id, org_id, skid, ikid, serial_number, not_before, not_after, \
     subject, issuer, sha256, profile, pem, issuers_pem, label, locations, metadata";

const REVOKED_COLUMNS: &str = "id, org_id, skid, ikid, serial_number, not_before, not_after, \
     subject, issuer, sha256, profile, pem, issuers_pem, label, locations, metadata, \
     revoked_at, reason";

/// Store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgCaDb {
    pool: PgPool,
}

impl PgCaDb {
    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ConnectionFailed`] when the database is unreachable.
    pub async fn connect(url: &str, max_connections: u32) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(DbError::ConnectionFailed)?;
        tracing::info!(max_connections, "Connected to certificate database");
        Ok(Self { pool })
    }

    /// Underlying pool, for migrations and health checks.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::ConnectionFailed)?;
        Ok(())
    }
}

fn limit_param(limit: u32) -> i64 {
    page_size(limit) as i64
}

fn not_found_as(err: sqlx::Error, what: impl Into<String>) -> DbError {
    match err {
        sqlx::Error::RowNotFound => DbError::NotFound(what.into()),
        other => other.into(),
    }
}

#[async_trait]
impl CaDb for PgCaDb {
    async fn register_root_certificate(&self, root: &RootCertificate) -> DbResult<RootCertificate> {
        let stored = sqlx::query_as::<_, RootCertificate>(
            r"
            INSERT INTO roots (id, skid, not_before, not_after, subject, sha256, trust, pem)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (skid)
            DO UPDATE SET trust = EXCLUDED.trust
            RETURNING id, skid, not_before, not_after, subject, sha256, trust, pem
            ",
        )
        .bind(root.id)
        .bind(&root.skid)
        .bind(root.not_before)
        .bind(root.not_after)
        .bind(&root.subject)
        .bind(&root.sha256)
        .bind(root.trust)
        .bind(&root.pem)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn list_root_certificates(&self) -> DbResult<Vec<RootCertificate>> {
        let roots = sqlx::query_as::<_, RootCertificate>(
            r"
            SELECT id, skid, not_before, not_after, subject, sha256, trust, pem
            FROM roots
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(roots)
    }

    async fn register_certificate(&self, cert: &Certificate) -> DbResult<Certificate> {
        let sql = format!(
            r"
            INSERT INTO certificates ({CERT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (sha256)
            DO UPDATE SET
                org_id = EXCLUDED.org_id,
                issuers_pem = EXCLUDED.issuers_pem,
                label = EXCLUDED.label,
                locations = EXCLUDED.locations,
                metadata = EXCLUDED.metadata
            RETURNING {CERT_COLUMNS}
            "
        );
        let stored = sqlx::query_as::<_, Certificate>(&sql)
            .bind(cert.id)
            .bind(cert.org_id)
            .bind(&cert.skid)
            .bind(&cert.ikid)
            .bind(&cert.serial_number)
            .bind(cert.not_before)
            .bind(cert.not_after)
            .bind(&cert.subject)
            .bind(&cert.issuer)
            .bind(&cert.sha256)
            .bind(&cert.profile)
            .bind(&cert.pem)
            .bind(&cert.issuers_pem)
            .bind(&cert.label)
            .bind(&cert.locations)
            .bind(Json(&cert.metadata))
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }

    async fn remove_certificate(&self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM certificates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_certificate_label(&self, id: i64, label: &str) -> DbResult<Certificate> {
        let sql = format!(
            r"
            UPDATE certificates
            SET label = $2
            WHERE id = $1
            RETURNING {CERT_COLUMNS}
            "
        );
        sqlx::query_as::<_, Certificate>(&sql)
            .bind(id)
            .bind(label)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_as(e, format!("certificate {id}")))
    }

    async fn get_certificate(&self, id: i64) -> DbResult<Certificate> {
        let sql = format!("SELECT {CERT_COLUMNS} FROM certificates WHERE id = $1");
        sqlx::query_as::<_, Certificate>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_as(e, format!("certificate {id}")))
    }

    async fn get_certificates_by_skid(&self, skid: &str) -> DbResult<Vec<Certificate>> {
        let sql = format!("SELECT {CERT_COLUMNS} FROM certificates WHERE skid = $1 ORDER BY id");
        let certs = sqlx::query_as::<_, Certificate>(&sql)
            .bind(skid)
            .fetch_all(&self.pool)
            .await?;
        if certs.is_empty() {
            return Err(DbError::not_found(format!("certificate skid={skid}")));
        }
        Ok(certs)
    }

    async fn get_certificate_by_ikid_and_serial(
        &self,
        ikid: &str,
        serial: &str,
    ) -> DbResult<Certificate> {
        let sql = format!(
            "SELECT {CERT_COLUMNS} FROM certificates WHERE ikid = $1 AND serial_number = $2"
        );
        sqlx::query_as::<_, Certificate>(&sql)
            .bind(ikid)
            .bind(serial)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_as(e, format!("certificate ikid={ikid} serial={serial}")))
    }

    async fn list_certificates(
        &self,
        ikid: &str,
        limit: u32,
        after: i64,
    ) -> DbResult<Vec<Certificate>> {
        let sql = format!(
            r"
            SELECT {CERT_COLUMNS}
            FROM certificates
            WHERE ikid = $1 AND id > $2
            ORDER BY id
            LIMIT $3
            "
        );
        let certs = sqlx::query_as::<_, Certificate>(&sql)
            .bind(ikid)
            .bind(after)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(certs)
    }

    async fn list_org_certificates(
        &self,
        org_id: i64,
        limit: u32,
        after: i64,
    ) -> DbResult<Vec<Certificate>> {
        let sql = format!(
            r"
            SELECT {CERT_COLUMNS}
            FROM certificates
            WHERE org_id = $1 AND id > $2
            ORDER BY id
            LIMIT $3
            "
        );
        let certs = sqlx::query_as::<_, Certificate>(&sql)
            .bind(org_id)
            .bind(after)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(certs)
    }

    async fn register_revoked_certificate(
        &self,
        revoked: &RevokedCertificate,
    ) -> DbResult<RevokedCertificate> {
        let mut conn = self.pool.acquire().await.map_err(DbError::ConnectionFailed)?;
        insert_revoked(&mut conn, revoked).await
    }

    async fn remove_revoked_certificate(&self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM revoked WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_certificate(
        &self,
        cert: &Certificate,
        at: DateTime<Utc>,
        reason: RevocationReason,
    ) -> DbResult<RevokedCertificate> {
        let mut tx = self.pool.begin().await.map_err(DbError::ConnectionFailed)?;

        let sql = format!("DELETE FROM certificates WHERE id = $1 RETURNING {CERT_COLUMNS}");
        let active = sqlx::query_as::<_, Certificate>(&sql)
            .bind(cert.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found(format!("certificate {}", cert.id)))?;

        let revoked = RevokedCertificate {
            certificate: active,
            revoked_at: at,
            reason,
        };
        let stored = insert_revoked(&mut tx, &revoked).await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn get_revoked_certificate_by_ikid_and_serial(
        &self,
        ikid: &str,
        serial: &str,
    ) -> DbResult<RevokedCertificate> {
        let sql =
            format!("SELECT {REVOKED_COLUMNS} FROM revoked WHERE ikid = $1 AND serial_number = $2");
        sqlx::query_as::<_, RevokedCertificate>(&sql)
            .bind(ikid)
            .bind(serial)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_as(e, format!("revoked ikid={ikid} serial={serial}")))
    }

    async fn list_revoked_certificates(
        &self,
        ikid: &str,
        limit: u32,
        after: i64,
    ) -> DbResult<Vec<RevokedCertificate>> {
        let sql = format!(
            r"
            SELECT {REVOKED_COLUMNS}
            FROM revoked
            WHERE ikid = $1 AND id > $2
            ORDER BY id
            LIMIT $3
            "
        );
        let revoked = sqlx::query_as::<_, RevokedCertificate>(&sql)
            .bind(ikid)
            .bind(after)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(revoked)
    }

    async fn list_org_revoked_certificates(
        &self,
        org_id: i64,
        limit: u32,
        after: i64,
    ) -> DbResult<Vec<RevokedCertificate>> {
        let sql = format!(
            r"
            SELECT {REVOKED_COLUMNS}
            FROM revoked
            WHERE org_id = $1 AND id > $2
            ORDER BY id
            LIMIT $3
            "
        );
        let revoked = sqlx::query_as::<_, RevokedCertificate>(&sql)
            .bind(org_id)
            .bind(after)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(revoked)
    }

    async fn register_crl(&self, crl: &Crl) -> DbResult<Crl> {
        let stored = sqlx::query_as::<_, Crl>(
            r"
            INSERT INTO crls (id, ikid, this_update, next_update, issuer, pem)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (ikid)
            DO UPDATE SET
                this_update = EXCLUDED.this_update,
                next_update = EXCLUDED.next_update,
                pem = EXCLUDED.pem
            RETURNING id, ikid, this_update, next_update, issuer, pem
            ",
        )
        .bind(crl.id)
        .bind(&crl.ikid)
        .bind(crl.this_update)
        .bind(crl.next_update)
        .bind(&crl.issuer)
        .bind(&crl.pem)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn get_crl(&self, ikid: &str) -> DbResult<Crl> {
        sqlx::query_as::<_, Crl>(
            r"
            SELECT id, ikid, this_update, next_update, issuer, pem
            FROM crls
            WHERE ikid = $1
            ",
        )
        .bind(ikid)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_as(e, format!("crl ikid={ikid}")))
    }

    async fn remove_crl(&self, ikid: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM crls WHERE ikid = $1")
            .bind(ikid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn register_issuer(&self, issuer: &IssuerRecord) -> DbResult<IssuerRecord> {
        let stored = sqlx::query_as::<_, IssuerRecord>(
            r"
            INSERT INTO issuers (id, label, status, config, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (label)
            DO UPDATE SET
                status = EXCLUDED.status,
                config = EXCLUDED.config,
                updated_at = NOW()
            RETURNING id, label, status, config, created_at, updated_at
            ",
        )
        .bind(issuer.id)
        .bind(&issuer.label)
        .bind(issuer.status)
        .bind(&issuer.config)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn update_issuer_status(
        &self,
        label: &str,
        status: IssuerStatus,
    ) -> DbResult<IssuerRecord> {
        sqlx::query_as::<_, IssuerRecord>(
            r"
            UPDATE issuers
            SET status = $2, updated_at = NOW()
            WHERE label = $1
            RETURNING id, label, status, config, created_at, updated_at
            ",
        )
        .bind(label)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_as(e, format!("issuer {label}")))
    }

    async fn get_issuer_by_label(&self, label: &str) -> DbResult<IssuerRecord> {
        sqlx::query_as::<_, IssuerRecord>(
            r"
            SELECT id, label, status, config, created_at, updated_at
            FROM issuers
            WHERE label = $1
            ",
        )
        .bind(label)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_as(e, format!("issuer {label}")))
    }

    async fn list_issuers(&self, limit: u32, after: i64) -> DbResult<Vec<IssuerRecord>> {
        let issuers = sqlx::query_as::<_, IssuerRecord>(
            r"
            SELECT id, label, status, config, created_at, updated_at
            FROM issuers
            WHERE id > $1
            ORDER BY id
            LIMIT $2
            ",
        )
        .bind(after)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(issuers)
    }

    async fn delete_issuer(&self, label: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM issuers WHERE label = $1")
            .bind(label)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn register_cert_profile(
        &self,
        profile: &CertProfileRecord,
    ) -> DbResult<CertProfileRecord> {
        let stored = sqlx::query_as::<_, CertProfileRecord>(
            r"
            INSERT INTO cert_profiles (id, label, issuer_label, config, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (label)
            DO UPDATE SET
                issuer_label = EXCLUDED.issuer_label,
                config = EXCLUDED.config,
                updated_at = NOW()
            RETURNING id, label, issuer_label, config, created_at, updated_at
            ",
        )
        .bind(profile.id)
        .bind(&profile.label)
        .bind(&profile.issuer_label)
        .bind(&profile.config)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn get_cert_profile(&self, label: &str) -> DbResult<CertProfileRecord> {
        sqlx::query_as::<_, CertProfileRecord>(
            r"
            SELECT id, label, issuer_label, config, created_at, updated_at
            FROM cert_profiles
            WHERE label = $1
            ",
        )
        .bind(label)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_as(e, format!("profile {label}")))
    }

    async fn get_cert_profiles_by_issuer(
        &self,
        issuer_label: &str,
    ) -> DbResult<Vec<CertProfileRecord>> {
        let profiles = sqlx::query_as::<_, CertProfileRecord>(
            r"
            SELECT id, label, issuer_label, config, created_at, updated_at
            FROM cert_profiles
            WHERE issuer_label = $1
            ORDER BY label
            ",
        )
        .bind(issuer_label)
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    async fn list_cert_profiles(&self) -> DbResult<Vec<CertProfileRecord>> {
        let profiles = sqlx::query_as::<_, CertProfileRecord>(
            r"
            SELECT id, label, issuer_label, config, created_at, updated_at
            FROM cert_profiles
            ORDER BY label
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    async fn delete_cert_profile(&self, label: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM cert_profiles WHERE label = $1")
            .bind(label)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn insert_revoked(
    conn: &mut sqlx::PgConnection,
    revoked: &RevokedCertificate,
) -> DbResult<RevokedCertificate> {
    let cert = &revoked.certificate;
    let sql = format!(
        r"
        INSERT INTO revoked ({REVOKED_COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        ON CONFLICT (sha256)
        DO UPDATE SET
            org_id = EXCLUDED.org_id,
            issuers_pem = EXCLUDED.issuers_pem
        RETURNING {REVOKED_COLUMNS}
        "
    );
    let stored = sqlx::query_as::<_, RevokedCertificate>(&sql)
        .bind(cert.id)
        .bind(cert.org_id)
        .bind(&cert.skid)
        .bind(&cert.ikid)
        .bind(&cert.serial_number)
        .bind(cert.not_before)
        .bind(cert.not_after)
        .bind(&cert.subject)
        .bind(&cert.issuer)
        .bind(&cert.sha256)
        .bind(&cert.profile)
        .bind(&cert.pem)
        .bind(&cert.issuers_pem)
        .bind(&cert.label)
        .bind(&cert.locations)
        .bind(Json(&cert.metadata))
        .bind(revoked.revoked_at)
        .bind(revoked.reason.as_i16())
        .fetch_one(&mut *conn)
        .await?;
    Ok(stored)
}
