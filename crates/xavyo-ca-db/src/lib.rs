//! xavyo certificate authority persistence
//!
//! Models and the [`CaDb`] store contract for issued certificates,
//! revocations, CRLs, trusted roots, issuers and certificate profiles.
//!
//! # Modules
//!
//! - [`models`] - Row types shared by every store
//! - [`store`] - The [`CaDb`] trait
//! - [`memory`] - In-process store for tests and single-node deployments
//! - [`postgres`] - `SQLx` store over PostgreSQL
//! - [`id`] - Time-ordered record identifiers
//!
//! # Example
//!
//! ```
//! use xavyo_ca_db::{CaDb, MemoryCaDb};
//!
//! # async fn example() -> xavyo_ca_db::DbResult<()> {
//! let db = MemoryCaDb::new();
//! let page = db.list_certificates("a1b2", 100, 0).await?;
//! assert!(page.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod id;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod postgres;
pub mod store;

pub use error::{DbError, DbResult};
pub use id::{IdGenerator, SnowflakeIdGenerator};
pub use memory::MemoryCaDb;
pub use migrations::run_migrations;
pub use models::{
    CertProfileRecord, Certificate, Crl, IssuerRecord, IssuerStatus, RevocationReason,
    RevokedCertificate, RootCertificate, Trust, ANY_ISSUER,
};
pub use postgres::PgCaDb;
pub use store::{page_size, CaDb, DEFAULT_PAGE_SIZE};
