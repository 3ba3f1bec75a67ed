//! CRL generation, background refresh and periodic publication.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use num_bigint::BigUint;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use xavyo_ca_db::{CaDb, Crl, IdGenerator};

use crate::crypto::RevokedEntry;
use crate::error::{CaError, CaResult};
use crate::issuer::Issuer;
use crate::metrics::CaMetrics;
use crate::profile::to_chrono;
use crate::publisher::Publisher;
use crate::registry::IssuerRegistry;
use crate::x509;

/// Failure part-way through a multi-issuer publication.
///
/// `published` holds the CRLs completed before the failure; any other
/// issuer's CRL may be stale.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct CrlPublishError {
    pub published: Vec<Crl>,
    #[source]
    pub source: CaError,
}

/// Builds, stores and publishes CRLs.
pub struct CrlBuilder {
    registry: Arc<IssuerRegistry>,
    db: Arc<dyn CaDb>,
    ids: Arc<dyn IdGenerator>,
    publisher: Option<Arc<dyn Publisher>>,
    metrics: CaMetrics,
    page_size: u32,
}

impl CrlBuilder {
    pub fn new(
        registry: Arc<IssuerRegistry>,
        db: Arc<dyn CaDb>,
        ids: Arc<dyn IdGenerator>,
        publisher: Option<Arc<dyn Publisher>>,
        metrics: CaMetrics,
        page_size: u32,
    ) -> Self {
        Self {
            registry,
            db,
            ids,
            publisher,
            metrics,
            page_size,
        }
    }

    /// Regenerate the CRL of `ikid`, or of every registered issuer when
    /// `ikid` is empty.
    pub async fn build_and_publish(&self, ikid: &str) -> Result<Vec<Crl>, CrlPublishError> {
        let targets = if ikid.is_empty() {
            self.registry.list()
        } else {
            let issuer = self
                .registry
                .resolve_by_ikid(ikid)
                .map_err(|source| CrlPublishError {
                    published: Vec::new(),
                    source,
                })?;
            vec![issuer]
        };

        let mut published = Vec::with_capacity(targets.len());
        for issuer in targets {
            match self.build_one(&issuer).await {
                Ok(crl) => published.push(crl),
                Err(source) => return Err(CrlPublishError { published, source }),
            }
        }
        Ok(published)
    }

    /// The stored CRL of `ikid`, generated on first request.
    pub async fn get(&self, ikid: &str) -> CaResult<Crl> {
        match self.db.get_crl(ikid).await {
            Ok(crl) => Ok(crl),
            Err(e) if e.is_not_found() => {
                debug!(ikid = %ikid, "No stored CRL, generating");
                self.build_and_publish(ikid)
                    .await
                    .map_err(|e| e.source)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| CaError::internal("failed to generate CRL"))
            }
            Err(e) => {
                error!(ikid = %ikid, error = %e, "Failed to load CRL");
                Err(CaError::internal("failed to load CRL"))
            }
        }
    }

    async fn revoked_entries(&self, ikid: &str) -> CaResult<Vec<RevokedEntry>> {
        let mut entries = Vec::new();
        let mut after = 0;
        loop {
            let page = self
                .db
                .list_revoked_certificates(ikid, self.page_size, after)
                .await
                .map_err(|e| {
                    error!(ikid = %ikid, after, error = %e, "Failed to list revoked certificates");
                    CaError::internal("failed to list revoked certificates")
                })?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.certificate.id;

            for revoked in page {
                let cert = &revoked.certificate;
                match BigUint::parse_bytes(cert.serial_number.as_bytes(), 10) {
                    Some(serial) => entries.push(RevokedEntry {
                        serial: serial.to_bytes_be(),
                        revoked_at: revoked.revoked_at,
                        reason: revoked.reason,
                    }),
                    None => warn!(
                        id = cert.id,
                        serial = %cert.serial_number,
                        "Skipping revoked certificate with invalid serial"
                    ),
                }
            }
        }
        Ok(entries)
    }

    async fn build_one(&self, issuer: &Issuer) -> CaResult<Crl> {
        let ikid = issuer.skid();
        let entries = self.revoked_entries(ikid).await?;

        let this_update = Utc::now().trunc_subsecs(0);
        let next_update = this_update + to_chrono(issuer.urls().crl_expiry);
        // Snowflake ids only grow, so they double as the CRL number.
        let id = self.ids.next_id();
        let crl_number = u64::try_from(id).map_err(|_| {
            error!(ikid = %ikid, id, "Negative id cannot be a CRL number");
            CaError::internal("failed to allocate CRL number")
        })?;

        let der = issuer
            .signer()
            .create_crl(&entries, this_update, next_update, crl_number)
            .await
            .map_err(|e| {
                error!(ikid = %ikid, error = %e, "Failed to sign CRL");
                CaError::internal("failed to sign CRL")
            })?;

        let crl = Crl {
            id,
            ikid: ikid.to_string(),
            this_update,
            next_update,
            issuer: issuer.subject().to_string(),
            pem: x509::der_to_pem(x509::PEM_CRL, &der),
        };
        let crl = self.db.register_crl(&crl).await.map_err(|e| {
            error!(ikid = %ikid, error = %e, "Failed to register CRL");
            CaError::internal("failed to register CRL")
        })?;

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish_crl(ikid, &der).await {
                self.metrics
                    .crl_publish_failed
                    .get_or_create(&CaMetrics::issuer(ikid))
                    .inc();
                error!(ikid = %ikid, error = %e, "Failed to publish CRL");
                return Err(CaError::internal("failed to publish CRL"));
            }
        }

        self.metrics
            .crl_published
            .get_or_create(&CaMetrics::issuer(ikid))
            .inc();
        info!(
            ikid = %ikid,
            label = %issuer.label(),
            revoked = entries.len(),
            next_update = %next_update,
            "CRL published"
        );
        Ok(crl)
    }
}

#[derive(Default)]
struct PendingRefresh {
    issuers: BTreeSet<String>,
    /// Set once more distinct issuers were requested than the queue holds.
    all: bool,
    /// Requests accepted so far, including merged ones.
    requested: u64,
}

struct RefreshShared {
    pending: Mutex<PendingRefresh>,
    capacity: usize,
}

/// Queue of CRL regenerations run by one background worker.
///
/// Requests for an issuer already pending are merged. Once `capacity`
/// distinct issuers are pending, further requests widen the batch to every
/// registered issuer. Failures are logged and never reach the requester.
#[derive(Clone)]
pub struct CrlRefreshQueue {
    shared: Arc<RefreshShared>,
    wake: mpsc::Sender<()>,
    handled: watch::Receiver<u64>,
}

impl CrlRefreshQueue {
    /// Start the worker.
    pub fn start(builder: Arc<CrlBuilder>, capacity: usize) -> (Self, JoinHandle<()>) {
        let shared = Arc::new(RefreshShared {
            pending: Mutex::new(PendingRefresh::default()),
            capacity: capacity.max(1),
        });
        let (wake, wake_rx) = mpsc::channel(1);
        let (handled_tx, handled) = watch::channel(0);
        let handle = tokio::spawn(run_refresh_worker(
            builder,
            Arc::clone(&shared),
            wake_rx,
            handled_tx,
        ));
        (
            Self {
                shared,
                wake,
                handled,
            },
            handle,
        )
    }

    /// Request regeneration of one issuer's CRL without waiting for it.
    pub fn enqueue(&self, ikid: &str) {
        {
            let mut pending = self.shared.pending.lock();
            pending.requested += 1;
            if !pending.all && !pending.issuers.contains(ikid) {
                if pending.issuers.len() >= self.shared.capacity {
                    warn!(
                        ikid = %ikid,
                        pending = pending.issuers.len(),
                        "CRL refresh queue full, refreshing every issuer"
                    );
                    pending.issuers.clear();
                    pending.all = true;
                } else {
                    pending.issuers.insert(ikid.to_string());
                }
            }
        }

        // A full wake slot means the worker has not drained yet.
        if let Err(mpsc::error::TrySendError::Closed(())) = self.wake.try_send(()) {
            warn!(ikid = %ikid, "CRL refresh worker stopped, dropping request");
        }
    }

    /// Wait until every request enqueued before this call has been handled.
    pub async fn flush(&self) {
        let target = self.shared.pending.lock().requested;
        let mut handled = self.handled.clone();
        if handled.wait_for(|done| *done >= target).await.is_err() {
            debug!("CRL refresh worker stopped before flush");
        }
    }
}

async fn run_refresh_worker(
    builder: Arc<CrlBuilder>,
    shared: Arc<RefreshShared>,
    mut wake: mpsc::Receiver<()>,
    handled: watch::Sender<u64>,
) {
    while wake.recv().await.is_some() {
        let (issuers, all, upto) = {
            let mut pending = shared.pending.lock();
            let issuers = std::mem::take(&mut pending.issuers);
            let all = std::mem::replace(&mut pending.all, false);
            (issuers, all, pending.requested)
        };

        if all {
            if let Err(e) = builder.build_and_publish("").await {
                error!(
                    published = e.published.len(),
                    error = %e.source,
                    "Background CRL refresh of every issuer failed"
                );
            }
        }
        for ikid in issuers {
            if let Err(e) = builder.build_and_publish(&ikid).await {
                error!(ikid = %ikid, error = %e.source, "Background CRL refresh failed");
            }
        }
        handled.send_replace(upto);
    }
    debug!("CRL refresh worker stopped");
}

/// Regenerate one issuer's CRL every `every` until `shutdown` fires.
pub fn spawn_periodic_publish(
    builder: Arc<CrlBuilder>,
    ikid: String,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(ikid = %ikid, every_secs = every.as_secs(), "CRL scheduler started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = builder.build_and_publish(&ikid).await {
                        error!(ikid = %ikid, error = %e.source, "Scheduled CRL publication failed");
                    }
                }
            }
        }
        debug!(ikid = %ikid, "CRL scheduler stopped");
    })
}
