use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::acquisition::{AcquisitionOutcome, BaseCrlRequest, acquire_base_crl};
use super::delta::{DeltaRequest, reconcile_delta};
use super::errors::{CrlError, CrlResult};
use super::extensions::normalize_serial;
use super::fetcher::{CrlFetcher, HttpCrlFetcher};
use super::freshness::{CacheState, should_fetch_delta};
use super::store::{CaCertificateStore, CrlStore};
use super::types::{CertificateInfo, CrlEntry, CrlRecord, IssuerKey};
use crate::config::CrlConfig;

/// Revocation status of a certificate as seen through the cached CRL of its issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationStatus {
    /// Not listed. `fresh` is false when the backing CRL is past its nextUpdate.
    Good { fresh: bool },
    /// Listed with the given entry.
    Revoked { entry: CrlEntry, fresh: bool },
}

impl RevocationStatus {
    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::Revoked { .. })
    }

    pub fn is_fresh(&self) -> bool {
        match self {
            Self::Good { fresh } | Self::Revoked { fresh, .. } => *fresh,
        }
    }
}

/// Keeps one cached CRL record per issuer up to date and answers revocation lookups against it.
///
/// Reconciliation for an issuer key is serialized; different issuers proceed in parallel.
#[derive(Clone)]
pub struct CrlManager {
    store: Arc<dyn CrlStore>,
    fetcher: Arc<dyn CrlFetcher>,
    ca_store: Arc<dyn CaCertificateStore>,
    locks: Arc<DashMap<IssuerKey, Arc<Mutex<()>>>>,
    serve_stale_on_failure: bool,
}

/// Base CRL refresh result: the record to use and whether it was actually confirmed.
struct BaseRefresh {
    record: CrlRecord,
    confirmed: bool,
}

impl CrlManager {
    pub fn new(
        store: Arc<dyn CrlStore>,
        fetcher: Arc<dyn CrlFetcher>,
        ca_store: Arc<dyn CaCertificateStore>,
    ) -> Self {
        Self {
            store,
            fetcher,
            ca_store,
            locks: Arc::new(DashMap::new()),
            serve_stale_on_failure: true,
        }
    }

    /// Whether a stale record may be served when every distribution point fails.
    pub fn with_serve_stale(mut self, serve_stale_on_failure: bool) -> Self {
        self.serve_stale_on_failure = serve_stale_on_failure;
        self
    }

    /// Builds a manager fetching over HTTP with the configured limits.
    ///
    /// Returns an error if the HTTP client cannot be initialized
    pub fn from_config(
        config: &CrlConfig,
        store: Arc<dyn CrlStore>,
        ca_store: Arc<dyn CaCertificateStore>,
    ) -> CrlResult<Self> {
        let fetcher = HttpCrlFetcher::new(config)?;
        Ok(Self::new(store, Arc::new(fetcher), ca_store)
            .with_serve_stale(config.serve_stale_on_failure))
    }

    /// Returns the current CRL record for the certificate's issuer, refreshing it as needed.
    ///
    /// The work runs on its own task: if the caller stops waiting, the reconciliation still
    /// completes and leaves the cache consistent.
    pub async fn ensure_crl(
        &self,
        certificate: &CertificateInfo,
        issuer: &CertificateInfo,
    ) -> CrlResult<CrlRecord> {
        let key = IssuerKey::new(&certificate.issuer_dn, &issuer.serial_number);
        let base_urls = certificate.crl_distribution_point_urls();
        let delta_urls = certificate.freshest_crl_urls();

        let manager = self.clone();
        tokio::spawn(async move { manager.reconcile(key, base_urls, delta_urls).await })
            .await
            .map_err(|e| CrlError::Custom(format!("CRL reconciliation task failed: {e}")))?
    }

    /// Refreshes the issuer's CRL and looks the certificate up in it.
    ///
    /// Failing to obtain any CRL is an error, never [`RevocationStatus::Good`].
    pub async fn check_revocation(
        &self,
        certificate: &CertificateInfo,
        issuer: &CertificateInfo,
    ) -> CrlResult<RevocationStatus> {
        let record = self.ensure_crl(certificate, issuer).await?;
        let fresh = record.is_fresh(Utc::now());

        match self
            .is_revoked(record.id(), &certificate.serial_number)
            .await?
        {
            Some(entry) => {
                warn!(
                    "Certificate {} is revoked by {} since {} ({})",
                    certificate.serial_number,
                    record.issuer(),
                    entry.revocation_date,
                    entry.revocation_reason
                );
                Ok(RevocationStatus::Revoked { entry, fresh })
            }
            None => {
                debug!(
                    "Certificate {} is not listed in CRL {} of {}",
                    certificate.serial_number,
                    record.crl_number(),
                    record.issuer()
                );
                Ok(RevocationStatus::Good { fresh })
            }
        }
    }

    /// [`Self::check_revocation`] for DER encoded certificates.
    pub async fn check_revocation_der(
        &self,
        certificate_der: &[u8],
        issuer_der: &[u8],
    ) -> CrlResult<RevocationStatus> {
        let certificate = CertificateInfo::from_der(certificate_der)?;
        let issuer = CertificateInfo::from_der(issuer_der)?;
        self.check_revocation(&certificate, &issuer).await
    }

    /// Looks a serial number up under a record. `None` only means "not listed": combine it with
    /// the freshness of the record before trusting it.
    pub async fn is_revoked(
        &self,
        record_id: Uuid,
        serial_number_hex: &str,
    ) -> CrlResult<Option<CrlEntry>> {
        let serial = normalize_serial(serial_number_hex);
        Ok(self.store.find_entry(record_id, &serial).await?)
    }

    /// Drops the cached record of an issuer. Returns whether one existed.
    pub async fn evict(&self, issuer: &IssuerKey) -> CrlResult<bool> {
        let lock = self.issuer_lock(issuer);
        let evicted = {
            let _guard = lock.lock().await;
            match self.store.find_record(issuer).await? {
                Some(record) => {
                    self.store.delete_record(record.id()).await?;
                    info!("Evicted CRL {} of {}", record.crl_number(), issuer);
                    true
                }
                None => false,
            }
        };
        drop(lock);
        self.release_lock(issuer);
        Ok(evicted)
    }

    /// Drops records whose nextUpdate is older than `now - grace`, or that have none.
    ///
    /// Returns the number of records removed.
    pub async fn purge_expired(&self, grace: chrono::Duration) -> CrlResult<usize> {
        let cutoff = Utc::now() - grace;
        let candidates: Vec<CrlRecord> = self
            .store
            .list_records()
            .await?
            .into_iter()
            .filter(|record| record.next_update().is_none_or(|next| next < cutoff))
            .collect();

        let mut purged = 0;
        for candidate in candidates {
            let lock = self.issuer_lock(candidate.issuer());
            {
                let _guard = lock.lock().await;
                // A concurrent refresh may have replaced or dropped it in the meantime
                if self.store.get_record(candidate.id()).await?.is_some() {
                    self.store.delete_record(candidate.id()).await?;
                    purged += 1;
                }
            }
            drop(lock);
            self.release_lock(candidate.issuer());
        }

        if purged > 0 {
            info!("Purged {} expired CRL records", purged);
        }
        Ok(purged)
    }

    pub async fn cached_record_count(&self) -> CrlResult<usize> {
        Ok(self.store.count_records().await?)
    }

    async fn reconcile(
        &self,
        key: IssuerKey,
        base_urls: Vec<String>,
        delta_urls: Vec<String>,
    ) -> CrlResult<CrlRecord> {
        let lock = self.issuer_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.reconcile_locked(&key, &base_urls, &delta_urls).await
        };
        drop(lock);
        self.release_lock(&key);
        result
    }

    async fn reconcile_locked(
        &self,
        key: &IssuerKey,
        base_urls: &[String],
        delta_urls: &[String],
    ) -> CrlResult<CrlRecord> {
        let now = Utc::now();
        let cached = self.store.find_record(key).await?;
        let refresh = match (CacheState::of(cached.as_ref(), now), cached) {
            (CacheState::Fresh, Some(record)) => {
                debug!("Using cached CRL {} for {}", record.crl_number(), key);
                BaseRefresh {
                    record,
                    confirmed: true,
                }
            }
            (state, cached) => {
                debug!("CRL cache for {} is {:?}, refreshing base CRL", key, state);
                self.refresh_base(key, base_urls, cached).await?
            }
        };

        if !refresh.confirmed || !should_fetch_delta(&refresh.record, delta_urls, now) {
            return Ok(refresh.record);
        }

        let outcome = reconcile_delta(
            self.fetcher.as_ref(),
            self.store.as_ref(),
            DeltaRequest {
                delta_urls,
                base_urls,
                record: &refresh.record,
            },
        )
        .await?;
        Ok(outcome.into_record())
    }

    async fn refresh_base(
        &self,
        key: &IssuerKey,
        base_urls: &[String],
        cached: Option<CrlRecord>,
    ) -> CrlResult<BaseRefresh> {
        if base_urls.is_empty() {
            warn!("No CRL distribution points found for {}", key);
            return self.fall_back(cached, CrlError::NoDistributionPoint);
        }

        let ca_certificate_uuid = self.find_ca_certificate(key).await?;
        let outcome = acquire_base_crl(
            self.fetcher.as_ref(),
            self.store.as_ref(),
            BaseCrlRequest {
                urls: base_urls,
                issuer: key,
                ca_certificate_uuid,
                current_crl_number: cached.as_ref().map_or("", |record| record.crl_number()),
            },
        )
        .await?;

        match outcome {
            AcquisitionOutcome::Unchanged => match cached {
                Some(record) => Ok(BaseRefresh {
                    record,
                    confirmed: true,
                }),
                None => Err(CrlError::Unavailable),
            },
            AcquisitionOutcome::Replaced(record) => {
                if let Some(old) = cached {
                    self.store.delete_record(old.id()).await?;
                    info!(
                        "Replaced CRL {} with {} for {}",
                        old.crl_number(),
                        record.crl_number(),
                        key
                    );
                }
                Ok(BaseRefresh {
                    record,
                    confirmed: true,
                })
            }
            AcquisitionOutcome::Exhausted => self.fall_back(cached, CrlError::Unavailable),
        }
    }

    fn fall_back(&self, cached: Option<CrlRecord>, error: CrlError) -> CrlResult<BaseRefresh> {
        match cached {
            Some(record) if self.serve_stale_on_failure => {
                warn!(
                    "Serving stale CRL {} for {}: refresh failed ({})",
                    record.crl_number(),
                    record.issuer(),
                    error
                );
                Ok(BaseRefresh {
                    record,
                    confirmed: false,
                })
            }
            _ => Err(error),
        }
    }

    async fn find_ca_certificate(&self, key: &IssuerKey) -> CrlResult<Option<Uuid>> {
        let uuid = self.ca_store.find_ca_certificate(key).await?;
        if uuid.is_none() {
            warn!("No CA certificate found for {}", key);
        }
        Ok(uuid)
    }

    fn issuer_lock(&self, key: &IssuerKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forgets an issuer's lock once nobody holds or waits on it.
    fn release_lock(&self, key: &IssuerKey) {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.len()
    }
}
