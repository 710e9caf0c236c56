use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::acquisition::{AcquisitionOutcome, BaseCrlRequest, acquire_base_crl};
use super::errors::{CrlError, CrlResult};
use super::extensions::{compare_crl_numbers, extract_crl_number, extract_delta_indicator};
use super::fetcher::CrlFetcher;
use super::store::CrlStore;
use super::types::{CrlEntry, CrlRecord, ParsedCrl, RevokedEntry};

/// Inputs for one delta reconciliation pass.
#[derive(Debug, Clone, Copy)]
pub struct DeltaRequest<'a> {
    /// Freshest CRL URLs of the certificate
    pub delta_urls: &'a [String],
    /// CRL Distribution Point URLs of the certificate, used when the delta needs a newer base
    pub base_urls: &'a [String],
    pub record: &'a CrlRecord,
}

/// What a delta reconciliation pass did. Each variant carries the record that is now current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Every delta URL failed; the record is untouched
    Unavailable(CrlRecord),
    /// The delta was not newer than the last merged one
    Discarded(CrlRecord),
    /// The delta was merged
    Merged(CrlRecord),
}

impl DeltaOutcome {
    pub fn record(&self) -> &CrlRecord {
        match self {
            Self::Unavailable(record) | Self::Discarded(record) | Self::Merged(record) => record,
        }
    }

    pub fn into_record(self) -> CrlRecord {
        match self {
            Self::Unavailable(record) | Self::Discarded(record) | Self::Merged(record) => record,
        }
    }
}

/// Fetches the first available delta CRL and layers it on top of the cached base.
///
/// Recoverable fetch failures advance to the next URL. Once a delta CRL has been parsed no
/// further URLs are tried: an issuer mismatch or an indicator that cannot be matched to a base
/// CRL fails the whole pass.
pub async fn reconcile_delta(
    fetcher: &dyn CrlFetcher,
    store: &dyn CrlStore,
    request: DeltaRequest<'_>,
) -> CrlResult<DeltaOutcome> {
    for url in request.delta_urls {
        let delta = match fetcher.fetch(url).await {
            Ok(delta) => delta,
            Err(e) if e.is_recoverable() => {
                warn!("Failed to fetch delta CRL from {}: {}", url, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        if delta.issuer_dn != request.record.crl_issuer_dn() {
            return Err(CrlError::Validation(format!(
                "Delta CRL issuer '{}' from {} does not match base CRL issuer '{}'",
                delta.issuer_dn,
                url,
                request.record.crl_issuer_dn()
            )));
        }

        let (indicator, delta_number) =
            match extract_delta_indicator(&delta).and_then(|indicator| {
                extract_crl_number(&delta).map(|number| (indicator, number))
            }) {
                Ok(numbers) => numbers,
                Err(e) => {
                    warn!("Ignoring delta CRL from {}: {}", url, e);
                    continue;
                }
            };

        return apply_delta(fetcher, store, request, &delta, &indicator, delta_number).await;
    }

    debug!(
        "No delta CRL available for {}, keeping delta state",
        request.record.issuer()
    );
    Ok(DeltaOutcome::Unavailable(request.record.clone()))
}

async fn apply_delta(
    fetcher: &dyn CrlFetcher,
    store: &dyn CrlStore,
    request: DeltaRequest<'_>,
    delta: &ParsedCrl,
    indicator: &str,
    delta_number: String,
) -> CrlResult<DeltaOutcome> {
    let mut record = request.record.clone();

    if indicator != record.crl_number() {
        info!(
            "Delta CRL {} is based on CRL {} but {} is cached, fetching a newer base",
            delta_number,
            indicator,
            record.crl_number()
        );
        let outcome = acquire_base_crl(
            fetcher,
            store,
            BaseCrlRequest {
                urls: request.base_urls,
                issuer: record.issuer(),
                ca_certificate_uuid: record.ca_certificate_uuid(),
                current_crl_number: record.crl_number(),
            },
        )
        .await?;

        match outcome {
            AcquisitionOutcome::Replaced(new_record) => {
                store.delete_record(record.id()).await?;
                if new_record.crl_number() != indicator {
                    warn!(
                        "Newer base CRL {} still differs from delta indicator {}",
                        new_record.crl_number(),
                        indicator
                    );
                }
                record = new_record;
            }
            AcquisitionOutcome::Unchanged | AcquisitionOutcome::Exhausted => {
                return Err(CrlError::Validation(format!(
                    "Cannot obtain a base CRL matching the delta's indicator {indicator}"
                )));
            }
        }
    }

    let is_newer = match record.crl_number_delta() {
        None => true,
        Some(stored) => compare_crl_numbers(&delta_number, stored)? == Ordering::Greater,
    };
    if !is_newer {
        debug!(
            "Discarding delta CRL {}: delta {:?} already applied",
            delta_number,
            record.crl_number_delta()
        );
        return Ok(DeltaOutcome::Discarded(record));
    }

    let existing: HashMap<String, CrlEntry> = store
        .list_entries(record.id())
        .await?
        .into_iter()
        .map(|entry| (entry.serial_number.clone(), entry))
        .collect();

    let merge = DeltaMerge::plan(
        record.id(),
        record.last_revocation_date(),
        &existing,
        &delta.revoked,
    );
    if merge.is_empty() {
        debug!("Delta CRL {} carries no entry changes", delta_number);
    } else {
        merge.apply(store).await?;
    }

    record.commit_delta(delta_number, delta.next_update, merge.last_revocation_date);
    store.update_record(&record).await?;

    info!(
        "Merged delta CRL {} into base CRL {} for {}: {} added, {} updated, {} removed",
        record.crl_number_delta().unwrap_or_default(),
        record.crl_number(),
        record.issuer(),
        merge.inserted.len(),
        merge.updated.len(),
        merge.removed.len()
    );
    Ok(DeltaOutcome::Merged(record))
}

/// Entry changes produced by merging one delta CRL into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaMerge {
    pub record_id: Uuid,
    pub inserted: Vec<CrlEntry>,
    pub updated: Vec<CrlEntry>,
    /// Serial numbers whose revocation was withdrawn
    pub removed: Vec<String>,
    pub last_revocation_date: Option<DateTime<Utc>>,
}

impl DeltaMerge {
    /// Computes the changes a delta CRL makes to a record's entries.
    ///
    /// Delta entries dated at or before the watermark are already reflected and are skipped.
    /// The watermark is only ever raised.
    pub fn plan(
        record_id: Uuid,
        watermark: Option<DateTime<Utc>>,
        existing: &HashMap<String, CrlEntry>,
        revoked: &[RevokedEntry],
    ) -> Self {
        let mut working = existing.clone();
        let mut last_revocation_date = watermark;
        let mut raise = |date: DateTime<Utc>| {
            if last_revocation_date.is_none_or(|current| date > current) {
                last_revocation_date = Some(date);
            }
        };

        for entry in revoked {
            if watermark.is_some_and(|watermark| entry.revocation_date <= watermark) {
                continue;
            }

            let cached = working.contains_key(&entry.serial_number);
            match (cached, entry.is_removal()) {
                (false, true) => {
                    debug!(
                        "Delta removes {} which is not cached, nothing to do",
                        entry.serial_number
                    );
                }
                (false, false) => {
                    working.insert(
                        entry.serial_number.clone(),
                        CrlEntry::from_revoked(record_id, entry),
                    );
                    raise(entry.revocation_date);
                }
                (true, true) => {
                    working.remove(&entry.serial_number);
                }
                (true, false) => {
                    if let Some(current) = working.get_mut(&entry.serial_number) {
                        current.revocation_reason = entry.reason_label();
                        current.revocation_date = entry.revocation_date;
                    }
                    raise(entry.revocation_date);
                }
            }
        }

        let mut merge = Self {
            record_id,
            inserted: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            last_revocation_date,
        };
        for (serial, entry) in &working {
            match existing.get(serial) {
                None => merge.inserted.push(entry.clone()),
                Some(previous) if previous != entry => merge.updated.push(entry.clone()),
                Some(_) => {}
            }
        }
        merge.removed = existing
            .keys()
            .filter(|serial| !working.contains_key(*serial))
            .cloned()
            .collect();
        merge
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    async fn apply(&self, store: &dyn CrlStore) -> CrlResult<()> {
        for entry in &self.inserted {
            store.insert_entry(entry).await?;
        }
        for entry in &self.updated {
            store.update_entry(entry).await?;
        }
        for serial in &self.removed {
            store.delete_entry(self.record_id, serial).await?;
        }
        Ok(())
    }
}
