use std::collections::HashMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::CrlResult;
use super::extensions::extract_crl_number;
use super::fetcher::CrlFetcher;
use super::store::CrlStore;
use super::types::{CrlEntry, CrlRecord, IssuerKey, ParsedCrl};

/// Result of walking a list of base CRL distribution points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionOutcome {
    /// A distribution point serves the CRL Number already cached
    Unchanged,
    /// A new base CRL was persisted as a new record
    Replaced(CrlRecord),
    /// Every distribution point failed
    Exhausted,
}

/// Inputs for one base CRL acquisition pass.
#[derive(Debug, Clone, Copy)]
pub struct BaseCrlRequest<'a> {
    pub urls: &'a [String],
    pub issuer: &'a IssuerKey,
    pub ca_certificate_uuid: Option<Uuid>,
    /// CRL Number of the cached record, empty if nothing is cached
    pub current_crl_number: &'a str,
}

/// Tries each distribution point in order until one yields a base CRL.
///
/// The first CRL that parses and carries a CRL Number ends the walk: either it matches the
/// cached number and nothing changes, or it is persisted as a new record. The caller is
/// responsible for deleting the record it replaces.
pub async fn acquire_base_crl(
    fetcher: &dyn CrlFetcher,
    store: &dyn CrlStore,
    request: BaseCrlRequest<'_>,
) -> CrlResult<AcquisitionOutcome> {
    for url in request.urls {
        let crl = match fetcher.fetch(url).await {
            Ok(crl) => crl,
            Err(e) if e.is_recoverable() => {
                warn!("Failed to fetch base CRL from {}: {}", url, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        if crl.is_delta() {
            warn!("Distribution point {} serves a delta CRL, skipping", url);
            continue;
        }

        let crl_number = match extract_crl_number(&crl) {
            Ok(number) => number,
            Err(e) => {
                warn!("Ignoring base CRL from {}: {}", url, e);
                continue;
            }
        };

        if crl_number == request.current_crl_number {
            debug!(
                "CRL {} from {} is already cached for {}",
                crl_number, url, request.issuer
            );
            return Ok(AcquisitionOutcome::Unchanged);
        }

        let (record, entries) =
            build_record(request.issuer.clone(), request.ca_certificate_uuid, &crl, crl_number);
        store.insert_record(&record, &entries).await?;

        info!(
            "Cached base CRL {} for {} from {} ({} entries)",
            record.crl_number(),
            request.issuer,
            url,
            entries.len()
        );
        return Ok(AcquisitionOutcome::Replaced(record));
    }

    warn!(
        "No base CRL could be obtained for {} from {} distribution points",
        request.issuer,
        request.urls.len()
    );
    Ok(AcquisitionOutcome::Exhausted)
}

/// Builds a record and its entries from a base CRL.
///
/// A serial listed more than once keeps its latest revocation. The high-watermark is the
/// latest revocation date, and stays unset when the CRL lists nothing.
pub fn build_record(
    issuer: IssuerKey,
    ca_certificate_uuid: Option<Uuid>,
    crl: &ParsedCrl,
    crl_number: String,
) -> (CrlRecord, Vec<CrlEntry>) {
    let last_revocation_date = crl.revoked.iter().map(|entry| entry.revocation_date).max();

    let record = CrlRecord::new(
        issuer,
        crl.issuer_dn.clone(),
        crl_number,
        crl.next_update,
        last_revocation_date,
        ca_certificate_uuid,
    );

    let mut entries: HashMap<&str, CrlEntry> = HashMap::with_capacity(crl.revoked.len());
    for revoked in &crl.revoked {
        let entry = CrlEntry::from_revoked(record.id(), revoked);
        match entries.get(revoked.serial_number.as_str()) {
            Some(existing) if existing.revocation_date > entry.revocation_date => {}
            _ => {
                entries.insert(revoked.serial_number.as_str(), entry);
            }
        }
    }

    (record, entries.into_values().collect())
}
