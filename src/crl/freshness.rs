use chrono::{DateTime, Utc};

use super::types::CrlRecord;

/// Cache state of an issuer's CRL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing is cached for the issuer
    Absent,
    /// The cached base CRL has not reached its nextUpdate
    Fresh,
    /// The cached base CRL reached its nextUpdate, or never had one
    Stale,
}

impl CacheState {
    pub fn of(record: Option<&CrlRecord>, now: DateTime<Utc>) -> Self {
        match record {
            None => Self::Absent,
            Some(record) if record.is_fresh(now) => Self::Fresh,
            Some(_) => Self::Stale,
        }
    }

    pub fn needs_base_refresh(&self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

/// Whether a delta CRL should be fetched for a record, given the certificate's Freshest CRL URLs.
pub fn should_fetch_delta(record: &CrlRecord, delta_urls: &[String], now: DateTime<Utc>) -> bool {
    !delta_urls.is_empty() && record.needs_delta(now)
}
