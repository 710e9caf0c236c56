//! Certificate Revocation List (CRL) reconciliation (RFC 5280 §5)
//!
//! Keeps one cached revocation record per issuing CA, built from a base CRL and kept current
//! by merging delta CRLs on top of it.
//!
//! # Features
//! - Lazy freshness checks against the base CRL's nextUpdate
//! - Base CRL acquisition with fallback across distribution points
//! - Delta CRL merging with a monotonic revocation-date watermark
//! - Per-issuer serialized reconciliation
//! - In-memory and Redis backed record stores

pub mod acquisition;
pub mod delta;
mod errors;
pub mod extensions;
pub mod fetcher;
pub mod freshness;
mod manager;
mod parser;
pub mod store;
#[cfg(test)]
mod test_utils;
mod types;

// Re-export public types
pub use acquisition::{AcquisitionOutcome, BaseCrlRequest, acquire_base_crl};
pub use delta::{DeltaMerge, DeltaOutcome, DeltaRequest, reconcile_delta};
pub use errors::{CrlError, CrlResult};
pub use fetcher::{CrlFetcher, HttpCrlFetcher, is_valid_crl_url};
pub use freshness::CacheState;
pub use manager::{CrlManager, RevocationStatus};
pub use store::{
    CaCertificateStore, CrlStore, CrlStoreError, MemoryCaCertificateStore, MemoryCrlStore,
    RedisCrlStore,
};
pub use types::{
    CertificateInfo, CrlEntry, CrlRecord, IssuerKey, ParsedCrl, RevocationReason, RevokedEntry,
    UNKNOWN_REASON,
};
