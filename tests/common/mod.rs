use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use crl_reconciler::crl::{
    CertificateInfo, CrlError, CrlFetcher, CrlManager, CrlResult, MemoryCaCertificateStore,
    MemoryCrlStore, ParsedCrl, RevocationReason, RevokedEntry,
};
use dashmap::DashMap;

pub const ISSUER_DN: &str = "CN=Test CA,O=Example";
pub const ISSUER_SERIAL: &str = "01";
pub const U1: &str = "http://u1.example.com/ca.crl";
pub const U2: &str = "http://u2.example.com/ca.crl";
pub const DELTA: &str = "http://u1.example.com/delta.crl";

/// Serves canned CRLs by URL. Unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct FakeFetcher {
    crls: DashMap<String, ParsedCrl>,
    fetches: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn serve(&self, url: &str, crl: ParsedCrl) {
        self.crls.insert(url.to_string(), crl);
    }

    pub fn take_down(&self, url: &str) {
        self.crls.remove(url);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrlFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> CrlResult<ParsedCrl> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.crls
            .get(url)
            .map(|crl| crl.clone())
            .ok_or_else(|| CrlError::Custom(format!("connection refused: {url}")))
    }
}

pub struct Harness {
    pub store: Arc<MemoryCrlStore>,
    pub fetcher: Arc<FakeFetcher>,
    pub ca_store: Arc<MemoryCaCertificateStore>,
    pub manager: CrlManager,
}

impl Harness {
    pub fn new(fetcher: FakeFetcher) -> Self {
        let store = Arc::new(MemoryCrlStore::new());
        let fetcher = Arc::new(fetcher);
        let ca_store = Arc::new(MemoryCaCertificateStore::new());
        let manager = CrlManager::new(store.clone(), fetcher.clone(), ca_store.clone());
        Self {
            store,
            fetcher,
            ca_store,
            manager,
        }
    }
}

pub fn day(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
}

pub fn revoked(serial: &str, date: DateTime<Utc>, reason: RevocationReason) -> RevokedEntry {
    RevokedEntry {
        serial_number: serial.to_string(),
        revocation_date: date,
        reason: Some(reason),
    }
}

pub fn base_crl(number: &str, next_update: DateTime<Utc>, revoked: Vec<RevokedEntry>) -> ParsedCrl {
    ParsedCrl {
        issuer_dn: "CN=test ca,O=example".to_string(),
        this_update: day(1),
        next_update: Some(next_update),
        crl_number: Some(number.to_string()),
        delta_indicator: None,
        revoked,
    }
}

pub fn delta_crl(
    number: &str,
    indicator: &str,
    next_update: DateTime<Utc>,
    revoked: Vec<RevokedEntry>,
) -> ParsedCrl {
    ParsedCrl {
        delta_indicator: Some(indicator.to_string()),
        ..base_crl(number, next_update, revoked)
    }
}

fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    assert!(value.len() < 0x80, "test payloads use short-form lengths");
    let mut out = vec![tag, value.len() as u8];
    out.extend_from_slice(value);
    out
}

/// DER payload of a CRL Distribution Points / Freshest CRL extension with one URI per point.
pub fn distribution_points(urls: &[&str]) -> Vec<u8> {
    let points: Vec<u8> = urls
        .iter()
        .flat_map(|url| {
            let general_names = tlv(0xA0, &tlv(0x86, url.as_bytes()));
            tlv(0x30, &tlv(0xA0, &general_names))
        })
        .collect();
    tlv(0x30, &points)
}

pub fn certificate(serial: &str, base_urls: &[&str], delta_urls: &[&str]) -> CertificateInfo {
    CertificateInfo {
        issuer_dn: ISSUER_DN.to_string(),
        serial_number: serial.to_string(),
        crl_distribution_points: Some(distribution_points(base_urls)),
        freshest_crl: (!delta_urls.is_empty()).then(|| distribution_points(delta_urls)),
    }
}

pub fn issuer() -> CertificateInfo {
    CertificateInfo {
        issuer_dn: "CN=Root CA,O=Example".to_string(),
        serial_number: ISSUER_SERIAL.to_string(),
        ..Default::default()
    }
}
