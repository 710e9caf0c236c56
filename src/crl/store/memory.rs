use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{CaCertificateStore, CrlStore, CrlStoreError, Result};
use crate::crl::types::{CrlEntry, CrlRecord, IssuerKey};

type EntryKey = (Uuid, String);

/// An in-memory CRL store.
///
/// Records, entries and the issuer index live in separate maps; entries are keyed by
/// `(record id, serial number)`.
#[derive(Debug, Default, Clone)]
pub struct MemoryCrlStore {
    records: Arc<DashMap<Uuid, CrlRecord>>,
    entries: Arc<DashMap<EntryKey, CrlEntry>>,
    index: Arc<DashMap<IssuerKey, Uuid>>,
}

impl MemoryCrlStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CrlStore for MemoryCrlStore {
    async fn find_record(&self, issuer: &IssuerKey) -> Result<Option<CrlRecord>> {
        let Some(id) = self.index.get(issuer).map(|id| *id.value()) else {
            return Ok(None);
        };
        Ok(self.records.get(&id).map(|record| record.value().clone()))
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<CrlRecord>> {
        Ok(self.records.get(&id).map(|record| record.value().clone()))
    }

    async fn insert_record(&self, record: &CrlRecord, entries: &[CrlEntry]) -> Result<()> {
        for entry in entries {
            self.entries.insert(
                (record.id(), entry.serial_number.clone()),
                entry.clone(),
            );
        }
        self.records.insert(record.id(), record.clone());
        self.index.insert(record.issuer().clone(), record.id());
        Ok(())
    }

    async fn update_record(&self, record: &CrlRecord) -> Result<()> {
        match self.records.get_mut(&record.id()) {
            Some(mut existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(CrlStoreError::msg(format!(
                "CRL record {} not found",
                record.id()
            ))),
        }
    }

    async fn delete_record(&self, id: Uuid) -> Result<()> {
        if let Some((_, record)) = self.records.remove(&id) {
            self.index
                .remove_if(record.issuer(), |_, current| *current == id);
        }
        self.entries.retain(|(record_id, _), _| *record_id != id);
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<CrlRecord>> {
        Ok(self
            .records
            .iter()
            .map(|record| record.value().clone())
            .collect())
    }

    async fn count_records(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    async fn find_entry(&self, record_id: Uuid, serial_number: &str) -> Result<Option<CrlEntry>> {
        Ok(self
            .entries
            .get(&(record_id, serial_number.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn list_entries(&self, record_id: Uuid) -> Result<Vec<CrlEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == record_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn insert_entry(&self, entry: &CrlEntry) -> Result<()> {
        self.entries.insert(
            (entry.crl_record_id, entry.serial_number.clone()),
            entry.clone(),
        );
        Ok(())
    }

    async fn update_entry(&self, entry: &CrlEntry) -> Result<()> {
        match self
            .entries
            .get_mut(&(entry.crl_record_id, entry.serial_number.clone()))
        {
            Some(mut existing) => {
                existing.revocation_date = entry.revocation_date;
                existing.revocation_reason = entry.revocation_reason.clone();
                Ok(())
            }
            None => Err(CrlStoreError::msg(format!(
                "CRL entry {} not found under record {}",
                entry.serial_number, entry.crl_record_id
            ))),
        }
    }

    async fn delete_entry(&self, record_id: Uuid, serial_number: &str) -> Result<bool> {
        Ok(self
            .entries
            .remove(&(record_id, serial_number.to_string()))
            .is_some())
    }
}

/// An in-memory CA certificate lookup.
///
/// Useful for testing and development.
#[derive(Debug, Default, Clone)]
pub struct MemoryCaCertificateStore {
    certificates: Arc<DashMap<IssuerKey, Uuid>>,
}

impl MemoryCaCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a CA certificate under its subject DN and serial number.
    pub fn register(&self, issuer: IssuerKey, certificate_uuid: Uuid) {
        self.certificates.insert(issuer, certificate_uuid);
    }
}

#[async_trait]
impl CaCertificateStore for MemoryCaCertificateStore {
    async fn find_ca_certificate(&self, issuer: &IssuerKey) -> Result<Option<Uuid>> {
        Ok(self.certificates.get(issuer).map(|id| *id.value()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn record(serial: &str) -> CrlRecord {
        CrlRecord::new(
            IssuerKey::new("CN=Test CA", serial),
            "CN=test ca",
            "5",
            None,
            None,
            None,
        )
    }

    fn entry(record: &CrlRecord, serial: &str) -> CrlEntry {
        CrlEntry {
            crl_record_id: record.id(),
            serial_number: serial.to_string(),
            revocation_date: Utc::now(),
            revocation_reason: "UNKNOWN".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_flow() {
        let store = MemoryCrlStore::new();
        let rec = record("01");
        store
            .insert_record(&rec, &[entry(&rec, "ab"), entry(&rec, "cd")])
            .await
            .unwrap();

        assert_eq!(
            store.find_record(rec.issuer()).await.unwrap(),
            Some(rec.clone())
        );
        assert_eq!(store.list_entries(rec.id()).await.unwrap().len(), 2);
        assert!(store.find_entry(rec.id(), "ab").await.unwrap().is_some());

        assert!(store.delete_entry(rec.id(), "ab").await.unwrap());
        assert!(!store.delete_entry(rec.id(), "ab").await.unwrap());

        store.delete_record(rec.id()).await.unwrap();
        assert_eq!(store.find_record(rec.issuer()).await.unwrap(), None);
        assert!(store.list_entries(rec.id()).await.unwrap().is_empty());
        assert_eq!(store.count_records().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_old_record_keeps_replacement_indexed() {
        let store = MemoryCrlStore::new();
        let old = record("01");
        let new = record("01");
        store.insert_record(&old, &[]).await.unwrap();
        store.insert_record(&new, &[]).await.unwrap();

        store.delete_record(old.id()).await.unwrap();
        let current = store.find_record(new.issuer()).await.unwrap().unwrap();
        assert_eq!(current.id(), new.id());
    }

    #[tokio::test]
    async fn test_update_missing_entry_fails() {
        let store = MemoryCrlStore::new();
        let rec = record("01");
        store.insert_record(&rec, &[]).await.unwrap();
        assert!(store.update_entry(&entry(&rec, "ab")).await.is_err());
    }

    #[tokio::test]
    async fn test_ca_certificate_lookup() {
        let store = MemoryCaCertificateStore::new();
        let id = Uuid::new_v4();
        store.register(IssuerKey::new("CN=Root", "1F"), id);
        assert_eq!(
            store
                .find_ca_certificate(&IssuerKey::new("cn=root", "001f"))
                .await
                .unwrap(),
            Some(id)
        );
    }
}
