use ::redis::RedisError;
use async_trait::async_trait;
use color_eyre::Report;
use std::error::Error as StdError;
use std::fmt;
use uuid::Uuid;

mod memory;
mod redis;

pub use memory::{MemoryCaCertificateStore, MemoryCrlStore};
pub use redis::RedisCrlStore;

use super::types::{CrlEntry, CrlRecord, IssuerKey};

pub type Result<T> = std::result::Result<T, CrlStoreError>;

/// Error type for CRL store operations.
#[derive(Debug)]
pub struct CrlStoreError {
    error: Report,
}

impl CrlStoreError {
    pub fn new<T>(error: T) -> Self
    where
        T: StdError + Send + Sync + 'static,
    {
        Self {
            error: Report::new(error),
        }
    }

    pub fn msg<T>(message: T) -> Self
    where
        T: fmt::Debug + fmt::Display + Send + Sync + 'static,
    {
        Self {
            error: Report::msg(message),
        }
    }
}

impl StdError for CrlStoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.source()
    }
}

impl fmt::Display for CrlStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl From<RedisError> for CrlStoreError {
    fn from(error: RedisError) -> Self {
        Self {
            error: Report::new(error),
        }
    }
}

impl From<serde_json::Error> for CrlStoreError {
    fn from(error: serde_json::Error) -> Self {
        Self {
            error: Report::new(error),
        }
    }
}

/// Abstract interface for the persistence of cached CRL records and their entries.
///
/// Entries are owned by their record: deleting a record deletes its entries.
#[async_trait]
pub trait CrlStore: Send + Sync + 'static {
    /// Finds the current record for an issuer.
    async fn find_record(&self, issuer: &IssuerKey) -> Result<Option<CrlRecord>>;

    /// Loads a record by id.
    async fn get_record(&self, id: Uuid) -> Result<Option<CrlRecord>>;

    /// Inserts a record with its initial entries and makes it current for its issuer.
    async fn insert_record(&self, record: &CrlRecord, entries: &[CrlEntry]) -> Result<()>;

    /// Overwrites the mutable fields of an existing record.
    async fn update_record(&self, record: &CrlRecord) -> Result<()>;

    /// Deletes a record and all of its entries.
    ///
    /// The issuer index is only cleared if it still points at this record.
    async fn delete_record(&self, id: Uuid) -> Result<()>;

    /// Lists every cached record.
    async fn list_records(&self) -> Result<Vec<CrlRecord>>;

    /// Returns the number of cached records.
    async fn count_records(&self) -> Result<usize>;

    /// Finds an entry by record id and normalized serial number.
    async fn find_entry(&self, record_id: Uuid, serial_number: &str) -> Result<Option<CrlEntry>>;

    /// Lists the entries of a record.
    async fn list_entries(&self, record_id: Uuid) -> Result<Vec<CrlEntry>>;

    /// Inserts an entry. An existing entry with the same key is replaced.
    async fn insert_entry(&self, entry: &CrlEntry) -> Result<()>;

    /// Updates the reason and date of an existing entry.
    async fn update_entry(&self, entry: &CrlEntry) -> Result<()>;

    /// Deletes an entry, returning whether it existed.
    async fn delete_entry(&self, record_id: Uuid, serial_number: &str) -> Result<bool>;
}

/// Lookup of issuing CA certificates, used to stamp records with the CA they belong to.
#[async_trait]
pub trait CaCertificateStore: Send + Sync + 'static {
    /// Finds the id of the CA certificate with the given normalized subject DN and serial.
    async fn find_ca_certificate(&self, issuer: &IssuerKey) -> Result<Option<Uuid>>;
}
