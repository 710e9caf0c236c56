use std::collections::HashMap;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use uuid::Uuid;

use super::{CrlStore, CrlStoreError, Result};
use crate::crl::types::{CrlEntry, CrlRecord, IssuerKey};

const RECORD_IDS_KEY: &str = "crl:records";

/// A Redis CRL store.
///
/// Layout:
/// - `crl:record:<id>` holds the JSON record
/// - `crl:entries:<id>` is a hash of serial number to JSON entry
/// - `crl:index:<issuer dn>|<issuer serial>` holds the id of the current record
/// - `crl:records` is the set of all record ids
#[derive(Clone)]
pub struct RedisCrlStore {
    conn: ConnectionManager,
}

impl RedisCrlStore {
    /// Creates a new Redis store from a connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn record_key(id: Uuid) -> String {
    format!("crl:record:{id}")
}

fn entries_key(id: Uuid) -> String {
    format!("crl:entries:{id}")
}

fn index_key(issuer: &IssuerKey) -> String {
    format!("crl:index:{issuer}")
}

#[async_trait]
impl CrlStore for RedisCrlStore {
    async fn find_record(&self, issuer: &IssuerKey) -> Result<Option<CrlRecord>> {
        let mut conn = self.conn.clone();
        let id: Option<String> = conn.get(index_key(issuer)).await?;
        let Some(id) = id else {
            return Ok(None);
        };
        let id = Uuid::parse_str(&id).map_err(CrlStoreError::new)?;
        self.get_record(id).await
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<CrlRecord>> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(record_key(id)).await?;
        data.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }

    async fn insert_record(&self, record: &CrlRecord, entries: &[CrlEntry]) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();

        let fields = entries
            .iter()
            .map(|entry| Ok((entry.serial_number.clone(), serde_json::to_string(entry)?)))
            .collect::<Result<Vec<(String, String)>>>()?;
        if !fields.is_empty() {
            pipe.hset_multiple(entries_key(record.id()), &fields).ignore();
        }

        pipe.set(record_key(record.id()), serde_json::to_string(record)?)
            .ignore()
            .sadd(RECORD_IDS_KEY, record.id().to_string())
            .ignore()
            .set(index_key(record.issuer()), record.id().to_string())
            .ignore();

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn update_record(&self, record: &CrlRecord) -> Result<()> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(record_key(record.id())).await?;
        if !exists {
            return Err(CrlStoreError::msg(format!(
                "CRL record {} not found",
                record.id()
            )));
        }
        let _: () = conn
            .set(record_key(record.id()), serde_json::to_string(record)?)
            .await?;
        Ok(())
    }

    async fn delete_record(&self, id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        if let Some(record) = self.get_record(id).await? {
            let index = index_key(record.issuer());
            let current: Option<String> = conn.get(&index).await?;
            if current.as_deref() == Some(id.to_string().as_str()) {
                let _: () = conn.del(&index).await?;
            }
        }

        let _: () = redis::pipe()
            .atomic()
            .del(record_key(id))
            .ignore()
            .del(entries_key(id))
            .ignore()
            .srem(RECORD_IDS_KEY, id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<CrlRecord>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(RECORD_IDS_KEY).await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let id = Uuid::parse_str(&id).map_err(CrlStoreError::new)?;
            if let Some(record) = self.get_record(id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn count_records(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let count: usize = conn.scard(RECORD_IDS_KEY).await?;
        Ok(count)
    }

    async fn find_entry(&self, record_id: Uuid, serial_number: &str) -> Result<Option<CrlEntry>> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.hget(entries_key(record_id), serial_number).await?;
        data.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }

    async fn list_entries(&self, record_id: Uuid) -> Result<Vec<CrlEntry>> {
        let mut conn = self.conn.clone();
        let data: HashMap<String, String> = conn.hgetall(entries_key(record_id)).await?;
        data.values()
            .map(|json| serde_json::from_str(json).map_err(Into::into))
            .collect()
    }

    async fn insert_entry(&self, entry: &CrlEntry) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset(
                entries_key(entry.crl_record_id),
                &entry.serial_number,
                serde_json::to_string(entry)?,
            )
            .await?;
        Ok(())
    }

    async fn update_entry(&self, entry: &CrlEntry) -> Result<()> {
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .hexists(entries_key(entry.crl_record_id), &entry.serial_number)
            .await?;
        if !exists {
            return Err(CrlStoreError::msg(format!(
                "CRL entry {} not found under record {}",
                entry.serial_number, entry.crl_record_id
            )));
        }
        self.insert_entry(entry).await
    }

    async fn delete_entry(&self, record_id: Uuid, serial_number: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: usize = conn.hdel(entries_key(record_id), serial_number).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            record_key(id),
            "crl:record:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            entries_key(id),
            "crl:entries:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            index_key(&IssuerKey::new("CN=Test CA", "0A")),
            "crl:index:CN=test ca|a"
        );
    }
}
