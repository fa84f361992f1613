use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::storage::{Fields, Record, RecordStore, StoreError};
use crate::tracker::record::format_timestamp;

const OWNER_FIELD: &str = "userId";
const NAME_FIELD: &str = "name";
const IP_FIELD: &str = "ip";
const CREATED_AT_FIELD: &str = "createdAt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessEntry {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub ip: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl AccessEntry {
    fn from_record(record: Record) -> Self {
        Self {
            owner: record.text(OWNER_FIELD).unwrap_or_default(),
            name: record.text(NAME_FIELD).unwrap_or_default(),
            ip: record.text(IP_FIELD).unwrap_or_default(),
            created_at: record
                .text(CREATED_AT_FIELD)
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|at| at.with_timezone(&Utc)),
            id: record.id,
        }
    }
}

/// The shared registry of allowed addresses, one row per entry.
pub struct AccessRegistry {
    store: Arc<dyn RecordStore>,
}

impl AccessRegistry {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn add(
        &self,
        owner: &str,
        name: &str,
        ip: Ipv4Addr,
        now: DateTime<Utc>,
    ) -> Result<AccessEntry, StoreError> {
        let mut fields = Fields::new();
        fields.insert(OWNER_FIELD.into(), json!(owner));
        fields.insert(NAME_FIELD.into(), json!(name));
        fields.insert(IP_FIELD.into(), json!(ip.to_string()));
        fields.insert(CREATED_AT_FIELD.into(), json!(format_timestamp(now)));

        let record = self.store.create(fields).await?;
        info!(owner, entry_name = name, %ip, record_id = %record.id, "registered access entry");
        Ok(AccessEntry::from_record(record))
    }

    pub async fn list_for(&self, owner: &str) -> Result<Vec<AccessEntry>, StoreError> {
        let records = self.store.find(&[(OWNER_FIELD, owner)]).await?;
        Ok(records.into_iter().map(AccessEntry::from_record).collect())
    }

    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id).await?;
        info!(record_id = id, "withdrew access entry");
        Ok(())
    }

    /// Deletes every entry for `ip` and returns how many were removed.
    pub async fn remove_ip(&self, ip: Ipv4Addr) -> Result<usize, StoreError> {
        let ip = ip.to_string();
        let records = self.store.find(&[(IP_FIELD, ip.as_str())]).await?;
        for record in &records {
            self.store.delete(&record.id).await?;
        }
        if !records.is_empty() {
            info!(%ip, removed = records.len(), "removed access entries");
        }
        Ok(records.len())
    }
}
