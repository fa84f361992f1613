use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{Fields, Record, RecordStore, StoreError, RECORD_ID_FIELD};

/// In-process record store with the same per-call semantics as the remote
/// sheet. Used for local runs without a configured store and in tests.
#[derive(Default)]
pub struct MemoryRecordStore {
    rows: DashMap<String, Fields>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of create/update/delete calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Inserts a row verbatim, bypassing the write counter.
    pub fn seed(&self, fields: Fields) -> String {
        let id = row_id(&fields);
        let mut fields = fields;
        fields.insert(RECORD_ID_FIELD.to_string(), Value::String(id.clone()));
        self.rows.insert(id.clone(), fields);
        id
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.rows.get(id).map(|row| Record {
            id: id.to_string(),
            fields: row.value().clone(),
        })
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("injected write failure".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, fields: Fields) -> Result<Record, StoreError> {
        self.check_write()?;
        let id = self.seed(fields);
        debug!(record_id = %id, "created in-memory record");
        self.get(&id)
            .ok_or_else(|| StoreError::InvalidResponse(format!("record {id} vanished")))
    }

    async fn find(&self, query: &[(&str, &str)]) -> Result<Vec<Record>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("injected read failure".into()));
        }

        let mut found: Vec<Record> = self
            .rows
            .iter()
            .map(|row| Record {
                id: row.key().clone(),
                fields: row.value().clone(),
            })
            .filter(|record| record.matches(query))
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn update(&self, id: &str, fields: Fields) -> Result<Record, StoreError> {
        self.check_write()?;
        let mut row = self.rows.get_mut(id).ok_or_else(|| StoreError::Rejected {
            status: 404,
            message: format!("no record with id {id}"),
        })?;
        for (name, value) in fields {
            row.insert(name, value);
        }
        Ok(Record {
            id: id.to_string(),
            fields: row.value().clone(),
        })
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.rows
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::Rejected {
                status: 404,
                message: format!("no record with id {id}"),
            })
    }
}

fn row_id(fields: &Fields) -> String {
    match fields.get(RECORD_ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn find_matches_numbers_and_strings() {
        let store = MemoryRecordStore::new();
        store.seed(fields(json!({ "userId": 42, "remaining": "3" })));
        store.seed(fields(json!({ "userId": "43" })));

        let found = store.find(&[("userId", "42")]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text("remaining").as_deref(), Some("3"));

        assert!(store.find(&[("userId", "44")]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_is_partial_and_counted() {
        let store = MemoryRecordStore::new();
        let id = store.seed(fields(json!({ "userId": "1", "remaining": 2, "totalAdded": 5 })));

        let updated = store
            .update(&id, fields(json!({ "remaining": 1 })))
            .await
            .unwrap();

        assert_eq!(updated.fields["remaining"], json!(1));
        assert_eq!(updated.fields["totalAdded"], json!(5));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn injected_failures_do_not_mutate() {
        let store = MemoryRecordStore::new();
        let id = store.seed(fields(json!({ "remaining": 2 })));
        store.set_fail_writes(true);

        assert!(store.update(&id, fields(json!({ "remaining": 0 }))).await.is_err());
        assert_eq!(store.get(&id).unwrap().fields["remaining"], json!(2));
        assert_eq!(store.write_count(), 0);
    }
}
