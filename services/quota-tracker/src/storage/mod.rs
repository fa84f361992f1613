pub mod error;
pub mod memory;
pub mod sheetdb;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use error::StoreError;
pub use memory::MemoryRecordStore;
pub use sheetdb::SheetDbStore;

pub const RECORD_ID_FIELD: &str = "id";

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

impl Record {
    /// Returns a field as text, accepting both JSON strings and numbers.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn matches(&self, query: &[(&str, &str)]) -> bool {
        query
            .iter()
            .all(|(name, expected)| self.text(name).as_deref() == Some(*expected))
    }
}

/// Keyed access to a remote table of records.
///
/// Every call is an independent round trip. Implementations offer no
/// atomicity across calls and no isolation between concurrent callers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, fields: Fields) -> Result<Record, StoreError>;

    /// Returns every record whose fields equal all query pairs. Never fails
    /// on an empty match.
    async fn find(&self, query: &[(&str, &str)]) -> Result<Vec<Record>, StoreError>;

    /// Partial update: only the provided fields change. Backends that only
    /// acknowledge a row count echo back the applied fields.
    async fn update(&self, id: &str, fields: Fields) -> Result<Record, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
