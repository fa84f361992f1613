use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::QuotaRecord;

pub const RESET_TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S UTC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub remaining: u32,
    pub next_reset: DateTime<Utc>,
    pub total_consumed: u64,
    /// False while the identity has no persisted row.
    pub registered: bool,
}

impl QuotaStatus {
    pub fn from_record(record: &QuotaRecord) -> Self {
        Self {
            remaining: record.remaining,
            next_reset: record.next_reset,
            total_consumed: record.total_consumed,
            registered: true,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

pub fn format_reset_time(at: DateTime<Utc>) -> String {
    at.format(RESET_TIME_FORMAT).to_string()
}
