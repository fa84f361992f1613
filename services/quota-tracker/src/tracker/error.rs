use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("quota exhausted for {identity}; next reset at {next_reset}")]
    Exhausted {
        identity: String,
        next_reset: DateTime<Utc>,
    },
    #[error("quota store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("invalid identity: {0:?}")]
    InvalidIdentity(String),
}
