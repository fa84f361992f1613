pub mod access;
pub mod api;
pub mod config;
pub mod storage;
pub mod tracker;

pub use access::{AccessController, AccessRegistry, Authorization, Command};
pub use api::{create_router, ApiState};
pub use config::QuotaTrackerConfig;
pub use storage::{MemoryRecordStore, RecordStore, SheetDbStore, StoreError};
pub use tracker::{QuotaError, QuotaManager, QuotaStatus, RolloverAnchor, WindowPolicy};
