use std::sync::Arc;

pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::*;
pub use router::create_router;
pub use types::*;

use crate::access::{AccessController, AccessRegistry};
use crate::config::QuotaTrackerConfig;
use crate::storage::RecordStore;
use crate::tracker::{Clock, QuotaManager};

pub struct ApiState {
    pub quota_manager: Arc<QuotaManager>,
    pub access: Arc<AccessController>,
    pub config: Arc<QuotaTrackerConfig>,
}

impl ApiState {
    pub fn new(
        quota_manager: Arc<QuotaManager>,
        access: Arc<AccessController>,
        config: QuotaTrackerConfig,
    ) -> Self {
        Self {
            quota_manager,
            access,
            config: Arc::new(config),
        }
    }

    /// Wires the quota manager and access controller over the given stores.
    pub fn assemble(
        config: QuotaTrackerConfig,
        quota_store: Arc<dyn RecordStore>,
        registry_store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let quota_manager = Arc::new(QuotaManager::new(
            quota_store,
            Arc::clone(&clock),
            config.window_policy(),
        ));
        let access = Arc::new(AccessController::new(
            Arc::clone(&quota_manager),
            AccessRegistry::new(registry_store),
            clock,
            config.owner_id.clone(),
        ));
        Self::new(quota_manager, access, config)
    }
}
