pub mod clock;
pub mod error;
pub mod manager;
pub mod record;
pub mod status;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::QuotaError;
pub use manager::QuotaManager;
pub use record::QuotaRecord;
pub use status::{format_reset_time, QuotaStatus};
pub use window::{QuotaState, RolloverAnchor, WindowPolicy};
