//! Window rollover as a pure function of the stored state and the current time.
//!
//! Rollovers are evaluated lazily: every quota operation resolves the state
//! first and persists the rolled window if one was due. There is no timer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::record::QuotaRecord;
use super::status::QuotaStatus;

/// Where the next window is scheduled from when a rollover happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloverAnchor {
    /// The stored and reported `next_reset` advances by one window from the
    /// previously scheduled reset, so after a long idle spell it can lag
    /// behind `last_reset`. It never decides when the window is due.
    #[default]
    Schedule,
    /// `next_reset` is one window after the moment of the rollover.
    Now,
}

impl FromStr for RolloverAnchor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "schedule" => Ok(RolloverAnchor::Schedule),
            "now" => Ok(RolloverAnchor::Now),
            _ => anyhow::bail!("unsupported rollover anchor: {s}"),
        }
    }
}

impl fmt::Display for RolloverAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloverAnchor::Schedule => f.write_str("schedule"),
            RolloverAnchor::Now => f.write_str("now"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub default_limit: u32,
    pub window: Duration,
    pub anchor: RolloverAnchor,
}

impl WindowPolicy {
    pub fn new(default_limit: u32, window: Duration, anchor: RolloverAnchor) -> Self {
        Self {
            default_limit,
            window,
            anchor,
        }
    }

    /// Capacity granted to the window that follows one of `previous`.
    ///
    /// Growth is bounded by `default_limit`, so once a record sits at the
    /// default the "+1" never takes effect.
    pub fn next_capacity(&self, previous: u32) -> u32 {
        self.default_limit.min(previous.saturating_add(1))
    }
}

/// Persisted state of one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaState {
    /// No row yet; the identity implicitly holds a full default allowance.
    Unregistered,
    Registered { record_id: String, record: QuotaRecord },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: QuotaStatus,
    /// Present when a rollover was due; must be persisted before `status`
    /// is reported.
    pub rollover: Option<QuotaRecord>,
}

/// A window is due one full window after it was last reset, whatever
/// `next_reset` was stored.
pub fn is_due(record: &QuotaRecord, now: DateTime<Utc>, policy: &WindowPolicy) -> bool {
    now >= record.last_reset + policy.window
}

pub fn roll_over(record: &QuotaRecord, now: DateTime<Utc>, policy: &WindowPolicy) -> QuotaRecord {
    let capacity = policy.next_capacity(record.window_capacity);
    let next_reset = match policy.anchor {
        RolloverAnchor::Schedule => record.next_reset + policy.window,
        RolloverAnchor::Now => now + policy.window,
    };

    QuotaRecord {
        identity: record.identity.clone(),
        remaining: capacity,
        window_capacity: capacity,
        last_reset: now,
        next_reset,
        total_consumed: record.total_consumed,
    }
}

pub fn resolve(state: &QuotaState, now: DateTime<Utc>, policy: &WindowPolicy) -> Resolution {
    match state {
        QuotaState::Unregistered => Resolution {
            status: QuotaStatus {
                remaining: policy.default_limit,
                next_reset: now + policy.window,
                total_consumed: 0,
                registered: false,
            },
            rollover: None,
        },
        QuotaState::Registered { record, .. } if is_due(record, now, policy) => {
            let rolled = roll_over(record, now, policy);
            Resolution {
                status: QuotaStatus::from_record(&rolled),
                rollover: Some(rolled),
            }
        }
        QuotaState::Registered { record, .. } => Resolution {
            status: QuotaStatus::from_record(record),
            rollover: None,
        },
    }
}
