use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::storage::{RecordStore, StoreError};

use super::clock::Clock;
use super::error::QuotaError;
use super::record::{QuotaRecord, IDENTITY_FIELD};
use super::status::QuotaStatus;
use super::window::{resolve, QuotaState, Resolution, WindowPolicy};

/// Per-identity quota windows over a non-transactional record store.
///
/// Each operation holds an in-process lock for its identity across the
/// read, the decision and the write. That closes the double-spend race
/// between requests served by this process only: another instance sharing
/// the same store can still interleave between our read and write, and two
/// such instances may both grant the last unit of a window.
pub struct QuotaManager {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    policy: WindowPolicy,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl QuotaManager {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, policy: WindowPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            locks: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// Current allowance for `identity`, rolling the window over first if
    /// it is due. Never writes for an identity without a row.
    pub async fn get_status(&self, identity: &str) -> Result<QuotaStatus, QuotaError> {
        validate_identity(identity)?;
        let _lease = self.lease(identity).await;

        let now = self.clock.now();
        let state = self.load(identity, now).await?;
        let Resolution { status, rollover } = resolve(&state, now, &self.policy);

        if let (Some(rolled), QuotaState::Registered { record_id, .. }) = (rollover, &state) {
            self.store
                .update(record_id, rolled.window_fields())
                .await
                .map_err(|err| store_failure(identity, "rollover", err))?;
            log_rollover(identity, &rolled);
        }

        Ok(status)
    }

    /// Spends one unit of `identity`'s allowance and returns what is left.
    ///
    /// A timed-out write is reported as unavailable and never retried: the
    /// decrement may already have landed.
    pub async fn try_consume(&self, identity: &str) -> Result<u32, QuotaError> {
        validate_identity(identity)?;
        let _lease = self.lease(identity).await;

        let now = self.clock.now();
        let state = self.load(identity, now).await?;
        let Resolution { status, rollover } = resolve(&state, now, &self.policy);

        match state {
            QuotaState::Unregistered => {
                let mut record = QuotaRecord::opened(identity, &self.policy, now);
                record.remaining = record.remaining.saturating_sub(1);
                record.total_consumed = 1;

                self.store
                    .create(record.to_fields())
                    .await
                    .map_err(|err| store_failure(identity, "create", err))?;

                info!(
                    identity,
                    remaining = record.remaining,
                    next_reset = %record.next_reset,
                    "opened quota window"
                );
                Ok(record.remaining)
            }
            QuotaState::Registered { record_id, record } => {
                if status.is_exhausted() {
                    if let Some(rolled) = &rollover {
                        self.store
                            .update(&record_id, rolled.window_fields())
                            .await
                            .map_err(|err| store_failure(identity, "rollover", err))?;
                    }
                    debug!(identity, next_reset = %status.next_reset, "quota exhausted");
                    return Err(QuotaError::Exhausted {
                        identity: identity.to_string(),
                        next_reset: status.next_reset,
                    });
                }

                let rolled_over = rollover.is_some();
                let mut next = rollover.unwrap_or(record);
                next.remaining = next.remaining.saturating_sub(1);
                next.total_consumed = next.total_consumed.saturating_add(1);

                let mut fields = next.usage_fields();
                if rolled_over {
                    fields.extend(next.window_fields());
                }

                self.store
                    .update(&record_id, fields)
                    .await
                    .map_err(|err| store_failure(identity, "consume", err))?;

                if rolled_over {
                    log_rollover(identity, &next);
                }
                debug!(
                    identity,
                    remaining = next.remaining,
                    total_consumed = next.total_consumed,
                    "consumed quota"
                );
                Ok(next.remaining)
            }
        }
    }

    async fn load(&self, identity: &str, now: DateTime<Utc>) -> Result<QuotaState, QuotaError> {
        let mut records = self
            .store
            .find(&[(IDENTITY_FIELD, identity)])
            .await
            .map_err(|err| store_failure(identity, "find", err))?;

        if records.len() > 1 {
            warn!(
                identity,
                count = records.len(),
                "multiple quota records for identity; using the first"
            );
        }
        if records.is_empty() {
            return Ok(QuotaState::Unregistered);
        }

        let stored = records.swap_remove(0);
        let (mut record, defaulted) = QuotaRecord::from_record(&stored, &self.policy, now);
        if !defaulted.is_empty() {
            warn!(
                identity,
                record_id = %stored.id,
                fields = ?defaulted,
                "quota record missing fields; applying defaults"
            );
        }
        record.identity = identity.to_string();

        Ok(QuotaState::Registered {
            record_id: stored.id,
            record,
        })
    }

    async fn lease(&self, identity: &str) -> IdentityLease<'_> {
        let lock = self
            .locks
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        IdentityLease {
            locks: &self.locks,
            identity: identity.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive use of one identity for the duration of an operation.
struct IdentityLease<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    identity: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityLease<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.identity, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn validate_identity(identity: &str) -> Result<(), QuotaError> {
    if identity.trim().is_empty() {
        return Err(QuotaError::InvalidIdentity(identity.to_string()));
    }
    Ok(())
}

fn store_failure(identity: &str, operation: &str, err: StoreError) -> QuotaError {
    error!(
        identity,
        operation,
        ambiguous = err.is_ambiguous(),
        error = %err,
        "quota store operation failed"
    );
    QuotaError::StoreUnavailable(err)
}

fn log_rollover(identity: &str, rolled: &QuotaRecord) {
    info!(
        identity,
        remaining = rolled.remaining,
        window_capacity = rolled.window_capacity,
        next_reset = %rolled.next_reset,
        "quota window rolled over"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRecordStore;
    use crate::tracker::clock::ManualClock;
    use crate::tracker::window::RolloverAnchor;
    use chrono::Duration;

    #[tokio::test]
    async fn locks_are_released_after_each_operation() {
        let store = Arc::new(MemoryRecordStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = QuotaManager::new(
            store,
            clock,
            WindowPolicy::new(4, Duration::days(7), RolloverAnchor::Schedule),
        );

        manager.try_consume("alice").await.unwrap();
        manager.get_status("bob").await.unwrap();

        assert_eq!(manager.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn blank_identity_is_rejected() {
        let manager = QuotaManager::new(
            Arc::new(MemoryRecordStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
            WindowPolicy::new(4, Duration::days(7), RolloverAnchor::Schedule),
        );

        assert!(matches!(
            manager.try_consume("  ").await,
            Err(QuotaError::InvalidIdentity(_))
        ));
    }
}
