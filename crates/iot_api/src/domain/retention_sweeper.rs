use chrono::{DateTime, Duration, Utc};
use common::domain::{DeviceEventRepository, DomainError, DomainResult};
use std::sync::Arc;
use tracing::{info, instrument};

/// Age after which device events are purged
pub const EVENT_RETENTION_DAYS: i64 = 100;

/// Longest accepted retention horizon, one hundred years
pub const MAX_EVENT_RETENTION_DAYS: i64 = 36_500;

/// Deletes device events older than the retention horizon
pub struct RetentionSweeper {
    event_repository: Arc<dyn DeviceEventRepository>,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(event_repository: Arc<dyn DeviceEventRepository>) -> Self {
        Self {
            event_repository,
            retention: Duration::days(EVENT_RETENTION_DAYS),
        }
    }

    /// Retention must be between one day and `MAX_EVENT_RETENTION_DAYS`
    pub fn with_retention_days(
        event_repository: Arc<dyn DeviceEventRepository>,
        retention_days: i64,
    ) -> DomainResult<Self> {
        validate_retention_days(retention_days)?;
        Ok(Self {
            event_repository,
            retention: Duration::days(retention_days),
        })
    }

    /// Remove everything created before `now - retention`, returns rows deleted
    pub async fn sweep(&self) -> DomainResult<u64> {
        self.sweep_at(Utc::now()).await
    }

    #[instrument(skip(self), fields(retention_days = self.retention.num_days()))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let cutoff = now - self.retention;
        let deleted = self
            .event_repository
            .delete_events_created_before(cutoff)
            .await?;

        info!(deleted, cutoff = %cutoff, "retention sweep finished");
        Ok(deleted)
    }
}

pub fn validate_retention_days(retention_days: i64) -> DomainResult<()> {
    if !(1..=MAX_EVENT_RETENTION_DAYS).contains(&retention_days) {
        return Err(DomainError::ValidationError(format!(
            "event retention must be between 1 and {} days, got {}",
            MAX_EVENT_RETENTION_DAYS, retention_days
        )));
    }
    Ok(())
}
