//! DLQManager: records terminal failures with summary, supports manual
//! retry (spec.md §2, §4.7).

use chrono::{DateTime, Utc};

use crate::broker::{Broker, JobMessage};
use crate::ids::DlqEntryId;
use crate::store::models::{DlqEntry, ErrorCategory, Job};
use crate::store::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error("job already has an active DLQ entry")]
    AlreadyQuarantined,

    #[error("job not found")]
    JobNotFound,

    #[error("dlq entry not found")]
    EntryNotFound,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Broker(#[from] crate::broker::BrokerError),
}

pub struct DlqManager<'a> {
    store: &'a PgStore,
    broker: &'a Broker,
}

impl<'a> DlqManager<'a> {
    pub fn new(store: &'a PgStore, broker: &'a Broker) -> Self {
        Self { store, broker }
    }

    /// Quarantines a job: spec.md §4.7 steps 1–2. Idempotence rule from
    /// spec.md §7: one active DLQ entry per job at a time.
    #[allow(clippy::too_many_arguments)]
    pub async fn quarantine(
        &self,
        job: &Job,
        error_category: ErrorCategory,
        error_message: &str,
        stack: Option<&str>,
        http_status: Option<i32>,
        total_attempts: i32,
        first_attempt_at: DateTime<Utc>,
        last_attempt_at: DateTime<Utc>,
    ) -> Result<DlqEntry, DlqError> {
        if self.store.get_active_dlq_entry(job.id).await?.is_some() {
            return Err(DlqError::AlreadyQuarantined);
        }

        self.store.mark_job_failed_terminal(job.id).await?;

        let entry = self
            .store
            .insert_dlq_entry(
                job.id,
                &job.seed_url,
                job.website_ref,
                job.job_type,
                job.priority,
                error_category,
                error_message,
                stack,
                http_status,
                total_attempts,
                first_attempt_at,
                last_attempt_at,
            )
            .await?;

        tracing::warn!(job_id = %job.id, error_category = ?error_category, attempts = total_attempts, "job quarantined to DLQ");

        Ok(entry)
    }

    /// Manual operator retry (spec.md §4.7 "Manual operator retry"):
    /// re-publishes the job and records the attempt on the DLQ row.
    pub async fn retry(&self, entry_id: DlqEntryId) -> Result<DlqEntry, DlqError> {
        let entry = self
            .store
            .get_dlq_entry(entry_id)
            .await?
            .ok_or(DlqError::EntryNotFound)?;

        let job = self
            .store
            .get_job(entry.job_ref)
            .await?
            .ok_or(DlqError::JobNotFound)?;

        let payload = JobMessage {
            job_id: job.id,
            seed_url: job.seed_url.clone(),
            job_type: job.job_type,
            priority: job.priority,
            has_inline_config: job.inline_config.is_some(),
            website_id: job.website_ref,
        };

        let publish_result = self.broker.publish(&payload).await;
        let retry_success = publish_result.is_ok();

        let updated = self
            .store
            .mark_dlq_retry_attempted(entry_id, Some(retry_success), retry_success)
            .await?;

        publish_result?;

        Ok(updated)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<DlqEntry>, DlqError> {
        Ok(self.store.list_dlq_entries(limit, offset).await?)
    }
}

