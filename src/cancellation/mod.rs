//! CancellationCoordinator: graceful-then-forced teardown of per-job
//! resources (spec.md §2, §4.6, §5, §9).

mod registry;
mod resource;

pub use registry::ResourceRegistry;
pub use resource::{CloseOutcome, Resource, ResourceOutcome};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::Broker;
use crate::fast_store::FastStore;
use crate::ids::JobId;
use crate::store::models::JobStatus;
use crate::store::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum CancellationError {
    #[error("job not found")]
    NotFound,

    #[error("job is already terminal")]
    AlreadyTerminal,
}

fn flag_key(job_id: JobId) -> String {
    format!("cancel_flag:{job_id}")
}

/// Cheap, poll-anywhere check for the cancellation flag — call this at
/// every suspension point inside a worker's run loop (spec.md §5).
pub async fn is_cancelled(fast_store: &FastStore, job_id: JobId) -> bool {
    fast_store.is_flagged(&flag_key(job_id)).await.unwrap_or(false)
}

pub struct CancellationCoordinator<'a> {
    store: &'a PgStore,
    broker: &'a Broker,
    fast_store: &'a FastStore,
    graceful_timeout: Duration,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CancellationOutcome {
    pub job_id: JobId,
    pub cleanup_started_at: chrono::DateTime<Utc>,
    pub cleanup_ended_at: chrono::DateTime<Utc>,
    pub cleanup_duration_ms: i64,
    pub resources: Vec<ResourceOutcome>,
}

impl<'a> CancellationCoordinator<'a> {
    pub fn new(store: &'a PgStore, broker: &'a Broker, fast_store: &'a FastStore, graceful_timeout: Duration) -> Self {
        Self {
            store,
            broker,
            fast_store,
            graceful_timeout,
        }
    }

    /// Cancels a job: spec.md §4.6 steps 1–5. `resources` is the set of
    /// handles the *running* worker for this job has registered (typically
    /// fetched from the shared `ResourceRegistry` just before calling this);
    /// for a still-`pending` job this will be empty and teardown is a no-op.
    pub async fn cancel(
        &self,
        job_id: JobId,
        cancelled_by: Option<Uuid>,
        reason: &str,
        resources: Vec<Arc<dyn Resource>>,
    ) -> Result<CancellationOutcome, CancellationError> {
        let job = self
            .store
            .get_job(job_id)
            .await
            .map_err(|_| CancellationError::NotFound)?
            .ok_or(CancellationError::NotFound)?;

        if job.status.is_terminal() {
            return Err(CancellationError::AlreadyTerminal);
        }

        // Step 2: set the flag first so any worker about to pick this job
        // up (or already running it) observes cancellation at its very
        // next suspension point.
        self.fast_store
            .set_flag(&flag_key(job_id), Duration::from_secs(3600))
            .await
            .map_err(|e| {
                warn!(job_id = %job_id, error = %e, "failed to set cancellation flag");
                CancellationError::NotFound
            })
            .ok();

        // Step 3: best-effort queue removal for still-pending jobs.
        if job.status == JobStatus::Pending {
            if let Err(e) = self.broker.remove(job_id).await {
                warn!(job_id = %job_id, error = %e, "queue removal failed, worker will observe the flag on pickup");
            }
        }

        // Step 4: concurrent graceful-then-forced teardown of registered
        // resources. Launch independently, wait on the aggregate — total
        // wall time is max(per-resource), not sum (spec.md §8 "Cleanup
        // concurrency").
        let cleanup_started_at = Utc::now();
        let deadline = self.graceful_timeout;

        let outcomes = futures::future::join_all(resources.into_iter().map(|resource| async move {
            let name = resource.name().to_string();
            let outcome = match resource.close_gracefully(deadline).await {
                CloseOutcome::Ok => CloseOutcome::Ok,
                CloseOutcome::TimedOut => {
                    resource.force_close().await;
                    CloseOutcome::Forced
                }
                CloseOutcome::Forced => CloseOutcome::Forced,
            };
            ResourceOutcome { name, outcome }
        }))
        .await;

        let cleanup_ended_at = Utc::now();

        // Step 5: persist terminal status and cancellation metadata.
        self.store
            .mark_job_cancelled(job_id, cancelled_by, reason)
            .await
            .map_err(|_| CancellationError::NotFound)?;

        self.fast_store.clear_flag(&flag_key(job_id)).await.ok();

        info!(job_id = %job_id, reason, resources = outcomes.len(), "job cancelled");

        Ok(CancellationOutcome {
            job_id,
            cleanup_started_at,
            cleanup_ended_at,
            cleanup_duration_ms: (cleanup_ended_at - cleanup_started_at).num_milliseconds(),
            resources: outcomes,
        })
    }
}
