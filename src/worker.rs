//! Worker: consumes delivered messages from the Broker, drives a job
//! through the fetch/extract contract, and routes failures through
//! RetryPolicy into either another attempt or the DLQ (spec.md §2, §4.3,
//! §4.4, §5, §7).
//!
//! The actual HTML fetcher/browser driver is an external collaborator
//! (spec.md §1 "Out of scope"); this module only needs the `JobExecutor`
//! contract below to drive the job lifecycle around it.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::broker::{Broker, DeliveredMessage};
use crate::cancellation::{self, ResourceRegistry};
use crate::config::Config;
use crate::fast_store::FastStore;
use crate::ids::JobId;
use crate::retry::schedule::RetrySchedule;
use crate::retry::{compute_delay, default_policies};
use crate::store::models::{ErrorCategory, Job};
use crate::store::PgStore;

/// The outcome an external fetcher/extractor reports back for one job
/// (spec.md §1 "Out of scope" collaborators).
#[derive(Debug)]
pub enum ExecutionOutcome {
    Success,
    Failure {
        category: ErrorCategory,
        message: String,
        stack: Option<String>,
        http_status: Option<i32>,
    },
}

/// Contract a fetcher/extraction implementation plugs in at (spec.md §1
/// "the actual HTML fetcher/browser driver... We specify only the
/// contracts the core requires from them"). `resources` is where an
/// implementation registers the handles (HTTP clients, browser contexts)
/// it wants torn down if the job is cancelled mid-flight — without
/// registering here, a cancel request still stops the job but reports no
/// per-resource cleanup outcome.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job, resources: &ResourceRegistry) -> ExecutionOutcome;
}

pub struct Worker<'a> {
    store: &'a PgStore,
    broker: &'a Broker,
    fast_store: &'a FastStore,
    retry_schedule: &'a RetrySchedule,
    executor: &'a dyn JobExecutor,
    resource_registry: &'a ResourceRegistry,
    cancel_poll_interval: Duration,
}

impl<'a> Worker<'a> {
    pub fn new(
        store: &'a PgStore,
        broker: &'a Broker,
        fast_store: &'a FastStore,
        retry_schedule: &'a RetrySchedule,
        executor: &'a dyn JobExecutor,
        resource_registry: &'a ResourceRegistry,
        _config: &Config,
    ) -> Self {
        Self {
            store,
            broker,
            fast_store,
            retry_schedule,
            executor,
            resource_registry,
            cancel_poll_interval: Duration::from_millis(200),
        }
    }

    /// Runs forever: pulls a batch, handles each delivery in turn. A
    /// production deployment spawns several of these concurrently
    /// (`Config::worker_count`).
    pub async fn run(&self) {
        loop {
            match self.broker.consume(10).await {
                Ok(deliveries) => {
                    for delivery in deliveries {
                        self.handle(delivery).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "broker consume failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle(&self, delivery: DeliveredMessage) {
        let job_id = delivery.payload.job_id;

        if cancellation::is_cancelled(self.fast_store, job_id).await {
            info!(job_id = %job_id, "job cancelled before pickup, dropping delivery");
            let _ = delivery.ack().await;
            return;
        }

        let job = match self.store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %job_id, "delivered job vanished from store, acking to drop");
                let _ = delivery.ack().await;
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "store lookup failed, nak for redelivery");
                let _ = delivery.nak().await;
                return;
            }
        };

        if job.status.is_terminal() {
            let _ = delivery.ack().await;
            return;
        }

        if self.store.mark_job_running(job_id).await.is_err() {
            let _ = delivery.nak().await;
            return;
        }

        let outcome = self.run_with_cancellation(&job).await;

        // The job's own resources are only relevant while it's in flight;
        // drop whatever it registered now that execution has ended, so the
        // registry doesn't accumulate entries for finished jobs. A cancel
        // request racing this will simply find nothing left to tear down
        // (the job ended on its own before cancellation reached it).
        let _ = self.resource_registry.take(job_id);

        match outcome {
            Outcome::Cancelled => {
                let _ = delivery.ack().await;
            }
            Outcome::Executed(ExecutionOutcome::Success) => {
                if let Err(e) = self.store.mark_job_completed(job_id).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job completed");
                }
                let _ = delivery.ack().await;
            }
            Outcome::Executed(ExecutionOutcome::Failure {
                category,
                message,
                stack,
                http_status,
            }) => {
                self.handle_failure(&job, category, &message, stack.as_deref(), http_status)
                    .await;
                let _ = delivery.ack().await;
            }
        }
    }

    /// Drives execution while polling the cancellation flag at each
    /// suspension point, per spec.md §5 "cooperative cancellation".
    async fn run_with_cancellation(&self, job: &Job) -> Outcome {
        let exec = self.executor.execute(job, self.resource_registry);
        tokio::pin!(exec);
        let mut ticker = tokio::time::interval(self.cancel_poll_interval);

        loop {
            tokio::select! {
                outcome = &mut exec => return Outcome::Executed(outcome),
                _ = ticker.tick() => {
                    if cancellation::is_cancelled(self.fast_store, job.id).await {
                        return Outcome::Cancelled;
                    }
                }
            }
        }
    }

    async fn handle_failure(
        &self,
        job: &Job,
        category: ErrorCategory,
        message: &str,
        stack: Option<&str>,
        _http_status: Option<i32>,
    ) {
        let policy = match self.store.get_retry_policy(category).await {
            Ok(Some(p)) => p,
            Ok(None) => default_policies()
                .into_iter()
                .find(|p| p.error_category == category)
                .expect("default_policies covers every ErrorCategory variant"),
            Err(e) => {
                error!(job_id = %job.id, error = %e, "failed to load retry policy, quarantining");
                self.quarantine(job, category, message, stack, job.attempt_count).await;
                return;
            }
        };

        let next_attempt = job.attempt_count + 1;

        if !policy.is_retryable || next_attempt >= job.max_retries.max(policy.max_attempts) {
            self.quarantine(job, category, message, stack, next_attempt).await;
            return;
        }

        let delay_s = compute_delay(&policy, next_attempt as u32);
        let run_at = chrono::Utc::now() + chrono::Duration::milliseconds((delay_s * 1000.0) as i64);

        if let Err(e) = self
            .store
            .insert_retry_history(job.id, next_attempt, category, message, stack, Some(delay_s))
            .await
        {
            error!(job_id = %job.id, error = %e, "failed to record retry history");
        }

        if let Err(e) = self.store.requeue_job_for_retry(job.id).await {
            error!(job_id = %job.id, error = %e, "failed to requeue job for retry");
            return;
        }

        if let Err(e) = self.retry_schedule.schedule(job.id, run_at).await {
            error!(job_id = %job.id, error = %e, "failed to schedule retry");
        }

        info!(job_id = %job.id, attempt = next_attempt, delay_s, "job scheduled for retry");
    }

    async fn quarantine(
        &self,
        job: &Job,
        category: ErrorCategory,
        message: &str,
        stack: Option<&str>,
        total_attempts: i32,
    ) {
        let now = chrono::Utc::now();
        let dlq = crate::dlq::DlqManager::new(self.store, self.broker);
        match dlq
            .quarantine(
                job,
                category,
                message,
                stack,
                None,
                total_attempts,
                job.started_at.unwrap_or(now),
                now,
            )
            .await
        {
            Ok(entry) => {
                warn!(job_id = %job.id, dlq_entry = %entry.id, "job quarantined to dead letter queue");
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "failed to quarantine job");
            }
        }
    }
}

enum Outcome {
    Executed(ExecutionOutcome),
    Cancelled,
}
