//! RetryPoller: moves ready entries from RetrySchedule to Broker
//! (spec.md §2, §4.5).

use std::time::Duration;

use tracing::{debug, error, info};

use crate::broker::{Broker, JobMessage};
use crate::config::Config;
use crate::ids::JobId;
use crate::store::PgStore;

use super::schedule::RetrySchedule;

pub struct RetryPoller<'a> {
    schedule: &'a RetrySchedule,
    store: &'a PgStore,
    broker: &'a Broker,
    batch: i64,
    poll_interval: Duration,
}

impl<'a> RetryPoller<'a> {
    pub fn new(schedule: &'a RetrySchedule, store: &'a PgStore, broker: &'a Broker, config: &Config) -> Self {
        Self {
            schedule,
            store,
            broker,
            batch: config.retry_batch_size,
            poll_interval: config.retry_poll_interval,
        }
    }

    /// Runs forever; call as a spawned task from `main`.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = %e, "retry poller tick failed");
            }
        }
    }

    pub async fn tick(&self) -> anyhow::Result<()> {
        let now = chrono::Utc::now();
        let ready = self.schedule.pop_ready(now, self.batch).await?;

        for entry in ready {
            match self.publish_one(entry.job_id).await {
                Ok(()) => {
                    debug!(job_id = %entry.job_id, "retry published to broker");
                }
                Err(e) => {
                    error!(job_id = %entry.job_id, error = %e, "retry publish failed, re-scheduling");
                    self.schedule.reinsert(entry).await?;
                }
            }
        }

        Ok(())
    }

    async fn publish_one(&self, job_id: JobId) -> anyhow::Result<()> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("job {job_id} vanished before retry publish"))?;

        let payload = JobMessage {
            job_id,
            seed_url: job.seed_url,
            job_type: job.job_type,
            priority: job.priority,
            has_inline_config: job.inline_config.is_some(),
            website_id: job.website_ref,
        };

        self.broker.publish(&payload).await?;
        info!(job_id = %job_id, job_type = ?payload.job_type, "retry re-queued");
        Ok(())
    }
}

