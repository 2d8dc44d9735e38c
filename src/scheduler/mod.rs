//! Scheduler: walks due recurring jobs, materializes one-shot jobs,
//! recomputes next-run (spec.md §2, §4.5).
//!
//! Cron parsing uses the `cron` crate (the same crate `tokio-cron-scheduler`
//! uses internally) combined with `chrono-tz` for IANA-timezone-correct
//! `next()` computation. `tokio-cron-scheduler` itself schedules in-process
//! callbacks; this Scheduler instead materializes against durable Store
//! rows, so only the cron-parsing layer is reused — see DESIGN.md.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tracing::{error, info, warn};

use crate::broker::{Broker, JobMessage};
use crate::config::Config;
use crate::store::models::{JobType, ScheduledJob};
use crate::store::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{0}': {1}")]
    InvalidCron(String, String),

    #[error("unknown IANA timezone '{0}'")]
    InvalidTimezone(String),

    #[error("cron expression '{0}' has no next occurrence")]
    NoNextOccurrence(String),
}

/// Computes the smallest instant `t' > t` such that `t'` expressed in zone
/// `tz` satisfies cron expression `cron_expr` (spec.md §4.5 "Timezone
/// correctness"). Accepts 5- or 6-field POSIX cron.
pub fn next_occurrence(
    cron_expr: &str,
    tz_name: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let tz: Tz = tz_name
        .parse()
        .map_err(|_| ScheduleError::InvalidTimezone(tz_name.to_string()))?;

    let schedule = parse_cron(cron_expr)?;

    let after_in_tz = after.with_timezone(&tz);
    let next_in_tz = schedule
        .after(&after_in_tz)
        .next()
        .ok_or_else(|| ScheduleError::NoNextOccurrence(cron_expr.to_string()))?;

    Ok(next_in_tz.with_timezone(&Utc))
}

fn parse_cron(expr: &str) -> Result<Schedule, ScheduleError> {
    // The `cron` crate expects a leading seconds field; spec.md accepts
    // bare 5-field POSIX cron too, so prepend "0" when only five fields
    // are present.
    let field_count = expr.split_whitespace().count();
    let normalized = if field_count == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };

    Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron(expr.to_string(), e.to_string()))
}

pub struct Scheduler<'a> {
    store: &'a PgStore,
    broker: &'a Broker,
    poll_interval: Duration,
}

impl<'a> Scheduler<'a> {
    pub fn new(store: &'a PgStore, broker: &'a Broker, config: &Config) -> Self {
        Self {
            store,
            broker,
            poll_interval: config.scheduler_poll_interval,
        }
    }

    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = %e, "scheduler tick failed");
            }
        }
    }

    /// spec.md §5: `next_run_time` must advance, and that advance must be
    /// durable (committed), *before* the materialized job is published —
    /// a crash in between may only cause a missed tick, never a duplicate
    /// materialization. So every due row's job insert + `next_run_time`
    /// advance is committed in this tick's single transaction first; only
    /// once that commit succeeds do we attempt to publish each job, outside
    /// the transaction.
    pub async fn tick(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let due = self.store.due_scheduled_jobs(&mut tx, now, 100).await?;

        let mut to_publish = Vec::new();
        for row in &due {
            match self.materialize_one(&mut tx, row, now).await {
                Ok(Some(payload)) => to_publish.push((row.id, payload)),
                Ok(None) => {}
                Err(e) => error!(scheduled_job_id = %row.id, error = %e, "failed to materialize scheduled job"),
            }
        }

        tx.commit().await?;

        for (scheduled_job_id, payload) in to_publish {
            let job_id = payload.job_id;
            match self.broker.publish(&payload).await {
                Ok(()) => info!(%scheduled_job_id, %job_id, "materialized scheduled job"),
                Err(e) => error!(
                    %scheduled_job_id, %job_id, error = %e,
                    "failed to publish materialized job; next_run_time already advanced, this tick is missed by design"
                ),
            }
        }

        Ok(())
    }

    /// Inserts the job row and advances `next_run_time` within `tx`
    /// (committed by the caller), returning the message to publish once
    /// that commit has succeeded. Returns `Ok(None)` if the website is
    /// inactive — `next_run_time` still advances so an inactive website
    /// doesn't wedge the schedule.
    async fn materialize_one(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        row: &ScheduledJob,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<JobMessage>> {
        let website = self
            .store
            .get_website(row.website_ref)
            .await?
            .ok_or_else(|| anyhow::anyhow!("website {} missing for scheduled job {}", row.website_ref, row.id))?;

        let payload = if !website.is_active() {
            warn!(scheduled_job_id = %row.id, website_id = %row.website_ref, "website inactive, skipping this tick");
            None
        } else {
            let max_retries = website.default_max_retries();
            let job = self
                .store
                .insert_job_tx(
                    tx,
                    &website.base_url,
                    Some(row.website_ref),
                    None,
                    row.job_config.clone(),
                    5,
                    JobType::Scheduled,
                    Some(now),
                    max_retries,
                )
                .await?;

            Some(JobMessage {
                job_id: job.id,
                seed_url: job.seed_url.clone(),
                job_type: job.job_type,
                priority: job.priority,
                has_inline_config: false,
                website_id: job.website_ref,
            })
        };

        let mut next = next_occurrence(&row.cron_schedule, &row.timezone, now)?;
        while next <= now {
            next = next_occurrence(&row.cron_schedule, &row.timezone, next)?;
        }

        self.store.advance_scheduled_job(tx, row.id, now, next).await?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn jakarta_9am_is_2am_utc() {
        // spec.md §8 scenario 5.
        let after = Utc.with_ymd_and_hms(2025, 3, 10, 1, 30, 0).unwrap();
        let next = next_occurrence("0 9 * * *", "Asia/Jakarta", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap());
    }

    #[test]
    fn accepts_five_field_cron() {
        let after = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let next = next_occurrence("0 0 * * *", "UTC", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_unknown_timezone() {
        let after = Utc::now();
        let err = next_occurrence("0 9 * * *", "Not/AZone", after).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTimezone(_)));
    }
}
