//! `Store`: owns every persistent row in the system (spec.md §2, §3, §6).
//!
//! One inherent method per row-owning operation, raw `sqlx::query`/`query_as`
//! the way the teacher's `jobs/executor.rs` and `common/pagination.rs` do it
//! — no ORM layer between this struct and the SQL.

pub mod models;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value as Json;
use sqlx::postgres::{PgPoolOptions, PgQueryResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::ids::{DlqEntryId, JobId, ScheduledJobId, WebsiteId};
use models::*;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Website
    // ------------------------------------------------------------------

    pub async fn get_website(&self, id: WebsiteId) -> sqlx::Result<Option<Website>> {
        sqlx::query_as::<_, Website>("SELECT * FROM website WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_website_by_name(&self, name: &str) -> sqlx::Result<Option<Website>> {
        sqlx::query_as::<_, Website>("SELECT * FROM website WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_websites(&self, limit: i64, offset: i64) -> sqlx::Result<Vec<Website>> {
        sqlx::query_as::<_, Website>("SELECT * FROM website ORDER BY created_at DESC LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn create_website(
        &self,
        name: &str,
        base_url: &str,
        config: Json,
        default_cron: Option<&str>,
    ) -> sqlx::Result<Website> {
        sqlx::query_as::<_, Website>(
            r#"
            INSERT INTO website (id, name, base_url, status, config, default_cron, created_at, updated_at)
            VALUES ($1, $2, $3, 'active', $4, $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(WebsiteId::new())
        .bind(name)
        .bind(base_url)
        .bind(config)
        .bind(default_cron)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn set_website_config(
        &self,
        id: WebsiteId,
        new_config: Json,
        changed_by: Option<Uuid>,
    ) -> sqlx::Result<Website> {
        let mut tx = self.pool.begin().await?;

        let before = sqlx::query_as::<_, Website>("SELECT * FROM website WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        let after = sqlx::query_as::<_, Website>(
            "UPDATE website SET config = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&new_config)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO config_history (id, entity_table, entity_id, old_value, new_value, changed_by, changed_at)
            VALUES ($1, 'website', $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(id.into_uuid())
        .bind(serde_json::to_value(&before.config).unwrap_or(Json::Null))
        .bind(&new_config)
        .bind(changed_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(after)
    }

    // ------------------------------------------------------------------
    // Job
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_job(
        &self,
        seed_url: &str,
        website_ref: Option<WebsiteId>,
        inline_config: Option<Json>,
        variables: Json,
        priority: i16,
        job_type: JobType,
        scheduled_at: Option<DateTime<Utc>>,
        max_retries: i32,
    ) -> sqlx::Result<Job> {
        debug_assert!(Job::xor_invariant_holds(&website_ref, &inline_config));

        sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO crawl_job (
                id, seed_url, website_ref, inline_config, variables, priority,
                job_type, status, scheduled_at, max_retries, attempt_count,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, 0, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(JobId::new())
        .bind(seed_url)
        .bind(website_ref)
        .bind(inline_config)
        .bind(variables)
        .bind(priority)
        .bind(job_type)
        .bind(scheduled_at)
        .bind(max_retries)
        .fetch_one(&self.pool)
        .await
    }

    /// Same insert as `insert_job`, but run inside a caller-owned
    /// transaction so it can be committed atomically alongside another
    /// row update (used by the scheduler to commit job creation together
    /// with advancing `next_run_time`, before anything is published).
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_job_tx<'c>(
        &self,
        tx: &mut sqlx::Transaction<'c, sqlx::Postgres>,
        seed_url: &str,
        website_ref: Option<WebsiteId>,
        inline_config: Option<Json>,
        variables: Json,
        priority: i16,
        job_type: JobType,
        scheduled_at: Option<DateTime<Utc>>,
        max_retries: i32,
    ) -> sqlx::Result<Job> {
        debug_assert!(Job::xor_invariant_holds(&website_ref, &inline_config));

        sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO crawl_job (
                id, seed_url, website_ref, inline_config, variables, priority,
                job_type, status, scheduled_at, max_retries, attempt_count,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, 0, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(JobId::new())
        .bind(seed_url)
        .bind(website_ref)
        .bind(inline_config)
        .bind(variables)
        .bind(priority)
        .bind(job_type)
        .bind(scheduled_at)
        .bind(max_retries)
        .fetch_one(&mut **tx)
        .await
    }

    pub async fn get_job(&self, id: JobId) -> sqlx::Result<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM crawl_job WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Locks and returns the job row for a status-transition check, used by
    /// every operation that must honor the "terminal states are absorbing"
    /// invariant (spec.md §4.1, §8).
    pub async fn lock_job<'c>(
        &self,
        tx: &mut sqlx::Transaction<'c, sqlx::Postgres>,
        id: JobId,
    ) -> sqlx::Result<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM crawl_job WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    pub async fn mark_job_running(&self, id: JobId) -> sqlx::Result<PgQueryResult> {
        sqlx::query(
            "UPDATE crawl_job SET status = 'running', started_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
    }

    pub async fn mark_job_completed(&self, id: JobId) -> sqlx::Result<PgQueryResult> {
        sqlx::query(
            "UPDATE crawl_job SET status = 'completed', completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
    }

    /// Re-queues a failed attempt: job goes back to `pending`,
    /// `attempt_count` increments. See DESIGN.md for the Open Question this
    /// resolves (spec.md §4.1 variant (a)).
    pub async fn requeue_job_for_retry(&self, id: JobId) -> sqlx::Result<PgQueryResult> {
        sqlx::query(
            "UPDATE crawl_job SET status = 'pending', attempt_count = attempt_count + 1, updated_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
    }

    pub async fn mark_job_failed_terminal(&self, id: JobId) -> sqlx::Result<PgQueryResult> {
        sqlx::query(
            "UPDATE crawl_job SET status = 'failed', completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status IN ('running', 'pending')",
        )
        .bind(id)
        .execute(&self.pool)
        .await
    }

    pub async fn mark_job_cancelled(
        &self,
        id: JobId,
        cancelled_by: Option<Uuid>,
        reason: &str,
    ) -> sqlx::Result<PgQueryResult> {
        sqlx::query(
            r#"
            UPDATE crawl_job
            SET status = 'cancelled', cancelled_at = NOW(), cancelled_by = $2,
                cancellation_reason = $3, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'running')
            "#,
        )
        .bind(id)
        .bind(cancelled_by)
        .bind(reason)
        .execute(&self.pool)
        .await
    }

    // ------------------------------------------------------------------
    // ScheduledJob
    // ------------------------------------------------------------------

    pub async fn create_scheduled_job(
        &self,
        website_ref: WebsiteId,
        cron_schedule: &str,
        timezone: &str,
        next_run_time: DateTime<Utc>,
        job_config: Json,
    ) -> sqlx::Result<ScheduledJob> {
        sqlx::query_as::<_, ScheduledJob>(
            r#"
            INSERT INTO scheduled_job (
                id, website_ref, cron_schedule, timezone, next_run_time,
                last_run_time, is_active, job_config, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NULL, true, $6, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(ScheduledJobId::new())
        .bind(website_ref)
        .bind(cron_schedule)
        .bind(timezone)
        .bind(next_run_time)
        .bind(job_config)
        .fetch_one(&self.pool)
        .await
    }

    /// Due rows, ordered by `next_run_time` (spec.md §4.5), locked so two
    /// scheduler instances can't both materialize the same tick.
    pub async fn due_scheduled_jobs<'c>(
        &self,
        tx: &mut sqlx::Transaction<'c, sqlx::Postgres>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> sqlx::Result<Vec<ScheduledJob>> {
        sqlx::query_as::<_, ScheduledJob>(
            r#"
            SELECT * FROM scheduled_job
            WHERE is_active AND next_run_time <= $1
            ORDER BY next_run_time ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut **tx)
        .await
    }

    /// Advances `next_run_time`/`last_run_time`. The scheduler commits this
    /// (together with the row's materialized job insert) before attempting
    /// to publish that job, per spec.md §5's at-most-once-per-tick
    /// guarantee.
    pub async fn advance_scheduled_job<'c>(
        &self,
        tx: &mut sqlx::Transaction<'c, sqlx::Postgres>,
        id: ScheduledJobId,
        materialized_at: DateTime<Utc>,
        next_run_time: DateTime<Utc>,
    ) -> sqlx::Result<PgQueryResult> {
        sqlx::query(
            "UPDATE scheduled_job SET last_run_time = $2, next_run_time = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(materialized_at)
        .bind(next_run_time)
        .execute(&mut **tx)
        .await
    }

    pub async fn begin(&self) -> sqlx::Result<sqlx::Transaction<'_, sqlx::Postgres>> {
        self.pool.begin().await
    }

    // ------------------------------------------------------------------
    // RetryPolicy / RetryHistory
    // ------------------------------------------------------------------

    pub async fn get_retry_policy(&self, category: ErrorCategory) -> sqlx::Result<Option<RetryPolicy>> {
        sqlx::query_as::<_, RetryPolicy>("SELECT * FROM retry_policy WHERE error_category = $1")
            .bind(category)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn upsert_retry_policy(&self, policy: &RetryPolicy) -> sqlx::Result<RetryPolicy> {
        sqlx::query_as::<_, RetryPolicy>(
            r#"
            INSERT INTO retry_policy (error_category, is_retryable, max_attempts, strategy, initial_delay_s, max_delay_s, multiplier)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (error_category) DO UPDATE SET
                is_retryable = EXCLUDED.is_retryable,
                max_attempts = EXCLUDED.max_attempts,
                strategy = EXCLUDED.strategy,
                initial_delay_s = EXCLUDED.initial_delay_s,
                max_delay_s = EXCLUDED.max_delay_s,
                multiplier = EXCLUDED.multiplier
            RETURNING *
            "#,
        )
        .bind(policy.error_category)
        .bind(policy.is_retryable)
        .bind(policy.max_attempts)
        .bind(policy.strategy)
        .bind(policy.initial_delay_s)
        .bind(policy.max_delay_s)
        .bind(policy.multiplier)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn insert_retry_history(
        &self,
        job_ref: JobId,
        attempt_number: i32,
        error_category: ErrorCategory,
        message: &str,
        stack: Option<&str>,
        delay_applied_s: Option<f64>,
    ) -> sqlx::Result<RetryHistory> {
        sqlx::query_as::<_, RetryHistory>(
            r#"
            INSERT INTO retry_history (id, job_ref, attempt_number, error_category, message, stack, delay_applied_s, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(job_ref)
        .bind(attempt_number)
        .bind(error_category)
        .bind(message)
        .bind(stack)
        .bind(delay_applied_s)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_retry_history(&self, job_ref: JobId) -> sqlx::Result<Vec<RetryHistory>> {
        sqlx::query_as::<_, RetryHistory>(
            "SELECT * FROM retry_history WHERE job_ref = $1 ORDER BY attempt_number ASC",
        )
        .bind(job_ref)
        .fetch_all(&self.pool)
        .await
    }

    // ------------------------------------------------------------------
    // DLQ
    // ------------------------------------------------------------------

    pub async fn get_active_dlq_entry(&self, job_ref: JobId) -> sqlx::Result<Option<DlqEntry>> {
        sqlx::query_as::<_, DlqEntry>(
            "SELECT * FROM dead_letter_queue WHERE job_ref = $1 AND resolved_at IS NULL",
        )
        .bind(job_ref)
        .fetch_optional(&self.pool)
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_dlq_entry(
        &self,
        job_ref: JobId,
        seed_url: &str,
        website_ref: Option<WebsiteId>,
        job_type: JobType,
        priority: i16,
        error_category: ErrorCategory,
        error_message: &str,
        stack: Option<&str>,
        http_status: Option<i32>,
        total_attempts: i32,
        first_attempt_at: DateTime<Utc>,
        last_attempt_at: DateTime<Utc>,
    ) -> sqlx::Result<DlqEntry> {
        sqlx::query_as::<_, DlqEntry>(
            r#"
            INSERT INTO dead_letter_queue (
                id, job_ref, seed_url, website_ref, job_type, priority,
                error_category, error_message, stack, http_status,
                total_attempts, first_attempt_at, last_attempt_at,
                added_to_dlq_at, resolved_at, retry_attempted, retry_attempted_at, retry_success
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NULL, false, NULL, NULL)
            RETURNING *
            "#,
        )
        .bind(DlqEntryId::new())
        .bind(job_ref)
        .bind(seed_url)
        .bind(website_ref)
        .bind(job_type)
        .bind(priority)
        .bind(error_category)
        .bind(error_message)
        .bind(stack)
        .bind(http_status)
        .bind(total_attempts)
        .bind(first_attempt_at)
        .bind(last_attempt_at)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn mark_dlq_retry_attempted(
        &self,
        id: DlqEntryId,
        retry_success: Option<bool>,
        resolved: bool,
    ) -> sqlx::Result<DlqEntry> {
        sqlx::query_as::<_, DlqEntry>(
            r#"
            UPDATE dead_letter_queue
            SET retry_attempted = true, retry_attempted_at = NOW(), retry_success = $2,
                resolved_at = CASE WHEN $3 THEN NOW() ELSE resolved_at END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(retry_success)
        .bind(resolved)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_dlq_entry(&self, id: DlqEntryId) -> sqlx::Result<Option<DlqEntry>> {
        sqlx::query_as::<_, DlqEntry>("SELECT * FROM dead_letter_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_dlq_entries(&self, limit: i64, offset: i64) -> sqlx::Result<Vec<DlqEntry>> {
        sqlx::query_as::<_, DlqEntry>(
            "SELECT * FROM dead_letter_queue ORDER BY added_to_dlq_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    // ------------------------------------------------------------------
    // Logs (monthly-partitioned `crawl_log`, spec.md §6 / §9)
    // ------------------------------------------------------------------

    /// `(job_ref, id)` strictly increases (spec.md §3, §8 "Monotone log
    /// id"); a per-job sequence counter in `job_log_sequence` hands out the
    /// next id under row-level lock so concurrent writers for the same job
    /// never race.
    pub async fn insert_log(
        &self,
        job_ref: JobId,
        website_ref: Option<WebsiteId>,
        step_name: Option<&str>,
        level: LogLevel,
        message: &str,
        context: Json,
        trace_id: Option<&str>,
    ) -> sqlx::Result<LogRecord> {
        let mut tx = self.pool.begin().await?;

        let next_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO job_log_sequence (job_ref, next_id)
            VALUES ($1, 1)
            ON CONFLICT (job_ref) DO UPDATE SET next_id = job_log_sequence.next_id + 1
            RETURNING next_id
            "#,
        )
        .bind(job_ref)
        .fetch_one(&mut *tx)
        .await?;

        let record = sqlx::query_as::<_, LogRecord>(
            r#"
            INSERT INTO crawl_log (id, job_ref, website_ref, step_name, level, message, context, trace_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            RETURNING *
            "#,
        )
        .bind(next_id)
        .bind(job_ref)
        .bind(website_ref)
        .bind(step_name)
        .bind(level)
        .bind(message)
        .bind(context)
        .bind(trace_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    pub async fn last_n_logs(&self, job_ref: JobId, n: i64) -> sqlx::Result<Vec<LogRecord>> {
        let mut rows = sqlx::query_as::<_, LogRecord>(
            "SELECT * FROM crawl_log WHERE job_ref = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(job_ref)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        rows.reverse();
        Ok(rows)
    }

    pub async fn logs_after(&self, job_ref: JobId, after_id: i64) -> sqlx::Result<Vec<LogRecord>> {
        sqlx::query_as::<_, LogRecord>(
            "SELECT * FROM crawl_log WHERE job_ref = $1 AND id > $2 ORDER BY id ASC",
        )
        .bind(job_ref)
        .bind(after_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn logs_after_created_at(
        &self,
        job_ref: JobId,
        after: DateTime<Utc>,
    ) -> sqlx::Result<Vec<LogRecord>> {
        sqlx::query_as::<_, LogRecord>(
            "SELECT * FROM crawl_log WHERE job_ref = $1 AND created_at > $2 ORDER BY id ASC",
        )
        .bind(job_ref)
        .bind(after)
        .fetch_all(&self.pool)
        .await
    }

    // ------------------------------------------------------------------
    // crawl_log partition management (spec.md §9 "management surface:
    // create-partition, drop-older-than, list-partitions"), a scheduled
    // maintenance concern rather than part of the hot insert/read path.
    // ------------------------------------------------------------------

    /// Names of the existing monthly partitions of `crawl_log`, oldest first.
    pub async fn list_log_partitions(&self) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT c.relname FROM pg_inherits i
            JOIN pg_class c ON c.oid = i.inhrelid
            JOIN pg_class p ON p.oid = i.inhparent
            WHERE p.relname = 'crawl_log'
            ORDER BY c.relname ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Creates any missing monthly partition from the current month through
    /// `months_ahead` months out, returning the names actually created.
    pub async fn create_future_log_partitions(&self, months_ahead: i64) -> sqlx::Result<Vec<String>> {
        let this_month = month_floor(Utc::now());
        let mut created = Vec::new();

        for i in 0..=months_ahead {
            let start = add_months(this_month, i);
            let end = add_months(start, 1);
            let name = partition_name(start);

            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_class WHERE relname = $1)")
                    .bind(&name)
                    .fetch_one(&self.pool)
                    .await?;
            if exists {
                continue;
            }

            let ddl = format!(
                "CREATE TABLE {name} PARTITION OF crawl_log FOR VALUES FROM ('{}') TO ('{}')",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d"),
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
            created.push(name);
        }

        Ok(created)
    }

    /// Drops partitions whose entire range falls before `retention_days`
    /// ago, returning the names dropped.
    pub async fn drop_log_partitions_older_than(&self, retention_days: i64) -> sqlx::Result<Vec<String>> {
        let cutoff_month = month_floor(Utc::now() - chrono::Duration::days(retention_days));
        let mut dropped = Vec::new();

        for name in self.list_log_partitions().await? {
            let Some(month) = parse_partition_month(&name) else {
                continue;
            };
            if month < cutoff_month {
                let ddl = format!("DROP TABLE IF EXISTS {name}");
                sqlx::query(&ddl).execute(&self.pool).await?;
                dropped.push(name);
            }
        }

        Ok(dropped)
    }
}

fn month_floor(dt: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Datelike;
    Utc.with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0).unwrap()
}

fn add_months(dt: DateTime<Utc>, months: i64) -> DateTime<Utc> {
    use chrono::Datelike;
    let total = dt.year() as i64 * 12 + (dt.month() as i64 - 1) + months;
    let year = total.div_euclid(12) as i32;
    let month = (total.rem_euclid(12) + 1) as u32;
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
}

fn partition_name(dt: DateTime<Utc>) -> String {
    use chrono::Datelike;
    format!("crawl_log_{:04}_{:02}", dt.year(), dt.month())
}

fn parse_partition_month(name: &str) -> Option<DateTime<Utc>> {
    let rest = name.strip_prefix("crawl_log_")?;
    let (year_s, month_s) = rest.split_once('_')?;
    let year: i32 = year_s.parse().ok()?;
    let month: u32 = month_s.parse().ok()?;
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

/// Runs the `crawl_log` partition maintenance surface on a daily cadence
/// (spec.md §9: "a scheduled maintenance task, not part of the hot path").
/// Callers should also invoke `PgStore::create_future_log_partitions` once
/// synchronously at boot, so a freshly migrated database isn't limited to
/// whatever partitions the migrations happened to seed.
pub async fn run_partition_maintenance(store: &PgStore, months_ahead: i64, retention_days: i64) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
    loop {
        ticker.tick().await;

        match store.create_future_log_partitions(months_ahead).await {
            Ok(created) if !created.is_empty() => {
                tracing::info!(partitions = ?created, "created future crawl_log partitions")
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "failed to create future crawl_log partitions"),
        }

        match store.drop_log_partitions_older_than(retention_days).await {
            Ok(dropped) if !dropped.is_empty() => {
                tracing::info!(partitions = ?dropped, "dropped expired crawl_log partitions")
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "failed to drop expired crawl_log partitions"),
        }
    }
}

#[cfg(test)]
mod partition_tests {
    use super::*;

    #[test]
    fn add_months_rolls_over_year_boundary() {
        let start = Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap();
        assert_eq!(add_months(start, 2), Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn partition_name_and_parse_round_trip() {
        let month = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let name = partition_name(month);
        assert_eq!(name, "crawl_log_2025_03");
        assert_eq!(parse_partition_month(&name), Some(month));
    }

    #[test]
    fn parse_partition_month_rejects_unrelated_names() {
        assert_eq!(parse_partition_month("job_log_sequence"), None);
        assert_eq!(parse_partition_month("crawl_log_not_a_month"), None);
    }

    #[test]
    fn month_floor_drops_day_and_time() {
        let dt = Utc.with_ymd_and_hms(2025, 6, 17, 13, 45, 0).unwrap();
        assert_eq!(month_floor(dt), Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
    }
}
