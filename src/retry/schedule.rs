//! RetrySchedule: an ordered-by-timestamp set of jobs awaiting retry
//! (spec.md §2, §4.5).
//!
//! Stored as a Postgres table popped with `SELECT ... FOR UPDATE SKIP
//! LOCKED` — the same concurrency-safe pattern Postgres-backed job queues
//! in the retrieval pack use (e.g. PostHog's `pgqueue`). This keeps the
//! whole control plane on one durable substrate instead of introducing a
//! second stateful system just for one score-ordered set; see DESIGN.md.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::ids::JobId;

#[derive(Debug, Clone)]
pub struct RetryScheduleEntry {
    pub job_id: JobId,
    pub run_at: DateTime<Utc>,
}

pub struct RetrySchedule {
    pool: PgPool,
}

impl RetrySchedule {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `schedule_retry(job_id, now + delay)` (spec.md §7 "Propagation
    /// policy").
    pub async fn schedule(&self, job_id: JobId, run_at: DateTime<Utc>) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO retry_schedule (job_id, run_at)
            VALUES ($1, $2)
            ON CONFLICT (job_id) DO UPDATE SET run_at = EXCLUDED.run_at
            "#,
        )
        .bind(job_id)
        .bind(run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically pops up to `batch` entries whose `run_at <= now`, in
    /// ascending order (spec.md §4.5 "RetryPoller"). Entries are deleted
    /// from the set as part of the same transaction the caller commits
    /// only after a successful publish — see `retry::poller`.
    pub async fn pop_ready(
        &self,
        now: DateTime<Utc>,
        batch: i64,
    ) -> sqlx::Result<Vec<RetryScheduleEntry>> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<(JobId, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT job_id, run_at FROM retry_schedule
            WHERE run_at <= $1
            ORDER BY run_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(batch)
        .fetch_all(&mut *tx)
        .await?;

        if !rows.is_empty() {
            let ids: Vec<uuid::Uuid> = rows.iter().map(|(id, _)| id.into_uuid()).collect();
            sqlx::query("DELETE FROM retry_schedule WHERE job_id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(rows
            .into_iter()
            .map(|(job_id, run_at)| RetryScheduleEntry { job_id, run_at })
            .collect())
    }

    /// Re-inserts an entry that failed to publish, so the next tick
    /// retries it (spec.md §4.5 "on failure, leave it").
    pub async fn reinsert(&self, entry: RetryScheduleEntry) -> sqlx::Result<()> {
        self.schedule(entry.job_id, entry.run_at).await
    }
}
