//! Row types for every table the Store owns (spec.md §3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::ids::{DlqEntryId, JobId, RetryHistoryId, ScheduledJobId, WebsiteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "website_status", rename_all = "lowercase")]
pub enum WebsiteStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Website {
    pub id: WebsiteId,
    pub name: String,
    pub base_url: String,
    pub status: WebsiteStatus,
    pub config: Json,
    pub default_cron: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Website {
    pub fn is_active(&self) -> bool {
        self.status == WebsiteStatus::Active
    }

    /// `config.global.retry.max_attempts`, falling back to 3 per spec.md §4.2.
    pub fn default_max_retries(&self) -> i32 {
        self.config
            .get("global")
            .and_then(|v| v.get("retry"))
            .and_then(|v| v.get("max_attempts"))
            .and_then(|v| v.as_i64())
            .map(|n| n as i32)
            .unwrap_or(3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
pub enum JobType {
    OneTime,
    Scheduled,
    Recrawl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states are absorbing (spec.md §4.1, §8 "Cancel terminality").
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: JobId,
    pub seed_url: String,
    pub website_ref: Option<WebsiteId>,
    pub inline_config: Option<Json>,
    pub variables: Json,
    pub priority: i16,
    pub job_type: JobType,
    pub status: JobStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub max_retries: i32,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Invariant from spec.md §3/§8: exactly one of `website_ref`,
    /// `inline_config` is set.
    pub fn xor_invariant_holds(website_ref: &Option<WebsiteId>, inline_config: &Option<Json>) -> bool {
        website_ref.is_some() != inline_config.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduledJob {
    pub id: ScheduledJobId,
    pub website_ref: WebsiteId,
    pub cron_schedule: String,
    pub timezone: String,
    pub next_run_time: DateTime<Utc>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub job_config: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "error_category", rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    RateLimit,
    ServerError,
    BrowserCrash,
    ResourceUnavailable,
    Timeout,
    ClientError,
    AuthError,
    NotFound,
    ValidationError,
    BusinessLogicError,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "retry_strategy", rename_all = "lowercase")]
pub enum RetryStrategy {
    Exponential,
    Linear,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RetryPolicy {
    pub error_category: ErrorCategory,
    pub is_retryable: bool,
    pub max_attempts: i32,
    pub strategy: RetryStrategy,
    pub initial_delay_s: f64,
    pub max_delay_s: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RetryHistory {
    pub id: RetryHistoryId,
    pub job_ref: JobId,
    pub attempt_number: i32,
    pub error_category: ErrorCategory,
    pub message: String,
    pub stack: Option<String>,
    pub delay_applied_s: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DlqEntry {
    pub id: DlqEntryId,
    pub job_ref: JobId,
    pub seed_url: String,
    pub website_ref: Option<WebsiteId>,
    pub job_type: JobType,
    pub priority: i16,
    pub error_category: ErrorCategory,
    pub error_message: String,
    pub stack: Option<String>,
    pub http_status: Option<i32>,
    pub total_attempts: i32,
    pub first_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub added_to_dlq_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub retry_attempted: bool,
    pub retry_attempted_at: Option<DateTime<Utc>>,
    pub retry_success: Option<bool>,
}

impl DlqEntry {
    /// Invariant from spec.md §3: `retry_attempted = true ⇔ retry_attempted_at ≠ null`.
    pub fn retry_flag_consistent(&self) -> bool {
        self.retry_attempted == self.retry_attempted_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "log_level", rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogRecord {
    pub id: i64,
    pub job_ref: JobId,
    pub website_ref: Option<WebsiteId>,
    pub step_name: Option<String>,
    pub level: LogLevel,
    pub message: String,
    pub context: Json,
    pub trace_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
