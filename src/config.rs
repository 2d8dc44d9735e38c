//! Application configuration loaded once at startup from environment
//! variables (with `.env` support for local development).
//!
//! Mirrors the teacher's `Config::from_env` pattern: a flat struct, one
//! `env::var` per recognized option, sane defaults for everything the spec
//! marks as defaulted.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub broker_url: String,
    pub broker_stream_name: String,
    pub broker_consumer_name: String,
    pub bind_addr: String,
    pub worker_count: usize,

    pub log_retention_days: i64,
    pub log_partition_months_ahead: i64,
    pub url_dedup_ttl: Duration,
    pub ws_token_ttl: Duration,
    pub graceful_cleanup_timeout: Duration,

    pub broker_max_msgs: i64,
    pub broker_dedup_window: Duration,
    pub broker_ack_wait: Duration,
    pub broker_max_deliver: i64,
    pub broker_max_ack_pending: i64,

    pub retry_poll_interval: Duration,
    pub retry_batch_size: i64,
    pub scheduler_poll_interval: Duration,

    pub stream_batch_window: Duration,
    pub stream_poll_fallback: Duration,

    pub environment: Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
    Testing,
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            "testing" => Ok(Environment::Testing),
            other => anyhow::bail!("unrecognized environment: {other}"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            broker_url: env_or("BROKER_URL", "nats://localhost:4222"),
            broker_stream_name: env_or("BROKER_STREAM_NAME", "CRAWLER"),
            broker_consumer_name: env_or("BROKER_CONSUMER_NAME", "crawlctl-workers"),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            worker_count: env_parse("WORKER_COUNT", 4usize)?,

            log_retention_days: env_parse("LOG_RETENTION_DAYS", 90i64)?,
            log_partition_months_ahead: env_parse("LOG_PARTITION_MONTHS_AHEAD", 3i64)?,
            url_dedup_ttl: Duration::from_secs(env_parse("URL_DEDUP_TTL_S", 86_400u64)?),
            ws_token_ttl: Duration::from_secs(env_parse("WS_TOKEN_TTL", 600u64)?),
            graceful_cleanup_timeout: Duration::from_secs(env_parse(
                "GRACEFUL_CLEANUP_TIMEOUT_S",
                5u64,
            )?),

            broker_max_msgs: env_parse("BROKER_MAX_MSGS", 100_000i64)?,
            broker_dedup_window: Duration::from_secs(env_parse("BROKER_DEDUP_WINDOW_S", 300u64)?),
            broker_ack_wait: Duration::from_secs(env_parse("BROKER_ACK_WAIT_S", 300u64)?),
            broker_max_deliver: env_parse("BROKER_MAX_DELIVER", 3i64)?,
            broker_max_ack_pending: env_parse("BROKER_MAX_ACK_PENDING", 10i64)?,

            retry_poll_interval: Duration::from_secs(env_parse("RETRY_POLL_INTERVAL_S", 5u64)?),
            retry_batch_size: env_parse("RETRY_BATCH_SIZE", 100i64)?,
            scheduler_poll_interval: Duration::from_secs(env_parse(
                "SCHEDULER_POLL_INTERVAL_S",
                5u64,
            )?),

            stream_batch_window: Duration::from_millis(env_parse(
                "STREAM_BATCH_WINDOW_MS",
                100u64,
            )?),
            stream_poll_fallback: Duration::from_secs(env_parse("STREAM_POLL_FALLBACK_S", 2u64)?),

            environment: env_or("ENVIRONMENT", "development").parse()?,
        })
    }
}
