//! StreamEndpoint: per-subscriber bridge (spec.md §2, §4.8, §6 "Stream
//! subscriber protocol").

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use tokio::time::{interval, MissedTickBehavior};

use crate::fast_store::FastStore;
use crate::ids::JobId;
use crate::store::models::LogRecord;
use crate::store::PgStore;

use super::bus::LogBus;
use super::buffer::LogBuffer;

const TOKEN_PREFIX: &str = "stream_token:";

/// Issues a single-use token bound to `job_id` with a TTL (spec.md §4.8
/// step 1, §6 subscriber protocol step 1).
pub async fn issue_token(
    fast_store: &FastStore,
    job_id: JobId,
    ttl: Duration,
) -> anyhow::Result<String> {
    let token = uuid::Uuid::new_v4().to_string();
    fast_store
        .set_value(&format!("{TOKEN_PREFIX}{token}"), &job_id.to_string(), ttl)
        .await?;
    Ok(token)
}

#[derive(Debug, thiserror::Error)]
pub enum StreamAuthError {
    #[error("policy violation: invalid or expired token")]
    PolicyViolation,

    #[error("policy violation: token does not match job")]
    JobMismatch,
}

/// Validates and atomically consumes the token (spec.md §4.8 step 1).
/// Invalid/expired fails with a policy-violation error, matching the
/// close code mapping in spec.md §6.
pub async fn consume_token(
    fast_store: &FastStore,
    job_id: JobId,
    token: &str,
) -> Result<(), StreamAuthError> {
    let bound_job = fast_store
        .take_value(&format!("{TOKEN_PREFIX}{token}"))
        .await
        .map_err(|_| StreamAuthError::PolicyViolation)?
        .ok_or(StreamAuthError::PolicyViolation)?;

    if bound_job != job_id.to_string() {
        return Err(StreamAuthError::JobMismatch);
    }

    Ok(())
}

pub struct StreamEndpointConfig {
    pub batch_window: Duration,
    pub poll_fallback: Duration,
}

/// Drives one subscriber's connection end to end: initial replay,
/// resume-after-id, live subscribe with batching, or polling fallback
/// (spec.md §4.8 steps 2–5).
pub async fn run_stream_endpoint(
    mut socket: WebSocket,
    job_id: JobId,
    resume_after: Option<i64>,
    store: &PgStore,
    buffer: &LogBuffer,
    bus: Option<&LogBus>,
    cfg: StreamEndpointConfig,
) {
    if let Err(e) = replay(&mut socket, job_id, resume_after, store, buffer).await {
        tracing::warn!(job_id = %job_id, error = %e, "stream replay failed");
        return;
    }

    let result = match bus {
        Some(bus) if bus.is_available() => live_subscribe(&mut socket, job_id, bus, cfg).await,
        _ => poll_fallback(&mut socket, job_id, store, cfg).await,
    };

    if let Err(e) = result {
        tracing::debug!(job_id = %job_id, error = %e, "stream endpoint closed");
    }

    let _ = socket.close().await;
}

async fn replay(
    socket: &mut WebSocket,
    job_id: JobId,
    resume_after: Option<i64>,
    store: &PgStore,
    buffer: &LogBuffer,
) -> anyhow::Result<()> {
    let records = match resume_after {
        Some(after_id) => {
            let (buffered, covers) = buffer.after(job_id, after_id);
            if covers {
                buffered
            } else {
                // Fell out of the ring: replay from Store starting after it.
                store.logs_after(job_id, after_id).await?
            }
        }
        None => store.last_n_logs(job_id, 50).await?,
    };

    send_batch(socket, &records).await
}

async fn send_batch(socket: &mut WebSocket, records: &[LogRecord]) -> anyhow::Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let body = serde_json::to_string(records)?;
    socket.send(Message::Text(body)).await?;
    Ok(())
}

async fn live_subscribe(
    socket: &mut WebSocket,
    job_id: JobId,
    bus: &LogBus,
    cfg: StreamEndpointConfig,
) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(job_id).await?;
    let mut window = interval(cfg.batch_window);
    window.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pending = Vec::new();

    loop {
        tokio::select! {
            msg = sub.next() => {
                match msg {
                    Some(m) => pending.push(m),
                    None => break,
                }
            }
            _ = window.tick() => {
                if !pending.is_empty() {
                    let body = serde_json::to_string(&pending)?;
                    socket.send(Message::Text(body)).await?;
                    pending.clear();
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

async fn poll_fallback(
    socket: &mut WebSocket,
    job_id: JobId,
    store: &PgStore,
    cfg: StreamEndpointConfig,
) -> anyhow::Result<()> {
    let mut last_seen = chrono::Utc::now();
    let mut ticker = interval(cfg.poll_fallback);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let records = store.logs_after_created_at(job_id, last_seen).await?;
                if let Some(last) = records.last() {
                    last_seen = last.created_at;
                }
                send_batch(socket, &records).await?;
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    Ok(())
}
