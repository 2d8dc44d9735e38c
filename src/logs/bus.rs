//! LogBus: publish/subscribe fan-out of log records keyed by job id
//! (spec.md §2, §4.8, §6 "LogBus wire format").
//!
//! Deliberately core NATS pub/sub, not JetStream: log fan-out is
//! best-effort by design (spec.md §5 — the Store remains authoritative,
//! subscribers may see a log via the bus before it's durably queryable but
//! never a bus-only log absent from the Store).

use async_nats::Client;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::ids::{JobId, WebsiteId};
use crate::store::models::{LogLevel, LogRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBusMessage {
    pub id: i64,
    pub job_id: JobId,
    pub website_id: Option<WebsiteId>,
    pub log_level: LogLevel,
    pub message: String,
    pub step_name: Option<String>,
    pub context: serde_json::Value,
    pub trace_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&LogRecord> for LogBusMessage {
    fn from(r: &LogRecord) -> Self {
        Self {
            id: r.id,
            job_id: r.job_ref,
            website_id: r.website_ref,
            log_level: r.level,
            message: r.message.clone(),
            step_name: r.step_name.clone(),
            context: r.context.clone(),
            trace_id: r.trace_id.clone(),
            created_at: r.created_at,
        }
    }
}

pub struct LogBus {
    client: Client,
}

impl LogBus {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = async_nats::connect(url).await?;
        Ok(Self { client })
    }

    fn subject(job_id: JobId) -> String {
        format!("logs.{job_id}")
    }

    pub async fn publish(&self, record: &LogRecord) -> anyhow::Result<()> {
        let msg = LogBusMessage::from(record);
        let body = serde_json::to_vec(&msg)?;
        self.client
            .publish(Self::subject(record.job_ref), body.into())
            .await?;
        Ok(())
    }

    pub async fn subscribe(&self, job_id: JobId) -> anyhow::Result<LogBusSubscription> {
        let sub = self.client.subscribe(Self::subject(job_id)).await?;
        Ok(LogBusSubscription { inner: sub })
    }

    pub fn is_available(&self) -> bool {
        !matches!(
            self.client.connection_state(),
            async_nats::connection::State::Disconnected
        )
    }
}

pub struct LogBusSubscription {
    inner: async_nats::Subscriber,
}

impl LogBusSubscription {
    pub async fn next(&mut self) -> Option<LogBusMessage> {
        loop {
            let msg = self.inner.next().await?;
            if let Ok(parsed) = serde_json::from_slice::<LogBusMessage>(&msg.payload) {
                return Some(parsed);
            }
        }
    }
}
