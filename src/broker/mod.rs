//! Broker: durable at-least-once work queue over NATS JetStream
//! (spec.md §4.4, §6 "Broker wire format", §9 "Broker abstraction").
//!
//! Work-queue retention means a message is deleted from the stream as soon
//! as any consumer ACKs it. `Nats-Msg-Id` carries the job id so JetStream's
//! bounded dedup window collapses duplicate publishes. The stream is
//! configured with `discard = New` (reject-on-full) rather than the default
//! `Old`, because spec.md is explicit that a full queue must reject new
//! publishes, never silently drop old ones.

use async_nats::jetstream::{self, consumer::PullConsumer, stream::DiscardPolicy};
use async_nats::HeaderMap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::ids::{JobId, WebsiteId};
use crate::store::models::JobType;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("publish rejected (queue full or broker down): {0}")]
    PublishRejected(String),

    #[error("message not found for removal")]
    NotFound,
}

/// The JSON payload carried by every job message, per spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    pub seed_url: String,
    pub job_type: JobType,
    pub priority: i16,
    pub has_inline_config: bool,
    pub website_id: Option<WebsiteId>,
}

pub struct DeliveredMessage {
    pub message: jetstream::Message,
    pub payload: JobMessage,
}

impl DeliveredMessage {
    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.message
            .ack()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))
    }

    pub async fn nak(&self) -> Result<(), BrokerError> {
        self.message
            .ack_with(jetstream::AckKind::Nak(None))
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))
    }
}

pub struct Broker {
    context: jetstream::Context,
    stream_name: String,
    consumer: PullConsumer,
    /// Tracks the JetStream sequence each published job landed at, so
    /// `remove` can delete the exact message instead of leaving it queued.
    /// In-process only: populated by `publish` on this `Broker` instance.
    sequences: DashMap<JobId, u64>,
}

impl Broker {
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let client = async_nats::connect(&config.broker_url).await?;
        let context = jetstream::new(client);

        let stream = context
            .get_or_create_stream(jetstream::stream::Config {
                name: config.broker_stream_name.clone(),
                subjects: vec![format!("{}.jobs", config.broker_stream_name)],
                retention: jetstream::stream::RetentionPolicy::WorkQueue,
                discard: DiscardPolicy::New,
                max_messages: config.broker_max_msgs,
                duplicate_window: config.broker_dedup_window,
                ..Default::default()
            })
            .await?;

        let consumer = stream
            .get_or_create_consumer(
                &config.broker_consumer_name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(config.broker_consumer_name.clone()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: config.broker_ack_wait,
                    max_deliver: config.broker_max_deliver,
                    max_ack_pending: config.broker_max_ack_pending,
                    ..Default::default()
                },
            )
            .await?;

        Ok(Self {
            context,
            stream_name: config.broker_stream_name.clone(),
            consumer,
            sequences: DashMap::new(),
        })
    }

    fn subject(&self) -> String {
        format!("{}.jobs", self.stream_name)
    }

    /// `publish(job_id, payload)` — spec.md §4.4. Errors are non-terminal:
    /// callers must surface them rather than treat publish as fire-and-forget.
    pub async fn publish(&self, payload: &JobMessage) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| BrokerError::PublishRejected(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", payload.job_id.to_string().as_str());

        let publish_ack = self
            .context
            .publish_with_headers(self.subject(), headers, body.into())
            .await
            .map_err(|e| BrokerError::PublishRejected(e.to_string()))?
            .await
            .map_err(|e| BrokerError::PublishRejected(e.to_string()))?;

        self.sequences.insert(payload.job_id, publish_ack.sequence);

        Ok(())
    }

    /// Best-effort removal of a not-yet-consumed message (spec.md §4.6,
    /// §8 "Publish-then-remove": `depth()` must drop by exactly one).
    /// `publish` records the JetStream sequence each job landed at; this
    /// deletes that exact message from the stream. The authoritative
    /// cancellation signal workers check is still the `FastStore` flag
    /// (`cancellation::is_cancelled`), checked before pickup and at every
    /// suspension point, so a worker that races this removal and picks up
    /// the delivery anyway still observes the flag immediately. If the
    /// sequence isn't tracked (e.g. published by a different `Broker`
    /// instance), removal is skipped and logged — failure here is
    /// non-fatal per spec.md's "best-effort" wording.
    pub async fn remove(&self, job_id: JobId) -> Result<(), BrokerError> {
        let Some((_, seq)) = self.sequences.remove(&job_id) else {
            warn!(job_id = %job_id, "no tracked sequence for job, skipping queue removal");
            return Ok(());
        };

        let stream = self
            .context
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        stream
            .delete_message(seq)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        Ok(())
    }

    pub async fn depth(&self) -> Result<u64, BrokerError> {
        let mut info = self
            .context
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        let info = info
            .info()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(info.state.messages)
    }

    pub async fn consumer_stats(&self) -> Result<ConsumerStats, BrokerError> {
        let info = self
            .consumer
            .info()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(ConsumerStats {
            num_pending: info.num_pending,
            num_ack_pending: info.num_ack_pending as u64,
            num_redelivered: info.num_redelivered as u64,
        })
    }

    /// Pulls the next batch of messages for a worker loop to process.
    pub async fn consume(&self, batch: usize) -> Result<Vec<DeliveredMessage>, BrokerError> {
        use futures::StreamExt;

        let mut messages = self
            .consumer
            .fetch()
            .max_messages(batch)
            .messages()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        let mut out = Vec::with_capacity(batch);
        while let Some(msg) = messages.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(_) => continue,
            };
            match serde_json::from_slice::<JobMessage>(&msg.payload) {
                Ok(payload) => out.push(DeliveredMessage {
                    message: msg,
                    payload,
                }),
                Err(_) => {
                    // Malformed payload: ack it away rather than poison the queue.
                    let _ = msg.ack().await;
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsumerStats {
    pub num_pending: u64,
    pub num_ack_pending: u64,
    pub num_redelivered: u64,
}
