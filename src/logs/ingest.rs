//! LogIngest: writes log records to Store, buffers to LogBuffer, publishes
//! on LogBus (spec.md §2, §4.8).
//!
//! (b) and (c) failing must not fail (a): the Store insert is the only
//! fallible step callers need to treat as authoritative.

use serde_json::Value as Json;
use tracing::warn;

use crate::ids::{JobId, WebsiteId};
use crate::store::models::LogLevel;
use crate::store::PgStore;

use super::{bus::LogBus, buffer::LogBuffer};

pub struct LogIngest<'a> {
    store: &'a PgStore,
    buffer: &'a LogBuffer,
    bus: Option<&'a LogBus>,
}

impl<'a> LogIngest<'a> {
    pub fn new(store: &'a PgStore, buffer: &'a LogBuffer, bus: Option<&'a LogBus>) -> Self {
        Self { store, buffer, bus }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn ingest(
        &self,
        job_ref: JobId,
        website_ref: Option<WebsiteId>,
        step_name: Option<&str>,
        level: LogLevel,
        message: &str,
        context: Json,
        trace_id: Option<&str>,
    ) -> anyhow::Result<()> {
        let record = self
            .store
            .insert_log(job_ref, website_ref, step_name, level, message, context, trace_id)
            .await?;

        self.buffer.push(record.clone());

        if let Some(bus) = self.bus {
            if let Err(e) = bus.publish(&record).await {
                warn!(job_id = %job_ref, error = %e, "log bus publish failed, buffer still holds the record");
            }
        }

        Ok(())
    }
}
