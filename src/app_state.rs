//! Shared application state, wired together once in `main` and cloned
//! (cheaply, via `Arc`) into every axum handler and background task —
//! mirrors the teacher's `AppState` pattern.

use std::sync::Arc;

use crate::broker::Broker;
use crate::cancellation::ResourceRegistry;
use crate::config::Config;
use crate::fast_store::FastStore;
use crate::logs::bus::LogBus;
use crate::logs::buffer::LogBuffer;
use crate::retry::default_policies;
use crate::store::PgStore;

pub struct AppStateInner {
    pub store: PgStore,
    pub broker: Broker,
    pub fast_store: FastStore,
    pub log_bus: Option<LogBus>,
    pub log_buffer: LogBuffer,
    /// Shared between the worker pool and the HTTP cancel handler so a
    /// job's registered resources are reachable from whichever side calls
    /// `CancellationCoordinator::cancel` (spec.md §4.6).
    pub resource_registry: ResourceRegistry,
    pub config: Config,
}

#[derive(Clone)]
pub struct AppState(pub Arc<AppStateInner>);

impl AppState {
    pub async fn bootstrap(config: Config) -> anyhow::Result<Self> {
        let store = PgStore::connect(&config.database_url).await?;
        store.run_migrations().await?;

        for policy in default_policies() {
            store.upsert_retry_policy(&policy).await?;
        }

        // Ensure partitions for the configured look-ahead window exist
        // immediately; the recurring maintenance loop (spawned by the
        // server binary) keeps extending/trimming them from here on.
        store
            .create_future_log_partitions(config.log_partition_months_ahead)
            .await?;

        let broker = Broker::connect(&config).await?;
        let fast_store = FastStore::connect(&config.redis_url).await?;

        let log_bus = match LogBus::connect(&config.broker_url).await {
            Ok(bus) => Some(bus),
            Err(e) => {
                tracing::warn!(error = %e, "log bus unavailable at startup, falling back to poll-only streaming");
                None
            }
        };

        let log_buffer = LogBuffer::new();
        let resource_registry = ResourceRegistry::new();

        Ok(Self(Arc::new(AppStateInner {
            store,
            broker,
            fast_store,
            log_bus,
            log_buffer,
            resource_registry,
            config,
        })))
    }
}

impl std::ops::Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
