//! CrawlCtl control-plane server: HTTP API, scheduler, retry poller, and
//! worker pool in one process.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawlctl_core::app_state::AppState;
use crawlctl_core::config::Config;
use crawlctl_core::retry::poller::RetryPoller;
use crawlctl_core::retry::schedule::RetrySchedule;
use crawlctl_core::scheduler::Scheduler;
use crawlctl_core::worker::Worker;

mod noop_executor {
    use async_trait::async_trait;
    use crawlctl_core::cancellation::ResourceRegistry;
    use crawlctl_core::store::models::Job;
    use crawlctl_core::worker::{ExecutionOutcome, JobExecutor};

    /// Placeholder executor: real deployments inject a fetcher/extraction
    /// implementation here (spec.md §1 "Out of scope"). Without one wired
    /// in, the worker pool drains the queue but performs no fetching, and
    /// registers no resources for the cancellation coordinator to tear
    /// down — a real executor calls `resources.register(job.id, ...)` for
    /// every HTTP/browser handle it opens.
    pub struct NoopExecutor;

    #[async_trait]
    impl JobExecutor for NoopExecutor {
        async fn execute(&self, _job: &Job, _resources: &ResourceRegistry) -> ExecutionOutcome {
            ExecutionOutcome::Success
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crawlctl_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_line_number(true))
        .init();

    tracing::info!("starting crawlctl control plane");

    let config = Config::from_env().context("failed to load configuration")?;
    let bind_addr = config.bind_addr.clone();
    let worker_count = config.worker_count;

    let state = AppState::bootstrap(config).await.context("failed to bootstrap application state")?;

    {
        let state = state.clone();
        tokio::spawn(async move {
            let scheduler = Scheduler::new(&state.store, &state.broker, &state.config);
            scheduler.run().await;
        });
    }

    {
        let state = state.clone();
        let retry_schedule = RetrySchedule::new(state.store.pool().clone());
        tokio::spawn(async move {
            let poller = RetryPoller::new(&retry_schedule, &state.store, &state.broker, &state.config);
            poller.run().await;
        });
    }

    {
        let state = state.clone();
        let months_ahead = state.config.log_partition_months_ahead;
        let retention_days = state.config.log_retention_days;
        tokio::spawn(async move {
            crawlctl_core::store::run_partition_maintenance(&state.store, months_ahead, retention_days).await;
        });
    }

    for i in 0..worker_count {
        let state = state.clone();
        let retry_schedule = RetrySchedule::new(state.store.pool().clone());
        tokio::spawn(async move {
            let worker = Worker::new(
                &state.store,
                &state.broker,
                &state.fast_store,
                &retry_schedule,
                &noop_executor::NoopExecutor,
                &state.resource_registry,
                &state.config,
            );
            tracing::info!(worker_index = i, "worker started");
            worker.run().await;
        });
    }

    let app = crawlctl_core::api::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(addr = %bind_addr, "HTTP API listening");
    axum::serve(listener, app).await.context("HTTP server error")?;

    Ok(())
}
