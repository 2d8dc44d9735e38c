//! CrawlCtl: the durable control plane for a distributed web crawl.
//!
//! Owns submission, queueing, scheduling, retries, dead-lettering, and
//! live log fan-out. The fetcher/extraction pipeline itself is an
//! external collaborator — see [`worker::JobExecutor`].

pub mod api;
pub mod app_state;
pub mod broker;
pub mod cancellation;
pub mod config;
pub mod dlq;
pub mod error;
pub mod fast_store;
pub mod ids;
pub mod logs;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod submission;
pub mod variables;
pub mod worker;

pub use app_state::AppState;
pub use config::Config;
pub use error::{AppError, AppResult};
