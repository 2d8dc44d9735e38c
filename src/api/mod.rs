//! HTTP API: exposes every §4 operation over `axum`, wired through
//! `tower-http`'s trace/CORS/timeout layers the way the teacher's server
//! binary wires its router.

mod dlq;
mod jobs;
mod scheduled_jobs;
mod stream;
mod websites;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/websites", post(websites::create_website).get(websites::list_websites))
        .route("/websites/:id", get(websites::get_website))
        .route("/websites/:id/config", post(websites::set_website_config))
        .route("/jobs/template", post(jobs::create_template_job))
        .route("/jobs/inline", post(jobs::create_inline_job))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/scheduled-jobs", post(scheduled_jobs::create_scheduled_job))
        .route("/dlq", get(dlq::list_entries))
        .route("/dlq/:id/retry", post(dlq::retry_entry))
        .route("/jobs/:id/logs/token", post(stream::issue_stream_token))
        .route("/jobs/:id/logs/ws", get(stream::websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}
