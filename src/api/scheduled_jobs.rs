use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::ids::WebsiteId;
use crate::scheduler::next_occurrence;
use crate::store::models::ScheduledJob;

#[derive(Debug, Deserialize)]
pub struct CreateScheduledJobRequest {
    pub website_ref: WebsiteId,
    pub cron_schedule: String,
    pub timezone: String,
    #[serde(default)]
    pub job_config: JsonValue,
}

pub async fn create_scheduled_job(
    State(state): State<AppState>,
    Json(req): Json<CreateScheduledJobRequest>,
) -> AppResult<Json<ScheduledJob>> {
    let next_run = next_occurrence(&req.cron_schedule, &req.timezone, chrono::Utc::now())?;

    let scheduled = state
        .store
        .create_scheduled_job(req.website_ref, &req.cron_schedule, &req.timezone, next_run, req.job_config)
        .await?;

    Ok(Json(scheduled))
}
