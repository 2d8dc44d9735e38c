use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::cancellation::CancellationCoordinator;
use crate::error::{AppError, AppResult};
use crate::ids::JobId;
use crate::store::models::Job;
use crate::submission::{CreateInlineJobRequest, CreateTemplateJobRequest, Submission, SubmissionResult};

pub async fn create_template_job(
    State(state): State<AppState>,
    Json(req): Json<CreateTemplateJobRequest>,
) -> AppResult<Json<SubmissionResult>> {
    let submission = Submission::new(&state.store, &state.broker);
    let result = submission.create_template_job(req).await?;
    Ok(Json(result))
}

pub async fn create_inline_job(
    State(state): State<AppState>,
    Json(req): Json<CreateInlineJobRequest>,
) -> AppResult<Json<SubmissionResult>> {
    let submission = Submission::new(&state.store, &state.broker);
    let result = submission.create_inline_job(req).await?;
    Ok(Json(result))
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<JobId>) -> AppResult<Json<Job>> {
    let job = state
        .store
        .get_job(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {id}")))?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct CancelJobRequest {
    pub cancelled_by: Option<uuid::Uuid>,
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "operator requested cancellation".to_string()
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Json(req): Json<CancelJobRequest>,
) -> AppResult<Json<crate::cancellation::CancellationOutcome>> {
    let coordinator = CancellationCoordinator::new(
        &state.store,
        &state.broker,
        &state.fast_store,
        state.config.graceful_cleanup_timeout,
    );

    // Resources a currently running worker registered for this job live in
    // the shared `ResourceRegistry` (spec.md §4.6) — pull them out here so
    // the coordinator's teardown has something to close. For a still-
    // `pending` job (or one that finished on its own) this is empty.
    let resources = state.resource_registry.take(id);
    let outcome = coordinator.cancel(id, req.cancelled_by, &req.reason, resources).await?;
    Ok(Json(outcome))
}
