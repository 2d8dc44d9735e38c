use axum::extract::ws::{CloseFrame, Message, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::ids::JobId;
use crate::logs::stream::{consume_token, issue_token, run_stream_endpoint, StreamEndpointConfig};

#[derive(Debug, Serialize)]
pub struct StreamTokenResponse {
    pub token: String,
}

/// spec.md §6 stream subscriber protocol step 1: job must exist, 404
/// otherwise.
pub async fn issue_stream_token(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<Json<StreamTokenResponse>> {
    state
        .store
        .get_job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;

    let token = issue_token(&state.fast_store, job_id, state.config.ws_token_ttl)
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(StreamTokenResponse { token }))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: String,
    pub resume_after: Option<i64>,
}

/// POLICY_VIOLATION close code (RFC 6455 §7.4.1), used when a token fails
/// validation (spec.md §6 "Stream rejection ⇒ policy-violation close
/// (1008)"). The upgrade itself always succeeds — rejection is a close
/// frame sent *after* upgrading, not an HTTP error response, since the
/// spec's protocol only defines a close-code vocabulary for this case.
const POLICY_VIOLATION: u16 = 1008;

/// spec.md §6 stream subscriber protocol steps 2–5.
pub async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let cfg = StreamEndpointConfig {
        batch_window: state.config.stream_batch_window,
        poll_fallback: state.config.stream_poll_fallback,
    };

    ws.on_upgrade(move |mut socket| async move {
        if let Err(e) = consume_token(&state.fast_store, job_id, &query.token).await {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: POLICY_VIOLATION,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }

        run_stream_endpoint(
            socket,
            job_id,
            query.resume_after,
            &state.store,
            &state.log_buffer,
            state.log_bus.as_ref(),
            cfg,
        )
        .await;
    })
}
