use axum::extract::{Path, Query, State};
use axum::Json;

use crate::app_state::AppState;
use crate::dlq::DlqManager;
use crate::error::AppResult;
use crate::ids::DlqEntryId;
use crate::store::models::DlqEntry;

use super::websites::Pagination;

pub async fn list_entries(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<DlqEntry>>> {
    let dlq = DlqManager::new(&state.store, &state.broker);
    let entries = dlq.list(page.limit, page.offset).await?;
    Ok(Json(entries))
}

pub async fn retry_entry(State(state): State<AppState>, Path(id): Path<DlqEntryId>) -> AppResult<Json<DlqEntry>> {
    let dlq = DlqManager::new(&state.store, &state.broker);
    let entry = dlq.retry(id).await?;
    Ok(Json(entry))
}
