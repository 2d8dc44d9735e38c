use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::ids::WebsiteId;
use crate::store::models::Website;

#[derive(Debug, Deserialize)]
pub struct CreateWebsiteRequest {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub config: JsonValue,
    pub default_cron: Option<String>,
}

pub async fn create_website(
    State(state): State<AppState>,
    Json(req): Json<CreateWebsiteRequest>,
) -> AppResult<Json<Website>> {
    let website = state
        .store
        .create_website(&req.name, &req.base_url, req.config, req.default_cron.as_deref())
        .await?;
    Ok(Json(website))
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_websites(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<Website>>> {
    let websites = state.store.list_websites(page.limit, page.offset).await?;
    Ok(Json(websites))
}

pub async fn get_website(
    State(state): State<AppState>,
    Path(id): Path<WebsiteId>,
) -> AppResult<Json<Website>> {
    let website = state
        .store
        .get_website(id)
        .await?
        .ok_or_else(|| crate::error::AppError::NotFound(format!("website {id}")))?;
    Ok(Json(website))
}

#[derive(Debug, Deserialize)]
pub struct SetWebsiteConfigRequest {
    pub config: JsonValue,
    pub changed_by: Option<uuid::Uuid>,
}

pub async fn set_website_config(
    State(state): State<AppState>,
    Path(id): Path<WebsiteId>,
    Json(req): Json<SetWebsiteConfigRequest>,
) -> AppResult<Json<Website>> {
    let website = state.store.set_website_config(id, req.config, req.changed_by).await?;
    Ok(Json(website))
}
