use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::api::AppState;
use crate::api::types::ApiError;
use crate::data::types::MessageView;

const HOME_RECENT_MESSAGES: i64 = 20;

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub channel_count: i64,
    pub enabled_channel_count: i64,
    pub user_count: i64,
    pub message_count: i64,
    pub recent_messages: Vec<MessageView>,
}

/// `GET /` — current totals plus the most recent global messages.
pub async fn home(State(state): State<AppState>) -> Result<Json<HomeResponse>, ApiError> {
    let channel_count = state.repo.channel_count().await?;
    let enabled_channel_count = state.repo.enabled_channel_count().await?;
    let user_count = state.repo.user_count().await?;
    let message_count = state.repo.total_message_count().await?;
    let recent_messages = state.repo.get_recent_global(HOME_RECENT_MESSAGES).await?;

    Ok(Json(HomeResponse {
        channel_count,
        enabled_channel_count,
        user_count,
        message_count,
        recent_messages,
    }))
}

/// `GET /healthz` — liveness probe.
pub async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
