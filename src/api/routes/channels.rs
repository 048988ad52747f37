use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::api::types::ApiError;
use crate::data::types::{Channel, ChannelUpdate, MessageView};
use crate::domain::protocol::normalize_channel;

const DEFAULT_CHANNEL_MESSAGES: i64 = 50;
const MAX_CHANNEL_MESSAGES: i64 = crate::core::constants::MAX_PAGE_SIZE as i64;

/// `GET /channels` — every tracked channel.
pub async fn list_channels(State(state): State<AppState>) -> Result<Json<Vec<Channel>>, ApiError> {
    let channels = state.repo.list_channels().await?;
    Ok(Json(channels))
}

/// `GET /channels/{id}`
pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Channel>, ApiError> {
    let channel = state
        .repo
        .get_channel_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("CHANNEL_NOT_FOUND", format!("no channel with id {}", id)))?;
    Ok(Json(channel))
}

#[derive(Debug, Deserialize)]
pub struct ChannelMessagesQuery {
    pub before_id: Option<i64>,
    pub limit: Option<i64>,
}

/// `GET /channels/{id}/messages` — reverse-chronological page, cursor-paginated by `before_id`.
pub async fn list_channel_messages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ChannelMessagesQuery>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    state
        .repo
        .get_channel_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("CHANNEL_NOT_FOUND", format!("no channel with id {}", id)))?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_CHANNEL_MESSAGES)
        .clamp(1, MAX_CHANNEL_MESSAGES);
    let messages = state.repo.list_by_channel(id, query.before_id, limit).await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    pub display_name: Option<String>,
    pub enabled: Option<bool>,
}

/// `POST /channels` — operator CRUD, no auth machinery (single-operator deployment).
pub async fn create_channel(
    State(state): State<AppState>,
    Json(body): Json<CreateChannelRequest>,
) -> Result<Json<Channel>, ApiError> {
    let name = normalize_channel(&body.name);
    if name.is_empty() {
        return Err(ApiError::bad_request("INVALID_NAME", "channel name cannot be empty"));
    }
    if state.repo.get_channel_by_name(&name).await?.is_some() {
        return Err(ApiError::conflict(
            "CHANNEL_EXISTS",
            format!("channel '{}' is already tracked", name),
        ));
    }
    let display_name = body.display_name.unwrap_or_else(|| name.clone());
    let enabled = body.enabled.unwrap_or(true);
    let channel = state.repo.create_channel(&name, &display_name, enabled).await?;
    Ok(Json(channel))
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct UpdateChannelRequest {
    pub display_name: Option<String>,
    pub enabled: Option<bool>,
    pub retain_history_on_delete: Option<bool>,
}

/// `PATCH /channels/{id}`
pub async fn update_channel(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateChannelRequest>,
) -> Result<Json<Channel>, ApiError> {
    let existing = state
        .repo
        .get_channel_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("CHANNEL_NOT_FOUND", format!("no channel with id {}", id)))?;

    let update = ChannelUpdate {
        display_name: body.display_name,
        enabled: body.enabled,
        retain_history_on_delete: body.retain_history_on_delete,
    };
    let updated = state
        .repo
        .update_channel(id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("CHANNEL_NOT_FOUND", format!("no channel with id {}", id)))?;

    // Disabling (or renaming, though names are immutable here) invalidates the
    // resolver's cached name -> id mapping so the next ingested event re-checks.
    state.processor.invalidate_channel(&existing.name);
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct DeleteChannelQuery {
    pub retain_history: Option<bool>,
}

/// `DELETE /channels/{id}?retain_history=` — hard delete (cascading) when
/// `retain_history` is false, otherwise a soft delete that keeps archived
/// messages readable.
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<DeleteChannelQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let existing = state
        .repo
        .get_channel_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("CHANNEL_NOT_FOUND", format!("no channel with id {}", id)))?;

    let retain_history = query.retain_history.unwrap_or(true);
    let deleted = state.repo.delete_channel(id, retain_history).await?;
    if !deleted {
        return Err(ApiError::not_found("CHANNEL_NOT_FOUND", format!("no channel with id {}", id)));
    }
    state.processor.invalidate_channel(&existing.name);
    Ok(Json(serde_json::json!({ "deleted": true, "retain_history": retain_history })))
}
