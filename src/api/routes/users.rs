use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::api::AppState;
use crate::api::types::{ApiError, PageParams, paginated};
use crate::data::types::{ListUsersParams, MessageView, PaginatedResponse, User, UserProfile};

const DEFAULT_PROFILE_RECENT: i64 = 20;
const DEFAULT_USER_MESSAGES: i64 = 50;
const MAX_USER_MESSAGES: i64 = crate::core::constants::MAX_PAGE_SIZE as i64;

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub q: Option<String>,
    #[serde(flatten)]
    pub page: PageParams,
}

/// `GET /users?q?&page?&page_size?`
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
) -> Result<Json<PaginatedResponse<User>>, ApiError> {
    let page = query.page.resolve()?;
    let (users, total) = state
        .repo
        .list_users(&ListUsersParams {
            query: query.q.filter(|q| !q.trim().is_empty()),
            page,
        })
        .await?;
    Ok(Json(paginated(users, page, total)))
}

/// `GET /users/{username}` — profile counters plus recent messages.
pub async fn get_user_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state
        .repo
        .get_user_profile(&username, DEFAULT_PROFILE_RECENT)
        .await
        .map_err(|e| match e {
            crate::data::error::DataError::NotFound => {
                ApiError::not_found("USER_NOT_FOUND", format!("no user named '{}'", username))
            }
            other => other.into(),
        })?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct UserMessagesQuery {
    pub channel: Option<String>,
    pub limit: Option<i64>,
}

/// `GET /users/{username}/messages?channel=?&limit=?`
pub async fn list_user_messages(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<UserMessagesQuery>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let user = state
        .repo
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| ApiError::not_found("USER_NOT_FOUND", format!("no user named '{}'", username)))?;

    let channel_id = match query.channel {
        Some(name) => Some(
            state
                .repo
                .get_channel_by_name(&name)
                .await?
                .ok_or_else(|| ApiError::not_found("CHANNEL_NOT_FOUND", format!("no channel '{}'", name)))?
                .id,
        ),
        None => None,
    };

    let limit = query.limit.unwrap_or(DEFAULT_USER_MESSAGES).clamp(1, MAX_USER_MESSAGES);
    let messages = state.repo.list_by_user(user.id, channel_id, limit).await?;
    Ok(Json(messages))
}
