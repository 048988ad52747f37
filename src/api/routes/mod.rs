//! Route handlers, grouped by resource.

pub mod channels;
pub mod health;
pub mod live;
pub mod messages;
pub mod users;

use axum::Router;
use axum::routing::get;

use crate::api::AppState;

/// Routes behind the blanket HTTP read timeout: everything except the
/// long-lived SSE endpoints, which self-police via their own heartbeat.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health::home))
        .route("/healthz", get(health::healthz))
        .route("/messages", get(messages::list_messages))
        .route(
            "/channels",
            get(channels::list_channels).post(channels::create_channel),
        )
        .route(
            "/channels/{id}",
            get(channels::get_channel)
                .patch(channels::update_channel)
                .delete(channels::delete_channel),
        )
        .route("/channels/{id}/messages", get(channels::list_channel_messages))
        .route("/users", get(users::list_users))
        .route("/users/{username}", get(users::get_user_profile))
        .route("/users/{username}/messages", get(users::list_user_messages))
}

/// SSE routes, kept off the blanket request timeout.
pub fn live_router() -> Router<AppState> {
    Router::new()
        .route("/live", get(live::live))
        .route("/channels/{id}/messages/stream", get(channel_messages_stream))
}

/// Thin alias over `/live?view=channel_view&channel=` keyed by id instead of
/// name, for clients that already have the channel id from a list response.
async fn channel_messages_stream(
    state: axum::extract::State<AppState>,
    path: axum::extract::Path<i64>,
    query: axum::extract::Query<std::collections::HashMap<String, String>>,
) -> Result<axum::response::Response, crate::api::types::ApiError> {
    use axum::response::IntoResponse;

    let channel = state
        .0
        .repo
        .get_channel_by_id(path.0)
        .await?
        .ok_or_else(|| {
            crate::api::types::ApiError::not_found("CHANNEL_NOT_FOUND", format!("no channel with id {}", path.0))
        })?;

    let live_query = live::LiveQuery {
        view: "channel_view".to_string(),
        after_id: query.0.get("after_id").and_then(|v| v.parse().ok()),
        channel: Some(channel.name),
        user: None,
    };
    live::live(axum::extract::State(state.0), axum::extract::Query(live_query))
        .await
        .map(IntoResponse::into_response)
}
