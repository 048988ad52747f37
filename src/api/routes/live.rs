use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};

use crate::api::AppState;
use crate::api::types::ApiError;
use crate::core::constants::{SSE_BACKFILL_MAX_ROWS, SSE_HEARTBEAT_INTERVAL_SECS};
use crate::domain::bus::{LiveBus, LiveEvent, ViewFilter, ViewKind};

/// Rows shown in the initial snapshot when no `after_id` is supplied.
const SNAPSHOT_ROWS: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    pub view: String,
    pub after_id: Option<i64>,
    pub channel: Option<String>,
    pub user: Option<String>,
}

fn parse_view(raw: &str) -> Result<ViewKind, ApiError> {
    match raw {
        "home" => Ok(ViewKind::Home),
        "messages" => Ok(ViewKind::Messages),
        "channels" => Ok(ViewKind::Channels),
        "users" => Ok(ViewKind::Users),
        "user_profile" => Ok(ViewKind::UserProfile),
        "channel_view" => Ok(ViewKind::ChannelView),
        other => Err(ApiError::bad_request(
            "INVALID_VIEW",
            format!("unknown view '{}'", other),
        )),
    }
}

/// `GET /live?view=&after_id=&channel=&user=` — long-lived SSE subscription.
pub async fn live(
    State(state): State<AppState>,
    Query(query): Query<LiveQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if *state.shutdown_rx.borrow() {
        return Err(ApiError::unavailable("server is shutting down"));
    }

    let kind = parse_view(&query.view)?;
    let filter = match kind {
        ViewKind::Home => ViewFilter::home(),
        ViewKind::Messages => ViewFilter::messages(),
        ViewKind::Channels => ViewFilter::channels(),
        ViewKind::Users => ViewFilter::users(),
        ViewKind::UserProfile => {
            let user = query
                .user
                .as_deref()
                .ok_or_else(|| ApiError::bad_request("MISSING_USER", "user_profile view requires ?user="))?;
            state
                .repo
                .get_user_by_username(user)
                .await?
                .ok_or_else(|| ApiError::not_found("USER_NOT_FOUND", format!("no user named '{}'", user)))?;
            ViewFilter::user_profile(user)
        }
        ViewKind::ChannelView => {
            let channel = query
                .channel
                .as_deref()
                .ok_or_else(|| ApiError::bad_request("MISSING_CHANNEL", "channel_view requires ?channel="))?;
            state
                .repo
                .get_channel_by_name(channel)
                .await?
                .ok_or_else(|| ApiError::not_found("CHANNEL_NOT_FOUND", format!("no channel '{}'", channel)))?;
            ViewFilter::channel_view(channel)
        }
    };

    let backfill = build_backfill(&state, kind, &filter, query.after_id).await?;
    let (id, rx) = state.bus.subscribe(filter, backfill);

    let subscription = Subscription {
        bus: state.bus.clone(),
        kind,
        id,
        rx,
    };

    Ok(Sse::new(subscriber_stream(subscription)).keep_alive(KeepAlive::default()))
}

async fn build_backfill(
    state: &AppState,
    kind: ViewKind,
    filter: &ViewFilter,
    after_id: Option<i64>,
) -> Result<Vec<LiveEvent>, ApiError> {
    match kind {
        ViewKind::Home => {
            let channel_count = state.repo.channel_count().await?;
            let enabled_channel_count = state.repo.enabled_channel_count().await?;
            let user_count = state.repo.user_count().await?;
            let message_count = state.repo.total_message_count().await?;
            let mut events = vec![LiveEvent::Metrics {
                channel_count,
                enabled_channel_count,
                user_count,
                message_count,
            }];
            events.extend(recent_messages(state, None, after_id).await?);
            Ok(events)
        }
        ViewKind::Messages => recent_messages(state, None, after_id).await,
        ViewKind::Channels => {
            let channels = state.repo.list_channels().await?;
            Ok(channels.iter().map(LiveEvent::from).collect())
        }
        ViewKind::Users => {
            let (users, _total) = state
                .repo
                .list_users(&crate::data::types::ListUsersParams {
                    query: None,
                    page: crate::data::types::Page {
                        page: 1,
                        page_size: SSE_BACKFILL_MAX_ROWS as u32,
                    },
                })
                .await?;
            Ok(users.iter().map(LiveEvent::from).collect())
        }
        ViewKind::UserProfile => {
            let username = filter.key.as_deref().unwrap_or_default();
            let profile = state.repo.get_user_profile(username, SNAPSHOT_ROWS).await?;
            let mut events = vec![LiveEvent::UserProfile {
                user_id: profile.user.id,
                username: profile.user.username.clone(),
                display_name: profile.user.display_name.clone(),
                total_messages: profile.user.total_messages,
            }];
            events.extend(profile.recent_messages.iter().rev().map(LiveEvent::from));
            Ok(events)
        }
        ViewKind::ChannelView => {
            let channel_id = state
                .repo
                .get_channel_by_name(filter.key.as_deref().unwrap_or_default())
                .await?
                .map(|c| c.id);
            recent_messages(state, channel_id, after_id).await
        }
    }
}

/// Ascending-order message backfill: `after_id` replays everything newer,
/// capped at [`SSE_BACKFILL_MAX_ROWS`] with a `fallback` notice if truncated;
/// otherwise the latest [`SNAPSHOT_ROWS`] are shown oldest-first so the
/// subscriber's cursor stays strictly increasing for the rest of the session.
async fn recent_messages(
    state: &AppState,
    channel_id: Option<i64>,
    after_id: Option<i64>,
) -> Result<Vec<LiveEvent>, ApiError> {
    match after_id {
        Some(after_id) => {
            let cap = SSE_BACKFILL_MAX_ROWS as i64;
            let rows = state
                .repo
                .list_since(after_id, channel_id, cap + 1)
                .await?;
            let truncated = rows.len() as i64 > cap;
            let mut events: Vec<LiveEvent> = rows
                .iter()
                .take(cap as usize)
                .map(LiveEvent::from)
                .collect();
            if truncated {
                events.push(LiveEvent::fallback("backfill exceeded cap, refresh to resync"));
            }
            Ok(events)
        }
        None => {
            let rows = match channel_id {
                Some(id) => state.repo.list_by_channel(id, None, SNAPSHOT_ROWS).await?,
                None => state.repo.get_recent_global(SNAPSHOT_ROWS).await?,
            };
            Ok(rows.iter().rev().map(LiveEvent::from).collect())
        }
    }
}

struct Subscription {
    bus: Arc<LiveBus>,
    kind: ViewKind,
    id: String,
    rx: mpsc::Receiver<LiveEvent>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.kind, &self.id);
    }
}

fn to_sse_event(event: &LiveEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().data(data)
}

fn subscriber_stream(sub: Subscription) -> impl Stream<Item = Result<Event, Infallible>> {
    let mut heartbeat = interval(Duration::from_secs(SSE_HEARTBEAT_INTERVAL_SECS));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold((sub, heartbeat), |(mut sub, mut heartbeat)| async move {
        tokio::select! {
            biased;
            maybe = sub.rx.recv() => {
                maybe.map(|event| (Ok(to_sse_event(&event)), (sub, heartbeat)))
            }
            _ = heartbeat.tick() => {
                Some((Ok(to_sse_event(&LiveEvent::idle())), (sub, heartbeat)))
            }
        }
    })
}
