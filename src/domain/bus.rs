//! Live event bus: per-view subscriber registries with bounded queues,
//! backfill-on-connect, and drop-on-overflow fan-out.
//!
//! Each view kind is guarded by its own `parking_lot::RwLock`; a registry
//! lock is held only long enough to clone the current subscriber handle
//! list, never across a send, so a slow subscriber can never block the
//! ingestion path or its siblings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::constants::SSE_SUBSCRIBER_QUEUE_CAPACITY;
use crate::data::types::{Channel, MessageView, StoredMessage, User};
use crate::domain::sink::StoredMessageSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Home,
    Messages,
    Channels,
    Users,
    UserProfile,
    ChannelView,
}

const ALL_VIEW_KINDS: [ViewKind; 6] = [
    ViewKind::Home,
    ViewKind::Messages,
    ViewKind::Channels,
    ViewKind::Users,
    ViewKind::UserProfile,
    ViewKind::ChannelView,
];

/// Which registry a subscriber belongs to, and the key (channel name or
/// username) it is scoped to for the two keyed views.
#[derive(Debug, Clone)]
pub struct ViewFilter {
    pub kind: ViewKind,
    pub key: Option<String>,
}

impl ViewFilter {
    pub fn home() -> Self {
        Self { kind: ViewKind::Home, key: None }
    }
    pub fn messages() -> Self {
        Self { kind: ViewKind::Messages, key: None }
    }
    pub fn channels() -> Self {
        Self { kind: ViewKind::Channels, key: None }
    }
    pub fn users() -> Self {
        Self { kind: ViewKind::Users, key: None }
    }
    pub fn user_profile(username: impl Into<String>) -> Self {
        Self { kind: ViewKind::UserProfile, key: Some(username.into()) }
    }
    pub fn channel_view(channel: impl Into<String>) -> Self {
        Self { kind: ViewKind::ChannelView, key: Some(channel.into()) }
    }
}

/// A single event envelope pushed to subscribers. `type` is the serde tag;
/// `cursor` (message id) is present only where it is meaningful.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Metrics {
        channel_count: i64,
        enabled_channel_count: i64,
        user_count: i64,
        message_count: i64,
    },
    Message {
        cursor: i64,
        id: i64,
        channel_id: i64,
        channel_name: String,
        user_id: i64,
        username: String,
        display_name: Option<String>,
        text: String,
        sent_at: DateTime<Utc>,
    },
    ChannelCount {
        channel_id: i64,
        channel_name: String,
        total_messages: i64,
        last_message_at: Option<DateTime<Utc>>,
    },
    UserCount {
        user_id: i64,
        username: String,
        total_messages: i64,
    },
    UserProfile {
        user_id: i64,
        username: String,
        display_name: Option<String>,
        total_messages: i64,
    },
    Status {
        state: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
    Error {
        message: String,
    },
}

impl LiveEvent {
    /// The ordering cursor, present only on `message` events.
    pub fn cursor(&self) -> Option<i64> {
        match self {
            LiveEvent::Message { cursor, .. } => Some(*cursor),
            _ => None,
        }
    }

    pub fn connected() -> Self {
        LiveEvent::Status { state: "connected", reason: None, retry_after_ms: None }
    }

    pub fn idle() -> Self {
        LiveEvent::Status { state: "idle", reason: None, retry_after_ms: None }
    }

    pub fn fallback(reason: impl Into<String>) -> Self {
        LiveEvent::Status {
            state: "fallback",
            reason: Some(reason.into()),
            retry_after_ms: None,
        }
    }
}

impl From<&StoredMessage> for LiveEvent {
    fn from(m: &StoredMessage) -> Self {
        LiveEvent::Message {
            cursor: m.id,
            id: m.id,
            channel_id: m.channel_id,
            channel_name: m.channel_name.clone(),
            user_id: m.user_id,
            username: m.username.clone(),
            display_name: m.display_name.clone(),
            text: m.text.clone(),
            sent_at: m.sent_at,
        }
    }
}

impl From<&MessageView> for LiveEvent {
    fn from(m: &MessageView) -> Self {
        LiveEvent::Message {
            cursor: m.id,
            id: m.id,
            channel_id: m.channel_id,
            channel_name: m.channel_name.clone(),
            user_id: m.user_id,
            username: m.username.clone(),
            display_name: m.display_name.clone(),
            text: m.text.clone(),
            sent_at: m.sent_at,
        }
    }
}

impl From<&Channel> for LiveEvent {
    fn from(c: &Channel) -> Self {
        LiveEvent::ChannelCount {
            channel_id: c.id,
            channel_name: c.name.clone(),
            total_messages: c.total_messages,
            last_message_at: c.last_message_at,
        }
    }
}

impl From<&User> for LiveEvent {
    fn from(u: &User) -> Self {
        LiveEvent::UserCount {
            user_id: u.id,
            username: u.username.clone(),
            total_messages: u.total_messages,
        }
    }
}

struct Subscriber {
    filter: ViewFilter,
    tx: mpsc::Sender<LiveEvent>,
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<String, Subscriber>,
}

/// Fans stored-message and counter-update notifications out to long-lived
/// HTTP subscribers, segmented by view.
pub struct LiveBus {
    home: RwLock<Registry>,
    messages: RwLock<Registry>,
    channels: RwLock<Registry>,
    users: RwLock<Registry>,
    user_profile: RwLock<Registry>,
    channel_view: RwLock<Registry>,
    backpressure_drops: AtomicU64,
}

impl LiveBus {
    pub fn new() -> Self {
        Self {
            home: RwLock::new(Registry::default()),
            messages: RwLock::new(Registry::default()),
            channels: RwLock::new(Registry::default()),
            users: RwLock::new(Registry::default()),
            user_profile: RwLock::new(Registry::default()),
            channel_view: RwLock::new(Registry::default()),
            backpressure_drops: AtomicU64::new(0),
        }
    }

    pub fn backpressure_drops(&self) -> u64 {
        self.backpressure_drops.load(Ordering::Relaxed)
    }

    fn registry(&self, kind: ViewKind) -> &RwLock<Registry> {
        match kind {
            ViewKind::Home => &self.home,
            ViewKind::Messages => &self.messages,
            ViewKind::Channels => &self.channels,
            ViewKind::Users => &self.users,
            ViewKind::UserProfile => &self.user_profile,
            ViewKind::ChannelView => &self.channel_view,
        }
    }

    pub fn subscriber_count(&self, kind: ViewKind) -> usize {
        self.registry(kind).read().subscribers.len()
    }

    /// Register a subscriber. `backfill` (already queried by the caller, who
    /// holds the repository handle) is delivered into its queue before the
    /// `status:connected` acknowledgement and before it becomes visible to
    /// broadcast, so later live events always sort after it.
    pub fn subscribe(&self, filter: ViewFilter, backfill: Vec<LiveEvent>) -> (String, mpsc::Receiver<LiveEvent>) {
        let (tx, rx) = mpsc::channel(SSE_SUBSCRIBER_QUEUE_CAPACITY);
        for event in backfill {
            let _ = tx.try_send(event);
        }
        let _ = tx.try_send(LiveEvent::connected());

        let id = cuid2::create_id();
        self.registry(filter.kind)
            .write()
            .subscribers
            .insert(id.clone(), Subscriber { filter, tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, kind: ViewKind, id: &str) {
        self.registry(kind).write().subscribers.remove(id);
    }

    /// Non-blocking fan-out to every subscriber of `kind` whose key (if any)
    /// matches `key`. A full subscriber queue gets a closing `fallback`
    /// status and is dropped from the registry.
    fn broadcast(&self, kind: ViewKind, key: Option<&str>, event: LiveEvent) {
        let registry = self.registry(kind);
        let targets: Vec<(String, mpsc::Sender<LiveEvent>)> = {
            let guard = registry.read();
            guard
                .subscribers
                .iter()
                .filter(|(_, sub)| match &sub.filter.key {
                    Some(k) => Some(k.as_str()) == key,
                    None => true,
                })
                .map(|(id, sub)| (id.clone(), sub.tx.clone()))
                .collect()
        };

        let mut overflowed = Vec::new();
        for (id, tx) in targets {
            if tx.try_send(event.clone()).is_err() {
                self.backpressure_drops.fetch_add(1, Ordering::Relaxed);
                let _ = tx.try_send(LiveEvent::fallback("subscriber queue overflow"));
                overflowed.push(id);
            }
        }
        if !overflowed.is_empty() {
            let mut guard = registry.write();
            for id in overflowed {
                guard.subscribers.remove(&id);
            }
        }
    }

    /// Close every subscriber. Called once, during coordinated shutdown;
    /// dropping each sender ends the corresponding SSE stream.
    pub async fn shutdown(&self) {
        for kind in ALL_VIEW_KINDS {
            self.registry(kind).write().subscribers.clear();
        }
    }
}

impl Default for LiveBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoredMessageSink for LiveBus {
    async fn on_stored_message(&self, message: &StoredMessage) {
        let event: LiveEvent = message.into();
        self.broadcast(ViewKind::Home, None, event.clone());
        self.broadcast(ViewKind::Messages, None, event.clone());
        self.broadcast(ViewKind::ChannelView, Some(&message.channel_name), event.clone());
        self.broadcast(ViewKind::UserProfile, Some(&message.username), event);
    }

    async fn on_channel_count(&self, channel: &Channel) {
        self.broadcast(ViewKind::Channels, None, channel.into());
    }

    async fn on_user_count(&self, user: &User) {
        self.broadcast(ViewKind::Users, None, user.into());
        self.broadcast(
            ViewKind::UserProfile,
            Some(&user.username),
            LiveEvent::UserProfile {
                user_id: user.id,
                username: user.username.clone(),
                display_name: user.display_name.clone(),
                total_messages: user.total_messages,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stored(id: i64, channel: &str, username: &str) -> StoredMessage {
        StoredMessage {
            id,
            channel_id: 1,
            channel_name: channel.to_string(),
            user_id: 1,
            username: username.to_string(),
            display_name: None,
            text: "hi".to_string(),
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_connected_then_backfill_order_preserved() {
        let bus = LiveBus::new();
        let backfill = vec![
            LiveEvent::from(&stored(1, "alpha", "u1")),
            LiveEvent::from(&stored(2, "alpha", "u1")),
        ];
        let (_id, mut rx) = bus.subscribe(ViewFilter::messages(), backfill);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.cursor(), Some(1));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.cursor(), Some(2));
        let third = rx.recv().await.unwrap();
        assert!(matches!(third, LiveEvent::Status { state: "connected", .. }));
    }

    #[tokio::test]
    async fn messages_broadcast_reaches_home_and_messages_views() {
        let bus = LiveBus::new();
        let (_h, mut home_rx) = bus.subscribe(ViewFilter::home(), vec![]);
        let (_m, mut msg_rx) = bus.subscribe(ViewFilter::messages(), vec![]);
        home_rx.recv().await.unwrap(); // connected
        msg_rx.recv().await.unwrap(); // connected

        bus.on_stored_message(&stored(10, "alpha", "u1")).await;

        let home_event = home_rx.recv().await.unwrap();
        let msg_event = msg_rx.recv().await.unwrap();
        assert_eq!(home_event.cursor(), Some(10));
        assert_eq!(msg_event.cursor(), Some(10));
    }

    #[tokio::test]
    async fn channel_view_only_receives_matching_channel() {
        let bus = LiveBus::new();
        let (_a, mut alpha_rx) = bus.subscribe(ViewFilter::channel_view("alpha"), vec![]);
        let (_b, mut beta_rx) = bus.subscribe(ViewFilter::channel_view("beta"), vec![]);
        alpha_rx.recv().await.unwrap();
        beta_rx.recv().await.unwrap();

        bus.on_stored_message(&stored(1, "alpha", "u1")).await;

        assert!(alpha_rx.try_recv().is_ok());
        assert!(beta_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn overflowing_subscriber_is_closed_and_counted() {
        let bus = LiveBus::new();
        let (_id, mut rx) = bus.subscribe(ViewFilter::messages(), vec![]);
        rx.recv().await.unwrap(); // connected

        for i in 0..(SSE_SUBSCRIBER_QUEUE_CAPACITY as i64 + 5) {
            bus.on_stored_message(&stored(i, "alpha", "u1")).await;
        }

        assert!(bus.backpressure_drops() > 0);
        assert_eq!(bus.subscriber_count(ViewKind::Messages), 0);
    }

    #[tokio::test]
    async fn shutdown_clears_every_registry() {
        let bus = LiveBus::new();
        let (_id, mut rx) = bus.subscribe(ViewFilter::home(), vec![]);
        bus.shutdown().await;
        assert_eq!(bus.subscriber_count(ViewKind::Home), 0);
        rx.recv().await.unwrap(); // connected, queued before shutdown
        assert!(rx.recv().await.is_none());
    }
}
