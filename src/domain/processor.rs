//! Identity resolution and batch-to-storage conversion.
//!
//! Resolves channel/user names to numeric ids via a TTL cache that falls
//! through to the store on miss, converts resolved events into storage rows,
//! commits the batch as one transaction, and notifies the live bus of every
//! row that lands.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::core::constants::{IDENTITY_CACHE_CAPACITY, IDENTITY_CACHE_TTL_SECS};
use crate::data::error::DataError;
use crate::data::traits::Repository;
use crate::data::types::NewMessage;
use crate::domain::protocol::normalize_channel;
use crate::domain::sink::{IngestEvent, StoredMessageSink};

pub struct Processor {
    repo: Arc<dyn Repository + Send + Sync>,
    bus: Arc<dyn StoredMessageSink>,
    channel_cache: Cache<String, i64>,
    user_cache: Cache<String, i64>,
}

impl Processor {
    pub fn new(repo: Arc<dyn Repository + Send + Sync>, bus: Arc<dyn StoredMessageSink>) -> Self {
        let ttl = Duration::from_secs(IDENTITY_CACHE_TTL_SECS);
        let channel_cache = Cache::builder()
            .max_capacity(IDENTITY_CACHE_CAPACITY)
            .time_to_live(ttl)
            .build();
        let user_cache = Cache::builder()
            .max_capacity(IDENTITY_CACHE_CAPACITY)
            .time_to_live(ttl)
            .build();
        Self {
            repo,
            bus,
            channel_cache,
            user_cache,
        }
    }

    #[cfg(test)]
    pub fn repo(&self) -> &Arc<dyn Repository + Send + Sync> {
        &self.repo
    }

    /// Evict a channel from the resolution cache, used when an operator
    /// deletes or disables it so the next event re-checks the store.
    pub fn invalidate_channel(&self, name: &str) {
        self.channel_cache.invalidate(&normalize_channel(name));
    }

    async fn resolve_channel(&self, name: &str) -> Option<i64> {
        if let Some(id) = self.channel_cache.get(name).await {
            tracing::trace!(channel = name, "channel cache hit");
            return Some(id);
        }
        tracing::trace!(channel = name, "channel cache miss");
        match self.repo.get_channel_by_name(name).await {
            Ok(Some(channel)) if channel.enabled && channel.deleted_at.is_none() => {
                self.channel_cache.insert(name.to_string(), channel.id).await;
                Some(channel.id)
            }
            Ok(Some(_)) => {
                tracing::trace!(channel = name, "channel disabled or deleted, skipping event");
                None
            }
            Ok(None) => {
                tracing::trace!(channel = name, "channel not tracked, skipping event");
                None
            }
            Err(e) => {
                tracing::warn!(channel = name, error = %e, "channel lookup failed, skipping event");
                None
            }
        }
    }

    async fn resolve_user(&self, username: &str, display_name: Option<&str>) -> Option<i64> {
        if let Some(id) = self.user_cache.get(username).await {
            tracing::trace!(user = username, "user cache hit");
            return Some(id);
        }
        tracing::trace!(user = username, "user cache miss");
        match self.repo.get_or_create_user(username, display_name).await {
            Ok(user) => {
                self.user_cache.insert(username.to_string(), user.id).await;
                Some(user.id)
            }
            Err(e) => {
                tracing::warn!(user = username, error = %e, "user resolution failed, skipping event");
                None
            }
        }
    }

    /// Resolves and commits `events` as a single transaction. Events that
    /// fail resolution are skipped; a commit failure fails the whole batch.
    /// Returns the number of rows actually stored.
    pub async fn process_batch(&self, events: Vec<IngestEvent>) -> Result<usize, DataError> {
        let mut rows = Vec::with_capacity(events.len());
        for event in events {
            let msg = event.message;
            let channel_id = match self.resolve_channel(&msg.channel).await {
                Some(id) => id,
                None => continue,
            };
            let user_id = match self.resolve_user(&msg.username, msg.display_name.as_deref()).await {
                Some(id) => id,
                None => continue,
            };
            let tags = serde_json::to_value(&msg.tags).unwrap_or(serde_json::Value::Null);
            rows.push(NewMessage {
                channel_id,
                user_id,
                text: msg.text,
                sent_at: event.received_at,
                tags,
            });
        }

        if rows.is_empty() {
            return Ok(0);
        }

        let stored = self.repo.create_message_batch(&rows).await?;
        for message in &stored {
            self.bus.on_stored_message(message).await;
            if let Ok(Some(channel)) = self.repo.get_channel_by_id(message.channel_id).await {
                self.bus.on_channel_count(&channel).await;
            }
            if let Ok(Some(user)) = self.repo.get_user_by_id(message.user_id).await {
                self.bus.on_user_count(&user).await;
            }
        }

        Ok(stored.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DbService;
    use crate::domain::bus::LiveBus;
    use crate::domain::protocol::parse::PrivmsgEvent;
    use chrono::Utc;
    use std::collections::HashMap;

    async fn processor_with_channel(name: &str) -> (Arc<Processor>, Arc<dyn Repository + Send + Sync>) {
        let store = crate::data::sqlite::SqliteStore::init_for_test().await;
        let db = Arc::new(DbService::Sqlite(Arc::new(store)));
        let repo = db.repository();
        repo.create_channel(name, name, true).await.unwrap();
        let processor = Arc::new(Processor::new(repo.clone(), Arc::new(LiveBus::new())));
        (processor, repo)
    }

    fn event(channel: &str, username: &str) -> IngestEvent {
        IngestEvent {
            message: PrivmsgEvent {
                channel: channel.to_string(),
                username: username.to_string(),
                display_name: Some("Display".to_string()),
                text: "hi".to_string(),
                tags: HashMap::new(),
            },
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn untracked_channel_is_skipped_not_errored() {
        let (processor, _repo) = processor_with_channel("alpha").await;
        let stored = processor
            .process_batch(vec![event("unknown-channel", "u1")])
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn known_channel_creates_user_and_stores_message() {
        let (processor, repo) = processor_with_channel("alpha").await;
        let stored = processor
            .process_batch(vec![event("alpha", "newuser")])
            .await
            .unwrap();
        assert_eq!(stored, 1);

        let user = repo.get_user_by_username("newuser").await.unwrap().unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Display"));
        assert_eq!(user.total_messages, 1);
    }

    #[tokio::test]
    async fn repeated_batches_reuse_cached_identities() {
        let (processor, repo) = processor_with_channel("alpha").await;
        processor
            .process_batch(vec![event("alpha", "u1"), event("alpha", "u1")])
            .await
            .unwrap();

        let (_, count) = repo
            .list_users(&crate::data::types::ListUsersParams {
                query: None,
                page: crate::data::types::Page { page: 1, page_size: 20 },
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn invalidate_channel_forces_recheck() {
        let (processor, _repo) = processor_with_channel("alpha").await;
        processor.process_batch(vec![event("alpha", "u1")]).await.unwrap();
        processor.invalidate_channel("alpha");
        // Still resolves: the store row is untouched, just re-fetched.
        let stored = processor.process_batch(vec![event("alpha", "u1")]).await.unwrap();
        assert_eq!(stored, 1);
    }
}
