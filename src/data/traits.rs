//! Repository traits shared by the SQLite and PostgreSQL backends.
//!
//! Each backend implements [`ChannelRepo`], [`UserRepo`], [`MessageRepo`] and
//! [`SearchRepo`] with its own SQL dialect; [`Repository`] is the combined
//! capability set the rest of the application depends on, selected once at
//! startup via [`crate::data::DbService`].

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::types::{
    Channel, ChannelUpdate, ListMessagesParams, ListUsersParams, Message, MessageSearchResult,
    MessageView, NewMessage, SearchMessagesParams, StoredMessage, User, UserProfile,
};

/// Channel (tracked chat room) CRUD and lifecycle operations.
#[async_trait]
pub trait ChannelRepo: Send + Sync {
    async fn create_channel(
        &self,
        name: &str,
        display_name: &str,
        enabled: bool,
    ) -> Result<Channel, DataError>;

    async fn update_channel(
        &self,
        id: i64,
        update: &ChannelUpdate,
    ) -> Result<Option<Channel>, DataError>;

    /// Delete a channel. When `retain_history` is false, the row and its
    /// messages are removed outright (cascading). When true, the channel is
    /// soft-deleted (`deleted_at` set) rather than removed, so its id stays
    /// a valid foreign key target and archived messages remain readable.
    async fn delete_channel(&self, id: i64, retain_history: bool) -> Result<bool, DataError>;

    async fn get_channel_by_id(&self, id: i64) -> Result<Option<Channel>, DataError>;

    async fn get_channel_by_name(&self, name: &str) -> Result<Option<Channel>, DataError>;

    async fn list_channels(&self) -> Result<Vec<Channel>, DataError>;

    async fn list_enabled_channels(&self) -> Result<Vec<Channel>, DataError>;

    async fn channel_count(&self) -> Result<i64, DataError>;

    async fn enabled_channel_count(&self) -> Result<i64, DataError>;
}

/// Chat participant identity operations.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, DataError>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DataError>;

    /// Idempotent get-or-create keyed by lowercased username.
    async fn get_or_create_user(
        &self,
        username: &str,
        display_name: Option<&str>,
    ) -> Result<User, DataError>;

    async fn list_users(&self, params: &ListUsersParams) -> Result<(Vec<User>, i64), DataError>;

    async fn user_count(&self) -> Result<i64, DataError>;
}

/// Immutable message storage: single and batch insert, plus read paths that
/// don't require full-text search (see [`SearchRepo`] for that).
#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn create_message(&self, row: &NewMessage) -> Result<Message, DataError>;

    /// Insert `rows` as a single atomic unit: either all become visible, or
    /// none do. Returns the stored rows (with assigned ids) in insertion
    /// order, joined with channel/user identity for live-bus notification.
    async fn create_message_batch(
        &self,
        rows: &[NewMessage],
    ) -> Result<Vec<StoredMessage>, DataError>;

    async fn get_recent_global(&self, limit: i64) -> Result<Vec<MessageView>, DataError>;

    async fn list_by_channel(
        &self,
        channel_id: i64,
        before_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageView>, DataError>;

    async fn list_by_user(
        &self,
        user_id: i64,
        channel_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageView>, DataError>;

    /// Messages with `id > after_id`, ascending, for live-subscriber backfill.
    async fn list_since(
        &self,
        after_id: i64,
        channel_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageView>, DataError>;

    async fn total_message_count(&self) -> Result<i64, DataError>;
}

/// Full-text and substring search plus the list/profile read paths the
/// search UI composes with.
#[async_trait]
pub trait SearchRepo: Send + Sync {
    async fn search_messages(
        &self,
        params: &SearchMessagesParams,
    ) -> Result<(Vec<MessageSearchResult>, i64), DataError>;

    async fn list_messages(
        &self,
        params: &ListMessagesParams,
    ) -> Result<(Vec<MessageView>, i64), DataError>;

    async fn get_user_profile(&self, username: &str, recent: i64) -> Result<UserProfile, DataError>;

    /// Whether this backend is running with the indexed (FTS) search path
    /// active, vs. the substring fallback.
    fn search_indexed(&self) -> bool;
}

/// Combined capability set implemented by each backend and exposed through
/// [`crate::data::DbService::repository`] as a boxed trait object.
pub trait Repository: ChannelRepo + UserRepo + MessageRepo + SearchRepo {}

impl<T: ChannelRepo + UserRepo + MessageRepo + SearchRepo> Repository for T {}
