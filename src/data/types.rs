//! Shared row and query types used by both database backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked chat room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub enabled: bool,
    pub retain_history_on_delete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub total_messages: i64,
    /// Set when the channel was deleted with history retained. A tombstoned
    /// channel is excluded from listings and name resolution but its id
    /// remains a valid foreign key target for archived messages.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A chat participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub total_messages: i64,
}

/// An immutable stored chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: i64,
    pub channel_id: i64,
    pub user_id: i64,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub tags: serde_json::Value,
}

/// A message joined with its channel and user identity, as returned to HTTP callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageView {
    pub id: i64,
    pub channel_id: i64,
    pub channel_name: String,
    pub user_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// A message view with an optional search-highlighted text field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageSearchResult {
    #[serde(flatten)]
    pub message: MessageView,
    pub highlighted_text: String,
}

/// Input row for a batch insert: resolved identities plus raw content.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub channel_id: i64,
    pub user_id: i64,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub tags: serde_json::Value,
}

/// Result of a committed batch insert, used to build live-bus notifications.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub channel_id: i64,
    pub channel_name: String,
    pub user_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// Values to update on an existing channel row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelUpdate {
    pub display_name: Option<String>,
    pub enabled: Option<bool>,
    pub retain_history_on_delete: Option<bool>,
}

// =============================================================================
// Pagination
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        ((self.page - 1) as i64) * (self.page_size as i64)
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub page_size: u32,
    pub total_count: i64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: Page, total_count: i64) -> Self {
        let total_pages = if total_count == 0 {
            0
        } else {
            total_count.div_ceil(page.page_size as i64) as u32
        };
        Self {
            page: page.page,
            page_size: page.page_size,
            total_count,
            total_pages,
            has_next: (page.page as i64) < total_pages as i64,
            has_prev: page.page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

// =============================================================================
// Query params
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub channel_id: Option<i64>,
    pub user_id: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SearchMessagesParams {
    pub query: String,
    pub filters: SearchFilters,
    pub page: Page,
}

#[derive(Debug, Clone)]
pub struct ListMessagesParams {
    pub filters: SearchFilters,
    pub page: Page,
}

#[derive(Debug, Clone)]
pub struct ListUsersParams {
    pub query: Option<String>,
    pub page: Page,
}

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user: User,
    pub recent_messages: Vec<MessageView>,
}
