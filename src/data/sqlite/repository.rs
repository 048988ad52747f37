//! SQLite implementations of the [`crate::data::traits`] repository traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::core::constants::{SEARCH_HIGHLIGHT_CLOSE, SEARCH_HIGHLIGHT_OPEN};
use crate::data::error::DataError;
use crate::data::traits::{ChannelRepo, MessageRepo, SearchRepo, UserRepo};
use crate::data::types::{
    Channel, ChannelUpdate, ListMessagesParams, ListUsersParams, Message, MessageSearchResult,
    MessageView, NewMessage, SearchMessagesParams, StoredMessage, User, UserProfile,
};
use crate::utils::sql::escape_like_pattern;

use super::SqliteStore;

fn row_to_channel(row: &sqlx::sqlite::SqliteRow) -> Channel {
    Channel {
        id: row.get("id"),
        name: row.get("name"),
        display_name: row.get("display_name"),
        enabled: row.get::<i64, _>("enabled") != 0,
        retain_history_on_delete: row.get::<i64, _>("retain_history_on_delete") != 0,
        created_at: nanos_to_datetime(row.get("created_at")),
        updated_at: nanos_to_datetime(row.get("updated_at")),
        last_message_at: row
            .get::<Option<i64>, _>("last_message_at")
            .map(nanos_to_datetime),
        total_messages: row.get("total_messages"),
        deleted_at: row
            .get::<Option<i64>, _>("deleted_at")
            .map(nanos_to_datetime),
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        first_seen_at: nanos_to_datetime(row.get("first_seen_at")),
        last_seen_at: nanos_to_datetime(row.get("last_seen_at")),
        total_messages: row.get("total_messages"),
    }
}

fn nanos_to_datetime(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

fn datetime_to_nanos(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_nanos_opt().unwrap_or(0)
}

#[async_trait]
impl ChannelRepo for SqliteStore {
    async fn create_channel(
        &self,
        name: &str,
        display_name: &str,
        enabled: bool,
    ) -> Result<Channel, DataError> {
        let now = datetime_to_nanos(Utc::now());
        let id = sqlx::query(
            "INSERT INTO channels (name, display_name, enabled, retain_history_on_delete, created_at, updated_at)
             VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(name)
        .bind(display_name)
        .bind(enabled as i64)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DataError::Conflict(format!("channel '{name}' already exists"))
            }
            other => DataError::from(other),
        })?
        .last_insert_rowid();

        self.get_channel_by_id(id)
            .await?
            .ok_or(DataError::NotFound)
    }

    async fn update_channel(
        &self,
        id: i64,
        update: &ChannelUpdate,
    ) -> Result<Option<Channel>, DataError> {
        let Some(existing) = self.get_channel_by_id(id).await? else {
            return Ok(None);
        };

        let display_name = update
            .display_name
            .clone()
            .unwrap_or(existing.display_name);
        let enabled = update.enabled.unwrap_or(existing.enabled);
        let retain_history_on_delete = update
            .retain_history_on_delete
            .unwrap_or(existing.retain_history_on_delete);
        let now = datetime_to_nanos(Utc::now());

        sqlx::query(
            "UPDATE channels SET display_name = ?, enabled = ?, retain_history_on_delete = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&display_name)
        .bind(enabled as i64)
        .bind(retain_history_on_delete as i64)
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;

        self.get_channel_by_id(id).await
    }

    async fn delete_channel(&self, id: i64, retain_history: bool) -> Result<bool, DataError> {
        if retain_history {
            let now = datetime_to_nanos(Utc::now());
            let result = sqlx::query(
                "UPDATE channels SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;
            return Ok(result.rows_affected() > 0);
        }

        // Messages cascade via the channel_id foreign key.
        let result = sqlx::query("DELETE FROM channels WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_channel_by_id(&self, id: i64) -> Result<Option<Channel>, DataError> {
        let row = sqlx::query("SELECT * FROM channels WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.as_ref().map(row_to_channel))
    }

    async fn get_channel_by_name(&self, name: &str) -> Result<Option<Channel>, DataError> {
        // Excludes tombstoned rows: a soft-deleted channel is not tracked,
        // and its name is free for a new channel to claim.
        let row = sqlx::query("SELECT * FROM channels WHERE name = ? AND deleted_at IS NULL")
            .bind(name)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.as_ref().map(row_to_channel))
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, DataError> {
        let rows = sqlx::query("SELECT * FROM channels WHERE deleted_at IS NULL ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(row_to_channel).collect())
    }

    async fn list_enabled_channels(&self) -> Result<Vec<Channel>, DataError> {
        let rows = sqlx::query(
            "SELECT * FROM channels WHERE enabled = 1 AND deleted_at IS NULL ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(row_to_channel).collect())
    }

    async fn channel_count(&self) -> Result<i64, DataError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM channels WHERE deleted_at IS NULL")
                .fetch_one(self.pool())
                .await?,
        )
    }

    async fn enabled_channel_count(&self) -> Result<i64, DataError> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM channels WHERE enabled = 1 AND deleted_at IS NULL",
        )
        .fetch_one(self.pool())
        .await?)
    }
}

#[async_trait]
impl UserRepo for SqliteStore {
    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, DataError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DataError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username.to_lowercase())
            .fetch_optional(self.pool())
            .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_or_create_user(
        &self,
        username: &str,
        display_name: Option<&str>,
    ) -> Result<User, DataError> {
        let username = username.to_lowercase();
        if let Some(existing) = self.get_user_by_username(&username).await? {
            return Ok(existing);
        }

        let now = datetime_to_nanos(Utc::now());
        let insert = sqlx::query(
            "INSERT INTO users (username, display_name, first_seen_at, last_seen_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(username) DO NOTHING",
        )
        .bind(&username)
        .bind(display_name)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        let id = if insert.rows_affected() > 0 {
            insert.last_insert_rowid()
        } else {
            0
        };

        if id != 0 {
            return self
                .get_user_by_id(id)
                .await?
                .ok_or(DataError::NotFound);
        }

        self.get_user_by_username(&username)
            .await?
            .ok_or(DataError::NotFound)
    }

    async fn list_users(&self, params: &ListUsersParams) -> Result<(Vec<User>, i64), DataError> {
        let (rows, total) = match &params.query {
            Some(q) => {
                let pattern = format!("%{}%", escape_like_pattern(q));
                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM users WHERE username LIKE ? ESCAPE '\\'",
                )
                .bind(&pattern)
                .fetch_one(self.pool())
                .await?;
                let rows = sqlx::query(
                    "SELECT * FROM users WHERE username LIKE ? ESCAPE '\\'
                     ORDER BY last_seen_at DESC LIMIT ? OFFSET ?",
                )
                .bind(&pattern)
                .bind(params.page.limit())
                .bind(params.page.offset())
                .fetch_all(self.pool())
                .await?;
                (rows, total)
            }
            None => {
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
                    .fetch_one(self.pool())
                    .await?;
                let rows = sqlx::query(
                    "SELECT * FROM users ORDER BY last_seen_at DESC LIMIT ? OFFSET ?",
                )
                .bind(params.page.limit())
                .bind(params.page.offset())
                .fetch_all(self.pool())
                .await?;
                (rows, total)
            }
        };
        Ok((rows.iter().map(row_to_user).collect(), total))
    }

    async fn user_count(&self) -> Result<i64, DataError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool())
            .await?)
    }
}

fn row_to_message_view(row: &sqlx::sqlite::SqliteRow) -> MessageView {
    MessageView {
        id: row.get("id"),
        channel_id: row.get("channel_id"),
        channel_name: row.get("channel_name"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        text: row.get("text"),
        sent_at: nanos_to_datetime(row.get("sent_at")),
    }
}

const MESSAGE_VIEW_SELECT: &str = "SELECT m.id, m.channel_id, c.name AS channel_name,
    m.user_id, u.username, u.display_name, m.text, m.sent_at
    FROM messages m
    JOIN users u ON u.id = m.user_id
    JOIN channels c ON c.id = m.channel_id";

/// Per-channel/per-user increments derived from a batch, applied as explicit
/// `UPDATE`s in the same transaction as the insert rather than via triggers,
/// so the update logic is identical across both backends.
struct CounterDeltas {
    channels: std::collections::HashMap<i64, (i64, i64)>,
    users: std::collections::HashMap<i64, (i64, i64)>,
}

fn counter_deltas(rows: &[NewMessage]) -> CounterDeltas {
    let mut channels: std::collections::HashMap<i64, (i64, i64)> = std::collections::HashMap::new();
    let mut users: std::collections::HashMap<i64, (i64, i64)> = std::collections::HashMap::new();
    for row in rows {
        let sent_at = datetime_to_nanos(row.sent_at);
        let c = channels.entry(row.channel_id).or_insert((0, i64::MIN));
        c.0 += 1;
        c.1 = c.1.max(sent_at);
        let u = users.entry(row.user_id).or_insert((0, i64::MIN));
        u.0 += 1;
        u.1 = u.1.max(sent_at);
    }
    CounterDeltas { channels, users }
}

#[async_trait]
impl MessageRepo for SqliteStore {
    async fn create_message(&self, row: &NewMessage) -> Result<Message, DataError> {
        let sent_at = datetime_to_nanos(row.sent_at);
        let mut tx = self.pool().begin().await?;

        let id = sqlx::query(
            "INSERT INTO messages (channel_id, user_id, text, sent_at, tags) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(row.channel_id)
        .bind(row.user_id)
        .bind(&row.text)
        .bind(sent_at)
        .bind(row.tags.to_string())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            "UPDATE channels SET total_messages = total_messages + 1, last_message_at = ? WHERE id = ?",
        )
        .bind(sent_at)
        .bind(row.channel_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE users SET total_messages = total_messages + 1, last_seen_at = ? WHERE id = ?",
        )
        .bind(sent_at)
        .bind(row.user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Message {
            id,
            channel_id: row.channel_id,
            user_id: row.user_id,
            text: row.text.clone(),
            sent_at: row.sent_at,
            tags: row.tags.clone(),
        })
    }

    async fn create_message_batch(
        &self,
        rows: &[NewMessage],
    ) -> Result<Vec<StoredMessage>, DataError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool().begin().await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let sent_at = datetime_to_nanos(row.sent_at);
            let id = sqlx::query(
                "INSERT INTO messages (channel_id, user_id, text, sent_at, tags) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(row.channel_id)
            .bind(row.user_id)
            .bind(&row.text)
            .bind(sent_at)
            .bind(row.tags.to_string())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
            ids.push(id);
        }

        let deltas = counter_deltas(rows);
        for (channel_id, (count, last_sent_at)) in &deltas.channels {
            sqlx::query(
                "UPDATE channels SET total_messages = total_messages + ?, last_message_at = ? WHERE id = ?",
            )
            .bind(count)
            .bind(last_sent_at)
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;
        }
        for (user_id, (count, last_sent_at)) in &deltas.users {
            sqlx::query(
                "UPDATE users SET total_messages = total_messages + ?, last_seen_at = ? WHERE id = ?",
            )
            .bind(count)
            .bind(last_sent_at)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let query = format!("{MESSAGE_VIEW_SELECT} WHERE m.id IN ({placeholders}) ORDER BY m.id");
        let mut q = sqlx::query(&query);
        for id in &ids {
            q = q.bind(id);
        }
        let fetched = q.fetch_all(self.pool()).await?;

        Ok(fetched
            .iter()
            .map(|r| StoredMessage {
                id: r.get("id"),
                channel_id: r.get("channel_id"),
                channel_name: r.get("channel_name"),
                user_id: r.get("user_id"),
                username: r.get("username"),
                display_name: r.get("display_name"),
                text: r.get("text"),
                sent_at: nanos_to_datetime(r.get("sent_at")),
            })
            .collect())
    }

    async fn get_recent_global(&self, limit: i64) -> Result<Vec<MessageView>, DataError> {
        let query = format!("{MESSAGE_VIEW_SELECT} ORDER BY m.id DESC LIMIT ?");
        let rows = sqlx::query(&query)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(row_to_message_view).collect())
    }

    async fn list_by_channel(
        &self,
        channel_id: i64,
        before_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageView>, DataError> {
        let rows = match before_id {
            Some(before) => {
                let query = format!(
                    "{MESSAGE_VIEW_SELECT} WHERE m.channel_id = ? AND m.id < ? ORDER BY m.id DESC LIMIT ?"
                );
                sqlx::query(&query)
                    .bind(channel_id)
                    .bind(before)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await?
            }
            None => {
                let query =
                    format!("{MESSAGE_VIEW_SELECT} WHERE m.channel_id = ? ORDER BY m.id DESC LIMIT ?");
                sqlx::query(&query)
                    .bind(channel_id)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await?
            }
        };
        Ok(rows.iter().map(row_to_message_view).collect())
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        channel_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageView>, DataError> {
        let rows = match channel_id {
            Some(cid) => {
                let query = format!(
                    "{MESSAGE_VIEW_SELECT} WHERE m.user_id = ? AND m.channel_id = ? ORDER BY m.id DESC LIMIT ?"
                );
                sqlx::query(&query)
                    .bind(user_id)
                    .bind(cid)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await?
            }
            None => {
                let query =
                    format!("{MESSAGE_VIEW_SELECT} WHERE m.user_id = ? ORDER BY m.id DESC LIMIT ?");
                sqlx::query(&query)
                    .bind(user_id)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await?
            }
        };
        Ok(rows.iter().map(row_to_message_view).collect())
    }

    async fn list_since(
        &self,
        after_id: i64,
        channel_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageView>, DataError> {
        let rows = match channel_id {
            Some(cid) => {
                let query = format!(
                    "{MESSAGE_VIEW_SELECT} WHERE m.id > ? AND m.channel_id = ? ORDER BY m.id ASC LIMIT ?"
                );
                sqlx::query(&query)
                    .bind(after_id)
                    .bind(cid)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await?
            }
            None => {
                let query =
                    format!("{MESSAGE_VIEW_SELECT} WHERE m.id > ? ORDER BY m.id ASC LIMIT ?");
                sqlx::query(&query)
                    .bind(after_id)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await?
            }
        };
        Ok(rows.iter().map(row_to_message_view).collect())
    }

    async fn total_message_count(&self) -> Result<i64, DataError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(self.pool())
            .await?)
    }
}

/// Split a raw search query into FTS5 MATCH terms: bare words become prefix
/// matches (`tok*`), double-quoted regions become phrase matches, and the
/// whole expression is an implicit AND.
fn compile_fts_query(query: &str) -> Option<String> {
    let mut terms = Vec::new();
    let mut chars = query.chars().peekable();
    let mut buf = String::new();

    while let Some(&c) = chars.peek() {
        if c == '"' {
            chars.next();
            let mut phrase = String::new();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                phrase.push(c);
            }
            let cleaned = phrase.replace('"', "");
            if !cleaned.trim().is_empty() {
                terms.push(format!("\"{}\"", cleaned.replace('"', "\"\"")));
            }
        } else if c.is_whitespace() {
            chars.next();
            if !buf.is_empty() {
                push_token(&mut terms, &buf);
                buf.clear();
            }
        } else {
            buf.push(c);
            chars.next();
        }
    }
    if !buf.is_empty() {
        push_token(&mut terms, &buf);
    }

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" AND "))
    }
}

fn push_token(terms: &mut Vec<String>, raw: &str) {
    let cleaned: String = raw.chars().filter(|c| c.is_alphanumeric()).collect();
    if !cleaned.is_empty() {
        terms.push(format!("{cleaned}*"));
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape `text`, then wrap every case-insensitive occurrence of any of
/// `needles` in `<mark>...</mark>`.
fn highlight(text: &str, needles: &[String]) -> String {
    let escaped = html_escape(text);
    if needles.is_empty() {
        return escaped;
    }

    // `to_lowercase()` is not byte-length-preserving per character (e.g.
    // 'İ' folds to "i̇", 2 bytes -> 3), so matches are found in a separate
    // case-folded buffer and mapped back onto `escaped`'s own char
    // boundaries rather than sliced directly out of a lowercased copy.
    let mut folded = String::with_capacity(escaped.len());
    let mut chunks: Vec<(usize, usize, usize)> = Vec::with_capacity(escaped.len());
    for (orig_start, ch) in escaped.char_indices() {
        let orig_end = orig_start + ch.len_utf8();
        let fold_start = folded.len();
        for lc in ch.to_lowercase() {
            folded.push(lc);
        }
        chunks.push((fold_start, orig_start, orig_end));
    }
    let chunk_at = |byte_idx: usize| -> usize {
        chunks.partition_point(|&(fs, _, _)| fs <= byte_idx).saturating_sub(1)
    };

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for needle in needles {
        let needle_lower = needle.to_lowercase();
        if needle_lower.is_empty() {
            continue;
        }
        let mut start = 0;
        while let Some(pos) = folded[start..].find(&needle_lower) {
            let abs_start = start + pos;
            let abs_end = abs_start + needle_lower.len();
            let orig_start = chunks[chunk_at(abs_start)].1;
            let orig_end = chunks[chunk_at(abs_end - 1)].2;
            ranges.push((orig_start, orig_end));
            start = abs_end;
        }
    }
    if ranges.is_empty() {
        return escaped;
    }
    ranges.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (s, e) in ranges {
        match merged.last_mut() {
            Some((_, last_e)) if s <= *last_e => {
                *last_e = (*last_e).max(e);
            }
            _ => merged.push((s, e)),
        }
    }

    let mut out = String::with_capacity(escaped.len() + merged.len() * 13);
    let mut cursor = 0;
    for (s, e) in merged {
        out.push_str(&escaped[cursor..s]);
        out.push_str(SEARCH_HIGHLIGHT_OPEN);
        out.push_str(&escaped[s..e]);
        out.push_str(SEARCH_HIGHLIGHT_CLOSE);
        cursor = e;
    }
    out.push_str(&escaped[cursor..]);
    out
}

fn filter_clause(filters: &crate::data::types::SearchFilters, prefix: &str) -> String {
    let mut clauses = Vec::new();
    if filters.channel_id.is_some() {
        clauses.push(format!("{prefix}channel_id = ?"));
    }
    if filters.user_id.is_some() {
        clauses.push(format!("{prefix}user_id = ?"));
    }
    if filters.start_time.is_some() {
        clauses.push(format!("{prefix}sent_at >= ?"));
    }
    if filters.end_time.is_some() {
        clauses.push(format!("{prefix}sent_at <= ?"));
    }
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" AND {}", clauses.join(" AND "))
    }
}

#[async_trait]
impl SearchRepo for SqliteStore {
    async fn search_messages(
        &self,
        params: &SearchMessagesParams,
    ) -> Result<(Vec<MessageSearchResult>, i64), DataError> {
        let needles: Vec<String> = params
            .query
            .split_whitespace()
            .map(|s| s.trim_matches('"').to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if self.search_indexed() {
            let Some(fts_query) = compile_fts_query(&params.query) else {
                return Ok((Vec::new(), 0));
            };
            let extra = filter_clause(&params.filters, "m.");

            let count_sql = format!(
                "SELECT COUNT(*) FROM messages_fts f JOIN messages m ON m.id = f.rowid
                 WHERE messages_fts MATCH ?{extra}"
            );
            let mut count_q = sqlx::query_scalar(&count_sql).bind(&fts_query);
            let f = &params.filters;
            if let Some(cid) = f.channel_id {
                count_q = count_q.bind(cid);
            }
            if let Some(uid) = f.user_id {
                count_q = count_q.bind(uid);
            }
            if let Some(start) = f.start_time {
                count_q = count_q.bind(datetime_to_nanos(start));
            }
            if let Some(end) = f.end_time {
                count_q = count_q.bind(datetime_to_nanos(end));
            }
            let total: i64 = count_q.fetch_one(self.pool()).await?;

            let sql = format!(
                "SELECT m.id, m.channel_id, c.name AS channel_name, m.user_id, u.username,
                        u.display_name, m.text, m.sent_at
                 FROM messages_fts f
                 JOIN messages m ON m.id = f.rowid
                 JOIN users u ON u.id = m.user_id
                 JOIN channels c ON c.id = m.channel_id
                 WHERE messages_fts MATCH ?{extra}
                 ORDER BY m.sent_at DESC, m.id DESC LIMIT ? OFFSET ?"
            );
            let mut q = sqlx::query(&sql).bind(&fts_query);
            if let Some(cid) = f.channel_id {
                q = q.bind(cid);
            }
            if let Some(uid) = f.user_id {
                q = q.bind(uid);
            }
            if let Some(start) = f.start_time {
                q = q.bind(datetime_to_nanos(start));
            }
            if let Some(end) = f.end_time {
                q = q.bind(datetime_to_nanos(end));
            }
            q = q.bind(params.page.limit()).bind(params.page.offset());
            let rows = q.fetch_all(self.pool()).await?;

            let results = rows
                .iter()
                .map(|r| {
                    let view = row_to_message_view(r);
                    let highlighted_text = highlight(&view.text, &needles);
                    MessageSearchResult {
                        message: view,
                        highlighted_text,
                    }
                })
                .collect();
            return Ok((results, total));
        }

        if needles.is_empty() {
            return Ok((Vec::new(), 0));
        }
        let pattern = format!("%{}%", escape_like_pattern(&params.query));
        let extra = filter_clause(&params.filters, "m.");
        let f = &params.filters;

        let count_sql =
            format!("SELECT COUNT(*) FROM messages m WHERE m.text LIKE ? ESCAPE '\\'{extra}");
        let mut count_q = sqlx::query_scalar(&count_sql).bind(&pattern);
        if let Some(cid) = f.channel_id {
            count_q = count_q.bind(cid);
        }
        if let Some(uid) = f.user_id {
            count_q = count_q.bind(uid);
        }
        if let Some(start) = f.start_time {
            count_q = count_q.bind(datetime_to_nanos(start));
        }
        if let Some(end) = f.end_time {
            count_q = count_q.bind(datetime_to_nanos(end));
        }
        let total: i64 = count_q.fetch_one(self.pool()).await?;

        let sql = format!(
            "{MESSAGE_VIEW_SELECT} WHERE m.text LIKE ? ESCAPE '\\'{extra} ORDER BY m.id DESC LIMIT ? OFFSET ?"
        );
        let mut q = sqlx::query(&sql).bind(&pattern);
        if let Some(cid) = f.channel_id {
            q = q.bind(cid);
        }
        if let Some(uid) = f.user_id {
            q = q.bind(uid);
        }
        if let Some(start) = f.start_time {
            q = q.bind(datetime_to_nanos(start));
        }
        if let Some(end) = f.end_time {
            q = q.bind(datetime_to_nanos(end));
        }
        q = q.bind(params.page.limit()).bind(params.page.offset());
        let rows = q.fetch_all(self.pool()).await?;

        let results = rows
            .iter()
            .map(|r| {
                let view = row_to_message_view(r);
                let highlighted_text = highlight(&view.text, &needles);
                MessageSearchResult {
                    message: view,
                    highlighted_text,
                }
            })
            .collect();
        Ok((results, total))
    }

    async fn list_messages(
        &self,
        params: &ListMessagesParams,
    ) -> Result<(Vec<MessageView>, i64), DataError> {
        let extra = filter_clause(&params.filters, "m.");
        let f = &params.filters;

        let count_sql = format!("SELECT COUNT(*) FROM messages m WHERE 1=1{extra}");
        let mut count_q = sqlx::query_scalar(&count_sql);
        if let Some(cid) = f.channel_id {
            count_q = count_q.bind(cid);
        }
        if let Some(uid) = f.user_id {
            count_q = count_q.bind(uid);
        }
        if let Some(start) = f.start_time {
            count_q = count_q.bind(datetime_to_nanos(start));
        }
        if let Some(end) = f.end_time {
            count_q = count_q.bind(datetime_to_nanos(end));
        }
        let total: i64 = count_q.fetch_one(self.pool()).await?;

        let sql = format!(
            "{MESSAGE_VIEW_SELECT} WHERE 1=1{extra} ORDER BY m.id DESC LIMIT ? OFFSET ?"
        );
        let mut q = sqlx::query(&sql);
        if let Some(cid) = f.channel_id {
            q = q.bind(cid);
        }
        if let Some(uid) = f.user_id {
            q = q.bind(uid);
        }
        if let Some(start) = f.start_time {
            q = q.bind(datetime_to_nanos(start));
        }
        if let Some(end) = f.end_time {
            q = q.bind(datetime_to_nanos(end));
        }
        q = q.bind(params.page.limit()).bind(params.page.offset());
        let rows = q.fetch_all(self.pool()).await?;

        Ok((rows.iter().map(row_to_message_view).collect(), total))
    }

    async fn get_user_profile(&self, username: &str, recent: i64) -> Result<UserProfile, DataError> {
        let user = self
            .get_user_by_username(username)
            .await?
            .ok_or(DataError::NotFound)?;
        let recent_messages = self.list_by_user(user.id, None, recent).await?;
        Ok(UserProfile {
            user,
            recent_messages,
        })
    }

    fn search_indexed(&self) -> bool {
        SqliteStore::search_indexed(self)
    }
}

#[cfg(test)]
mod highlight_tests {
    use super::*;

    #[test]
    fn wraps_case_insensitive_match() {
        let out = highlight("Hello World", &["hello".to_string()]);
        assert_eq!(out, "<mark>Hello</mark> World");
    }

    #[test]
    fn escapes_before_wrapping() {
        let out = highlight("<b>hello</b>", &["hello".to_string()]);
        assert_eq!(out, "&lt;b&gt;<mark>hello</mark>&lt;/b&gt;");
    }

    #[test]
    fn survives_case_folding_that_changes_byte_length() {
        // 'İ' (U+0130, 2 bytes in UTF-8) lowercases to "i̇" (3 bytes), so a
        // naive lowercase-then-slice approach desyncs byte offsets and can
        // panic or mis-highlight. The match on "hello" must still land
        // correctly despite the preceding multi-byte case fold.
        let out = highlight("İ hello", &["hello".to_string()]);
        assert_eq!(out, "İ <mark>hello</mark>");
    }

    #[test]
    fn no_match_returns_escaped_text_unchanged() {
        let out = highlight("just chatting", &["zzz".to_string()]);
        assert_eq!(out, "just chatting");
    }
}
