//! PostgreSQL implementations of the [`crate::data::traits`] repository traits.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use crate::core::constants::{SEARCH_HIGHLIGHT_CLOSE, SEARCH_HIGHLIGHT_OPEN};
use crate::data::error::DataError;
use crate::data::traits::{ChannelRepo, MessageRepo, SearchRepo, UserRepo};
use crate::data::types::{
    Channel, ChannelUpdate, ListMessagesParams, ListUsersParams, Message, MessageSearchResult,
    MessageView, NewMessage, SearchMessagesParams, StoredMessage, User, UserProfile,
};
use crate::utils::sql::escape_like_pattern;

use super::PostgresStore;

fn row_to_channel(row: &sqlx::postgres::PgRow) -> Channel {
    Channel {
        id: row.get("id"),
        name: row.get("name"),
        display_name: row.get("display_name"),
        enabled: row.get("enabled"),
        retain_history_on_delete: row.get("retain_history_on_delete"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_message_at: row.get("last_message_at"),
        total_messages: row.get("total_messages"),
        deleted_at: row.get("deleted_at"),
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        first_seen_at: row.get("first_seen_at"),
        last_seen_at: row.get("last_seen_at"),
        total_messages: row.get("total_messages"),
    }
}

#[async_trait]
impl ChannelRepo for PostgresStore {
    async fn create_channel(
        &self,
        name: &str,
        display_name: &str,
        enabled: bool,
    ) -> Result<Channel, DataError> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO channels (name, display_name, enabled, retain_history_on_delete, created_at, updated_at)
             VALUES ($1, $2, $3, FALSE, $4, $4)
             RETURNING *",
        )
        .bind(name)
        .bind(display_name)
        .bind(enabled)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DataError::Conflict(format!("channel '{name}' already exists"))
            }
            other => DataError::from_postgres(other),
        })?;

        Ok(row_to_channel(&row))
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

        sqlx::query(
            "UPDATE channels SET display_name = $1, enabled = $2, retain_history_on_delete = $3, updated_at = $4
             WHERE id = $5",
        )
        .bind(&display_name)
        .bind(enabled)
        .bind(retain_history_on_delete)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(DataError::from_postgres)?;

        self.get_channel_by_id(id).await
    }

    async fn delete_channel(&self, id: i64, retain_history: bool) -> Result<bool, DataError> {
        if retain_history {
            let now = Utc::now();
            let result = sqlx::query(
                "UPDATE channels SET deleted_at = $1, updated_at = $1 WHERE id = $2 AND deleted_at IS NULL",
            )
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(DataError::from_postgres)?;
            return Ok(result.rows_affected() > 0);
        }

        // Messages cascade via the channel_id foreign key.
        let result = sqlx::query("DELETE FROM channels WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(DataError::from_postgres)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_channel_by_id(&self, id: i64) -> Result<Option<Channel>, DataError> {
        let row = sqlx::query("SELECT * FROM channels WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(DataError::from_postgres)?;
        Ok(row.as_ref().map(row_to_channel))
    }

    async fn get_channel_by_name(&self, name: &str) -> Result<Option<Channel>, DataError> {
        // Excludes tombstoned rows: a soft-deleted channel is not tracked,
        // and its name is free for a new channel to claim.
        let row = sqlx::query("SELECT * FROM channels WHERE name = $1 AND deleted_at IS NULL")
            .bind(name)
            .fetch_optional(self.pool())
            .await
            .map_err(DataError::from_postgres)?;
        Ok(row.as_ref().map(row_to_channel))
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, DataError> {
        let rows = sqlx::query("SELECT * FROM channels WHERE deleted_at IS NULL ORDER BY name")
            .fetch_all(self.pool())
            .await
            .map_err(DataError::from_postgres)?;
        Ok(rows.iter().map(row_to_channel).collect())
    }

    async fn list_enabled_channels(&self) -> Result<Vec<Channel>, DataError> {
        let rows = sqlx::query(
            "SELECT * FROM channels WHERE enabled = TRUE AND deleted_at IS NULL ORDER BY name",
        )
        .fetch_all(self.pool())
        .await
        .map_err(DataError::from_postgres)?;
        Ok(rows.iter().map(row_to_channel).collect())
    }

    async fn channel_count(&self) -> Result<i64, DataError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM channels WHERE deleted_at IS NULL")
                .fetch_one(self.pool())
                .await
                .map_err(DataError::from_postgres)?,
        )
    }

    async fn enabled_channel_count(&self) -> Result<i64, DataError> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM channels WHERE enabled = TRUE AND deleted_at IS NULL",
        )
        .fetch_one(self.pool())
        .await
        .map_err(DataError::from_postgres)?)
    }
}

#[async_trait]
impl UserRepo for PostgresStore {
    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, DataError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(DataError::from_postgres)?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DataError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = $1")
            .bind(username.to_lowercase())
            .fetch_optional(self.pool())
            .await
            .map_err(DataError::from_postgres)?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_or_create_user(
        &self,
        username: &str,
        display_name: Option<&str>,
    ) -> Result<User, DataError> {
        let username = username.to_lowercase();
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO users (username, display_name, first_seen_at, last_seen_at)
             VALUES ($1, $2, $3, $3)
             ON CONFLICT (username) DO UPDATE SET username = EXCLUDED.username
             RETURNING *",
        )
        .bind(&username)
        .bind(display_name)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(DataError::from_postgres)?;
        Ok(row_to_user(&row))
    }

    async fn list_users(&self, params: &ListUsersParams) -> Result<(Vec<User>, i64), DataError> {
        let (rows, total) = match &params.query {
            Some(q) => {
                let pattern = format!("%{}%", escape_like_pattern(q));
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username LIKE $1")
                        .bind(&pattern)
                        .fetch_one(self.pool())
                        .await
                        .map_err(DataError::from_postgres)?;
                let rows = sqlx::query(
                    "SELECT * FROM users WHERE username LIKE $1
                     ORDER BY last_seen_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(&pattern)
                .bind(params.page.limit())
                .bind(params.page.offset())
                .fetch_all(self.pool())
                .await
                .map_err(DataError::from_postgres)?;
                (rows, total)
            }
            None => {
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
                    .fetch_one(self.pool())
                    .await
                    .map_err(DataError::from_postgres)?;
                let rows = sqlx::query(
                    "SELECT * FROM users ORDER BY last_seen_at DESC LIMIT $1 OFFSET $2",
                )
                .bind(params.page.limit())
                .bind(params.page.offset())
                .fetch_all(self.pool())
                .await
                .map_err(DataError::from_postgres)?;
                (rows, total)
            }
        };
        Ok((rows.iter().map(row_to_user).collect(), total))
    }

    async fn user_count(&self) -> Result<i64, DataError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool())
            .await
            .map_err(DataError::from_postgres)?)
    }
}

fn row_to_message_view(row: &sqlx::postgres::PgRow) -> MessageView {
    MessageView {
        id: row.get("id"),
        channel_id: row.get("channel_id"),
        channel_name: row.get("channel_name"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        text: row.get("text"),
        sent_at: row.get("sent_at"),
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
    channels: std::collections::HashMap<i64, (i64, chrono::DateTime<Utc>)>,
    users: std::collections::HashMap<i64, (i64, chrono::DateTime<Utc>)>,
}

fn counter_deltas(rows: &[NewMessage]) -> CounterDeltas {
    let mut channels: std::collections::HashMap<i64, (i64, chrono::DateTime<Utc>)> =
        std::collections::HashMap::new();
    let mut users: std::collections::HashMap<i64, (i64, chrono::DateTime<Utc>)> =
        std::collections::HashMap::new();
    for row in rows {
        let c = channels
            .entry(row.channel_id)
            .or_insert((0, row.sent_at));
        c.0 += 1;
        c.1 = c.1.max(row.sent_at);
        let u = users.entry(row.user_id).or_insert((0, row.sent_at));
        u.0 += 1;
        u.1 = u.1.max(row.sent_at);
    }
    CounterDeltas { channels, users }
}

#[async_trait]
impl MessageRepo for PostgresStore {
    async fn create_message(&self, row: &NewMessage) -> Result<Message, DataError> {
        let mut tx = self.pool().begin().await.map_err(DataError::from_postgres)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO messages (channel_id, user_id, text, sent_at, tags) VALUES ($1, $2, $3, $4, $5::jsonb) RETURNING id",
        )
        .bind(row.channel_id)
        .bind(row.user_id)
        .bind(&row.text)
        .bind(row.sent_at)
        .bind(row.tags.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(DataError::from_postgres)?;

        sqlx::query(
            "UPDATE channels SET total_messages = total_messages + 1, last_message_at = $1 WHERE id = $2",
        )
        .bind(row.sent_at)
        .bind(row.channel_id)
        .execute(&mut *tx)
        .await
        .map_err(DataError::from_postgres)?;
        sqlx::query(
            "UPDATE users SET total_messages = total_messages + 1, last_seen_at = $1 WHERE id = $2",
        )
        .bind(row.sent_at)
        .bind(row.user_id)
        .execute(&mut *tx)
        .await
        .map_err(DataError::from_postgres)?;

        tx.commit().await.map_err(DataError::from_postgres)?;

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

        let mut tx = self.pool().begin().await.map_err(DataError::from_postgres)?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO messages (channel_id, user_id, text, sent_at, tags) VALUES ($1, $2, $3, $4, $5::jsonb) RETURNING id",
            )
            .bind(row.channel_id)
            .bind(row.user_id)
            .bind(&row.text)
            .bind(row.sent_at)
            .bind(row.tags.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(DataError::from_postgres)?;
            ids.push(id);
        }

        let deltas = counter_deltas(rows);
        for (channel_id, (count, last_sent_at)) in &deltas.channels {
            sqlx::query(
                "UPDATE channels SET total_messages = total_messages + $1, last_message_at = $2 WHERE id = $3",
            )
            .bind(count)
            .bind(last_sent_at)
            .bind(channel_id)
            .execute(&mut *tx)
            .await
            .map_err(DataError::from_postgres)?;
        }
        for (user_id, (count, last_sent_at)) in &deltas.users {
            sqlx::query(
                "UPDATE users SET total_messages = total_messages + $1, last_seen_at = $2 WHERE id = $3",
            )
            .bind(count)
            .bind(last_sent_at)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(DataError::from_postgres)?;
        }

        tx.commit().await.map_err(DataError::from_postgres)?;

        let query = format!("{MESSAGE_VIEW_SELECT} WHERE m.id = ANY($1) ORDER BY m.id");
        let rows = sqlx::query(&query)
            .bind(&ids)
            .fetch_all(self.pool())
            .await
            .map_err(DataError::from_postgres)?;

        Ok(rows
            .iter()
            .map(|r| StoredMessage {
                id: r.get("id"),
                channel_id: r.get("channel_id"),
                channel_name: r.get("channel_name"),
                user_id: r.get("user_id"),
                username: r.get("username"),
                display_name: r.get("display_name"),
                text: r.get("text"),
                sent_at: r.get("sent_at"),
            })
            .collect())
    }

    async fn get_recent_global(&self, limit: i64) -> Result<Vec<MessageView>, DataError> {
        let query = format!("{MESSAGE_VIEW_SELECT} ORDER BY m.id DESC LIMIT $1");
        let rows = sqlx::query(&query)
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(DataError::from_postgres)?;
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
                    "{MESSAGE_VIEW_SELECT} WHERE m.channel_id = $1 AND m.id < $2 ORDER BY m.id DESC LIMIT $3"
                );
                sqlx::query(&query)
                    .bind(channel_id)
                    .bind(before)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await
                    .map_err(DataError::from_postgres)?
            }
            None => {
                let query = format!(
                    "{MESSAGE_VIEW_SELECT} WHERE m.channel_id = $1 ORDER BY m.id DESC LIMIT $2"
                );
                sqlx::query(&query)
                    .bind(channel_id)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await
                    .map_err(DataError::from_postgres)?
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
                    "{MESSAGE_VIEW_SELECT} WHERE m.user_id = $1 AND m.channel_id = $2 ORDER BY m.id DESC LIMIT $3"
                );
                sqlx::query(&query)
                    .bind(user_id)
                    .bind(cid)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await
                    .map_err(DataError::from_postgres)?
            }
            None => {
                let query =
                    format!("{MESSAGE_VIEW_SELECT} WHERE m.user_id = $1 ORDER BY m.id DESC LIMIT $2");
                sqlx::query(&query)
                    .bind(user_id)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await
                    .map_err(DataError::from_postgres)?
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
                    "{MESSAGE_VIEW_SELECT} WHERE m.id > $1 AND m.channel_id = $2 ORDER BY m.id ASC LIMIT $3"
                );
                sqlx::query(&query)
                    .bind(after_id)
                    .bind(cid)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await
                    .map_err(DataError::from_postgres)?
            }
            None => {
                let query =
                    format!("{MESSAGE_VIEW_SELECT} WHERE m.id > $1 ORDER BY m.id ASC LIMIT $2");
                sqlx::query(&query)
                    .bind(after_id)
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await
                    .map_err(DataError::from_postgres)?
            }
        };
        Ok(rows.iter().map(row_to_message_view).collect())
    }

    async fn total_message_count(&self) -> Result<i64, DataError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(self.pool())
            .await
            .map_err(DataError::from_postgres)?)
    }
}

/// Translate a raw search query into a `to_tsquery`-compatible expression:
/// bare words become prefix matches (`tok:*`), quoted regions become
/// `phraseto_tsquery`-style phrases, joined with `&`.
fn compile_tsquery(query: &str) -> Option<String> {
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
            let words: Vec<String> = phrase
                .split_whitespace()
                .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
                .filter(|w| !w.is_empty())
                .collect();
            if !words.is_empty() {
                terms.push(format!("({})", words.join(" <-> ")));
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
        Some(terms.join(" & "))
    }
}

fn push_token(terms: &mut Vec<String>, raw: &str) {
    let cleaned: String = raw.chars().filter(|c| c.is_alphanumeric()).collect();
    if !cleaned.is_empty() {
        terms.push(format!("{cleaned}:*"));
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

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

fn filter_clause(filters: &crate::data::types::SearchFilters, start_idx: usize) -> (String, usize) {
    let mut clauses = Vec::new();
    let mut idx = start_idx;
    if filters.channel_id.is_some() {
        clauses.push(format!("m.channel_id = ${idx}"));
        idx += 1;
    }
    if filters.user_id.is_some() {
        clauses.push(format!("m.user_id = ${idx}"));
        idx += 1;
    }
    if filters.start_time.is_some() {
        clauses.push(format!("m.sent_at >= ${idx}"));
        idx += 1;
    }
    if filters.end_time.is_some() {
        clauses.push(format!("m.sent_at <= ${idx}"));
        idx += 1;
    }
    if clauses.is_empty() {
        (String::new(), idx)
    } else {
        (format!(" AND {}", clauses.join(" AND ")), idx)
    }
}

macro_rules! bind_filter_values {
    ($q:expr, $f:expr) => {{
        let mut q = $q;
        if let Some(cid) = $f.channel_id {
            q = q.bind(cid);
        }
        if let Some(uid) = $f.user_id {
            q = q.bind(uid);
        }
        if let Some(start) = $f.start_time {
            q = q.bind(start);
        }
        if let Some(end) = $f.end_time {
            q = q.bind(end);
        }
        q
    }};
}

#[async_trait]
impl SearchRepo for PostgresStore {
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
            let Some(tsquery) = compile_tsquery(&params.query) else {
                return Ok((Vec::new(), 0));
            };
            let (extra, next_idx) = filter_clause(&params.filters, 2);

            let count_sql = format!(
                "SELECT COUNT(*) FROM messages m WHERE m.text_search @@ to_tsquery('english', $1){extra}"
            );
            let count_q = sqlx::query_scalar(&count_sql).bind(&tsquery);
            let count_q = bind_filter_values!(count_q, &params.filters);
            let total: i64 = count_q.fetch_one(self.pool()).await.map_err(DataError::from_postgres)?;

            let limit_idx = next_idx;
            let offset_idx = next_idx + 1;
            let sql = format!(
                "{MESSAGE_VIEW_SELECT} WHERE m.text_search @@ to_tsquery('english', $1){extra}
                 ORDER BY m.sent_at DESC, m.id DESC
                 LIMIT ${limit_idx} OFFSET ${offset_idx}"
            );
            let q = sqlx::query(&sql).bind(&tsquery);
            let q = bind_filter_values!(q, &params.filters);
            let q = q.bind(params.page.limit()).bind(params.page.offset());
            let rows = q.fetch_all(self.pool()).await.map_err(DataError::from_postgres)?;

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
        let (extra, next_idx) = filter_clause(&params.filters, 2);

        let count_sql = format!("SELECT COUNT(*) FROM messages m WHERE m.text LIKE $1{extra}");
        let count_q = sqlx::query_scalar(&count_sql).bind(&pattern);
        let count_q = bind_filter_values!(count_q, &params.filters);
        let total: i64 = count_q.fetch_one(self.pool()).await.map_err(DataError::from_postgres)?;

        let limit_idx = next_idx;
        let offset_idx = next_idx + 1;
        let sql = format!(
            "{MESSAGE_VIEW_SELECT} WHERE m.text LIKE $1{extra} ORDER BY m.id DESC LIMIT ${limit_idx} OFFSET ${offset_idx}"
        );
        let q = sqlx::query(&sql).bind(&pattern);
        let q = bind_filter_values!(q, &params.filters);
        let q = q.bind(params.page.limit()).bind(params.page.offset());
        let rows = q.fetch_all(self.pool()).await.map_err(DataError::from_postgres)?;

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
        let (extra, next_idx) = filter_clause(&params.filters, 1);

        let count_sql = format!("SELECT COUNT(*) FROM messages m WHERE TRUE{extra}");
        let count_q = sqlx::query_scalar(&count_sql);
        let count_q = bind_filter_values!(count_q, &params.filters);
        let total: i64 = count_q.fetch_one(self.pool()).await.map_err(DataError::from_postgres)?;

        let limit_idx = next_idx;
        let offset_idx = next_idx + 1;
        let sql = format!(
            "{MESSAGE_VIEW_SELECT} WHERE TRUE{extra} ORDER BY m.id DESC LIMIT ${limit_idx} OFFSET ${offset_idx}"
        );
        let q = sqlx::query(&sql);
        let q = bind_filter_values!(q, &params.filters);
        let q = q.bind(params.page.limit()).bind(params.page.offset());
        let rows = q.fetch_all(self.pool()).await.map_err(DataError::from_postgres)?;

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
        PostgresStore::search_indexed(self)
    }
}
