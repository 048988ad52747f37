//! SQLite schema definitions
//!
//! Single version so far: channels/users/messages plus an FTS5 external-content
//! index over `messages.text`, kept current by insert-only triggers (message
//! rows are immutable and never updated). Derived counters are maintained by
//! the repository layer inside the insert transaction, not by triggers, so
//! the update logic is identical (and auditable) across both backends.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at INTEGER NOT NULL,
    description TEXT
);

-- =============================================================================
-- 1. Channels
-- =============================================================================
CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK(
        length(name) >= 1 AND length(name) <= 25 AND name GLOB '[a-z0-9_]*'
    ),
    display_name TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    retain_history_on_delete INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    last_message_at INTEGER,
    total_messages INTEGER NOT NULL DEFAULT 0,
    deleted_at INTEGER
);

-- Unique only among live channels, so a deleted (tombstoned) name can be reused.
CREATE UNIQUE INDEX IF NOT EXISTS idx_channels_name_unique ON channels(name) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_channels_enabled ON channels(enabled) WHERE deleted_at IS NULL;

-- =============================================================================
-- 2. Users
-- =============================================================================
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE CHECK(length(username) >= 1),
    display_name TEXT,
    first_seen_at INTEGER NOT NULL,
    last_seen_at INTEGER NOT NULL,
    total_messages INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);

-- =============================================================================
-- 3. Messages (immutable; a channel deleted with retain_history_on_delete
--    becomes a tombstone row rather than being removed, so channel_id stays
--    a real FK target even for archived history)
-- =============================================================================
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id),
    text TEXT NOT NULL,
    sent_at INTEGER NOT NULL,
    tags TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_messages_channel_sent ON messages(channel_id, sent_at);
CREATE INDEX IF NOT EXISTS idx_messages_user_sent ON messages(user_id, sent_at);
CREATE INDEX IF NOT EXISTS idx_messages_id ON messages(id);

-- =============================================================================
-- 4. Full-text search index (external content, insert-only maintenance)
-- =============================================================================
CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    text,
    content='messages',
    content_rowid='id',
    tokenize='unicode61'
);

CREATE TRIGGER IF NOT EXISTS messages_fts_ai AFTER INSERT ON messages BEGIN
    INSERT INTO messages_fts(rowid, text) VALUES (new.id, new.text);
END;

-- Messages are never updated, only inserted or cascade-deleted on channel
-- purge; external-content FTS5 tables require the special 'delete' command
-- form (passing the old row data) to drop the matching index entry.
CREATE TRIGGER IF NOT EXISTS messages_fts_ad AFTER DELETE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, text) VALUES ('delete', old.id, old.text);
END;
"#;
