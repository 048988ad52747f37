//! PostgreSQL schema definitions
//!
//! Same shape as the SQLite schema, with a generated `tsvector` column and a
//! GIN index standing in for SQLite's FTS5 virtual table. Derived counters
//! are maintained by the repository layer inside the insert transaction, not
//! by triggers, mirroring the SQLite backend exactly.

pub const SCHEMA_VERSION: i32 = 1;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS channels (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL CHECK (
        length(name) >= 1 AND length(name) <= 25 AND name ~ '^[a-z0-9_]+$'
    ),
    display_name TEXT NOT NULL,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    retain_history_on_delete BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    last_message_at TIMESTAMPTZ,
    total_messages BIGINT NOT NULL DEFAULT 0,
    deleted_at TIMESTAMPTZ
);

-- Unique only among live channels, so a deleted (tombstoned) name can be reused.
CREATE UNIQUE INDEX IF NOT EXISTS idx_channels_name_unique ON channels(name) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_channels_enabled ON channels(enabled) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    username TEXT NOT NULL UNIQUE CHECK (length(username) >= 1),
    display_name TEXT,
    first_seen_at TIMESTAMPTZ NOT NULL,
    last_seen_at TIMESTAMPTZ NOT NULL,
    total_messages BIGINT NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);

CREATE TABLE IF NOT EXISTS messages (
    id BIGSERIAL PRIMARY KEY,
    channel_id BIGINT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
    user_id BIGINT NOT NULL REFERENCES users(id),
    text TEXT NOT NULL,
    sent_at TIMESTAMPTZ NOT NULL,
    tags JSONB NOT NULL DEFAULT '{}',
    text_search TSVECTOR GENERATED ALWAYS AS (to_tsvector('english', text)) STORED
);

CREATE INDEX IF NOT EXISTS idx_messages_channel_sent ON messages(channel_id, sent_at);
CREATE INDEX IF NOT EXISTS idx_messages_user_sent ON messages(user_id, sent_at);
CREATE INDEX IF NOT EXISTS idx_messages_id ON messages(id);
CREATE INDEX IF NOT EXISTS idx_messages_text_search ON messages USING GIN(text_search);
"#;
