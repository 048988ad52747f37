//! Centralized constants: application identity, env var names, and tunable defaults.

// =============================================================================
// Application Identity
// =============================================================================

pub const APP_NAME: &str = "Scrollback";
pub const APP_NAME_LOWER: &str = "scrollback";
pub const APP_DOT_FOLDER: &str = ".scrollback";

// =============================================================================
// Configuration Files
// =============================================================================

pub const CONFIG_FILE_NAME: &str = "scrollback.json";
pub const ENV_CONFIG: &str = "SCROLLBACK_CONFIG";

// =============================================================================
// Logging / Debug
// =============================================================================

pub const ENV_LOG: &str = "SCROLLBACK_LOG";
pub const ENV_DEBUG: &str = "SCROLLBACK_DEBUG";

// =============================================================================
// Server
// =============================================================================

pub const ENV_HOST: &str = "SCROLLBACK_HOST";
pub const ENV_PORT: &str = "SCROLLBACK_PORT";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7373;

pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

// =============================================================================
// Storage
// =============================================================================

pub const ENV_DATA_DIR: &str = "SCROLLBACK_DATA_DIR";

// =============================================================================
// SQLite
// =============================================================================

pub const SQLITE_DB_FILENAME: &str = "scrollback.db";
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;
pub const SQLITE_CACHE_SIZE: &str = "-64000";
pub const SQLITE_WAL_AUTOCHECKPOINT: &str = "1000";
pub const SQLITE_CHECKPOINT_INTERVAL_SECS: u64 = 300;

// =============================================================================
// Database backend selection
// =============================================================================

pub const ENV_DB_BACKEND: &str = "SCROLLBACK_DB_BACKEND";
pub const ENV_POSTGRES_URL: &str = "SCROLLBACK_POSTGRES_URL";
pub const ENV_POSTGRES_HOST: &str = "SCROLLBACK_POSTGRES_HOST";
pub const ENV_POSTGRES_PORT: &str = "SCROLLBACK_POSTGRES_PORT";
pub const ENV_POSTGRES_USER: &str = "SCROLLBACK_POSTGRES_USER";
pub const ENV_POSTGRES_PASSWORD: &str = "SCROLLBACK_POSTGRES_PASSWORD";
pub const ENV_POSTGRES_DATABASE: &str = "SCROLLBACK_POSTGRES_DATABASE";
pub const ENV_POSTGRES_SSLMODE: &str = "SCROLLBACK_POSTGRES_SSLMODE";

pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_POSTGRES_SSLMODE: &str = "prefer";

pub const POSTGRES_MAX_CONNECTIONS: u32 = 10;
pub const POSTGRES_MIN_CONNECTIONS: u32 = 1;
pub const POSTGRES_ACQUIRE_TIMEOUT_SECS: u64 = 10;
pub const POSTGRES_IDLE_TIMEOUT_SECS: u64 = 300;
pub const POSTGRES_HEALTH_CHECK_INTERVAL_SECS: u64 = 300;

// =============================================================================
// Twitch connection
// =============================================================================

pub const TWITCH_IRC_HOST: &str = "irc.chat.twitch.tv";
pub const TWITCH_IRC_TLS_PORT: u16 = 6697;

pub const ENV_TWITCH_USERNAME: &str = "SCROLLBACK_TWITCH_USERNAME";
pub const ENV_TWITCH_TOKEN: &str = "SCROLLBACK_TWITCH_TOKEN";
pub const ENV_CHANNELS: &str = "SCROLLBACK_CHANNELS";

/// Reconnect backoff base delay in milliseconds.
pub const RECONNECT_BASE_DELAY_MS: u64 = 1_000;
/// Reconnect backoff cap.
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;
/// Consecutive-failure cap before holding indefinitely at the max delay.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 10;

// =============================================================================
// Ingestion
// =============================================================================

pub const ENV_BATCH_SIZE: &str = "SCROLLBACK_BATCH_SIZE";
pub const ENV_FLUSH_INTERVAL_MS: &str = "SCROLLBACK_FLUSH_INTERVAL_MS";
pub const ENV_INGEST_BUFFER_SIZE: &str = "SCROLLBACK_INGEST_BUFFER_SIZE";

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;
pub const DEFAULT_INGEST_BUFFER_SIZE: usize = 10_000;

/// Identity cache TTL and capacity (channel name/user login -> row id resolution).
pub const IDENTITY_CACHE_TTL_SECS: u64 = 300;
pub const IDENTITY_CACHE_CAPACITY: u64 = 50_000;

// =============================================================================
// Search
// =============================================================================

pub const ENV_SEARCH_ENABLED: &str = "SCROLLBACK_SEARCH_ENABLED";
pub const SEARCH_MAX_QUERY_LEN: usize = 256;
pub const SEARCH_HIGHLIGHT_OPEN: &str = "<mark>";
pub const SEARCH_HIGHLIGHT_CLOSE: &str = "</mark>";

// =============================================================================
// Live / SSE
// =============================================================================

pub const ENV_SSE_ENABLED: &str = "SCROLLBACK_SSE_ENABLED";
/// Per-subscriber bounded queue capacity; overflow closes the subscriber.
pub const SSE_SUBSCRIBER_QUEUE_CAPACITY: usize = 100;
pub const SSE_HEARTBEAT_INTERVAL_SECS: u64 = 15;
/// Maximum number of rows delivered as backfill before switching a subscriber to live-only.
pub const SSE_BACKFILL_MAX_ROWS: usize = 500;

// =============================================================================
// Pagination
// =============================================================================

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

// =============================================================================
// Graceful shutdown
// =============================================================================

pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
