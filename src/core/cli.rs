use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::{AuthMode, DbBackend};
use super::constants::{
    ENV_BATCH_SIZE, ENV_CHANNELS, ENV_CONFIG, ENV_DB_BACKEND, ENV_DEBUG, ENV_FLUSH_INTERVAL_MS,
    ENV_HOST, ENV_INGEST_BUFFER_SIZE, ENV_PORT, ENV_POSTGRES_DATABASE, ENV_POSTGRES_HOST,
    ENV_POSTGRES_PASSWORD, ENV_POSTGRES_PORT, ENV_POSTGRES_SSLMODE, ENV_POSTGRES_URL,
    ENV_POSTGRES_USER, ENV_SEARCH_ENABLED, ENV_SSE_ENABLED, ENV_TWITCH_TOKEN,
    ENV_TWITCH_USERNAME,
};

#[derive(Parser)]
#[command(name = "scrollback")]
#[command(version, about = "Self-hosted Twitch chat archiver", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Enable debug logging regardless of RUST_LOG
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Transactional database backend
    #[arg(long, global = true, env = ENV_DB_BACKEND, value_parser = parse_db_backend)]
    pub db_backend: Option<DbBackend>,

    /// PostgreSQL connection URL (when using the postgres backend); overrides the
    /// discrete db-host/db-port/... fields below when set
    #[arg(long, global = true, env = ENV_POSTGRES_URL)]
    pub postgres_url: Option<String>,

    /// PostgreSQL server host
    #[arg(long = "db-host", global = true, env = ENV_POSTGRES_HOST)]
    pub db_host: Option<String>,

    /// PostgreSQL server port
    #[arg(long = "db-port", global = true, env = ENV_POSTGRES_PORT)]
    pub db_port: Option<u16>,

    /// PostgreSQL user
    #[arg(long = "db-user", global = true, env = ENV_POSTGRES_USER)]
    pub db_user: Option<String>,

    /// PostgreSQL password
    #[arg(long = "db-password", global = true, env = ENV_POSTGRES_PASSWORD)]
    pub db_password: Option<String>,

    /// PostgreSQL database name
    #[arg(long = "db-name", global = true, env = ENV_POSTGRES_DATABASE)]
    pub db_name: Option<String>,

    /// PostgreSQL SSL mode (disable, prefer, require, ...)
    #[arg(long = "db-sslmode", global = true, env = ENV_POSTGRES_SSLMODE)]
    pub db_sslmode: Option<String>,

    /// Twitch IRC auth mode
    #[arg(long = "twitch-mode", global = true, value_parser = parse_auth_mode)]
    pub twitch_mode: Option<AuthMode>,

    /// Twitch username used for credentialed auth
    #[arg(long, global = true, env = ENV_TWITCH_USERNAME)]
    pub twitch_username: Option<String>,

    /// Twitch OAuth token (oauth:... form), used for credentialed auth
    #[arg(long, global = true, env = ENV_TWITCH_TOKEN)]
    pub twitch_token: Option<String>,

    /// Comma-separated list of channels to join at startup
    #[arg(long, global = true, value_delimiter = ',', env = ENV_CHANNELS)]
    pub channels: Vec<String>,

    /// Number of messages buffered per flush
    #[arg(long, global = true, env = ENV_BATCH_SIZE)]
    pub batch_size: Option<usize>,

    /// Maximum time between flushes in milliseconds
    #[arg(long, global = true, env = ENV_FLUSH_INTERVAL_MS)]
    pub flush_interval_ms: Option<u64>,

    /// Capacity of the bounded ingestion queue
    #[arg(long, global = true, env = ENV_INGEST_BUFFER_SIZE)]
    pub ingest_buffer_size: Option<usize>,

    /// Enable or disable full-text search indexing
    #[arg(long, global = true, env = ENV_SEARCH_ENABLED)]
    pub search: Option<bool>,

    /// Enable or disable the live SSE event bus
    #[arg(long, global = true, env = ENV_SSE_ENABLED)]
    pub sse: Option<bool>,
}

fn parse_db_backend(s: &str) -> Result<DbBackend, String> {
    match s.to_lowercase().as_str() {
        "sqlite" => Ok(DbBackend::Sqlite),
        "postgres" | "postgresql" => Ok(DbBackend::Postgres),
        _ => Err(format!(
            "Invalid database backend '{}'. Valid options: sqlite, postgres",
            s
        )),
    }
}

fn parse_auth_mode(s: &str) -> Result<AuthMode, String> {
    match s.to_lowercase().as_str() {
        "anonymous" => Ok(AuthMode::Anonymous),
        "credentialed" => Ok(AuthMode::Credentialed),
        _ => Err(format!(
            "Invalid auth mode '{}'. Valid options: anonymous, credentialed",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Run,
    /// Print the resolved configuration and exit
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigCommands {
    /// Print the resolved configuration as JSON
    Show,
    /// Print the path of the config file that would be used
    Path,
}

#[derive(Subcommand, Clone, Debug)]
pub enum DbCommands {
    /// Force a WAL checkpoint (sqlite only)
    Checkpoint,
}

/// Configuration derived from CLI arguments, pre-merge with file/env config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub debug: bool,
    pub config: Option<PathBuf>,
    pub db_backend: Option<DbBackend>,
    pub postgres_url: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
    pub db_sslmode: Option<String>,
    pub twitch_mode: Option<AuthMode>,
    pub twitch_username: Option<String>,
    pub twitch_token: Option<String>,
    pub channels: Vec<String>,
    pub batch_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
    pub ingest_buffer_size: Option<usize>,
    pub search: Option<bool>,
    pub sse: Option<bool>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        debug: cli.debug,
        config: cli.config,
        db_backend: cli.db_backend,
        postgres_url: cli.postgres_url,
        db_host: cli.db_host,
        db_port: cli.db_port,
        db_user: cli.db_user,
        db_password: cli.db_password,
        db_name: cli.db_name,
        db_sslmode: cli.db_sslmode,
        twitch_mode: cli.twitch_mode,
        twitch_username: cli.twitch_username,
        twitch_token: cli.twitch_token,
        channels: cli.channels,
        batch_size: cli.batch_size,
        flush_interval_ms: cli.flush_interval_ms,
        ingest_buffer_size: cli.ingest_buffer_size,
        search: cli.search,
        sse: cli.sse,
    };
    (config, cli.command)
}
