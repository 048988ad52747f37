//! Layered application configuration: defaults -> profile file -> local/CLI file -> CLI/env.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_HOST,
    DEFAULT_INGEST_BUFFER_SIZE, DEFAULT_PORT, DEFAULT_POSTGRES_PORT, DEFAULT_POSTGRES_SSLMODE,
};

/// Which transactional database backend is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DbBackend {
    #[default]
    Sqlite,
    Postgres,
}

impl fmt::Display for DbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbBackend::Sqlite => write!(f, "sqlite"),
            DbBackend::Postgres => write!(f, "postgres"),
        }
    }
}

/// How the chat client authenticates to Twitch IRC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Anonymous,
    Credentialed,
}

// =============================================================================
// File config (all-optional, mirrors the JSON config file shape)
// =============================================================================

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    pub backend: Option<DbBackend>,
    pub postgres_url: Option<String>,
    pub postgres_host: Option<String>,
    pub postgres_port: Option<u16>,
    pub postgres_user: Option<String>,
    pub postgres_password: Option<String>,
    pub postgres_database: Option<String>,
    pub postgres_sslmode: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct TwitchFileConfig {
    pub mode: Option<AuthMode>,
    pub username: Option<String>,
    pub token: Option<String>,
    pub channels: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct IngestFileConfig {
    pub batch_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
    pub buffer_size: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FeaturesFileConfig {
    pub search: Option<bool>,
    pub sse: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub database: Option<DatabaseFileConfig>,
    pub twitch: Option<TwitchFileConfig>,
    pub ingest: Option<IngestFileConfig>,
    pub features: Option<FeaturesFileConfig>,
    pub debug: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Later values win per top-level section; each section is taken wholesale rather
    /// than deep-merged field by field.
    fn merge(&mut self, other: Self) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.database.is_some() {
            self.database = other.database;
        }
        if other.twitch.is_some() {
            self.twitch = other.twitch;
        }
        if other.ingest.is_some() {
            self.ingest = other.ingest;
        }
        if other.features.is_some() {
            self.features = other.features;
        }
        if other.debug.is_some() {
            self.debug = other.debug;
        }
    }

    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra {
            for key in map.keys() {
                tracing::warn!(field = %key, "Unknown field in config file, ignoring");
            }
        }
    }
}

// =============================================================================
// Resolved config
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Resolved PostgreSQL connection parameters.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
}

impl PostgresConfig {
    /// Build from an explicit connection URL, or assemble one from the
    /// discrete host/port/user/password/database/sslmode fields.
    #[allow(clippy::too_many_arguments)]
    fn resolve(
        url: Option<String>,
        host: Option<String>,
        port: Option<u16>,
        user: Option<String>,
        password: Option<String>,
        database: Option<String>,
        sslmode: Option<String>,
    ) -> Option<Self> {
        if let Some(url) = url {
            return Some(Self { url });
        }
        let host = host?;
        let database = database?;
        let port = port.unwrap_or(DEFAULT_POSTGRES_PORT);
        let sslmode = sslmode.unwrap_or_else(|| DEFAULT_POSTGRES_SSLMODE.to_string());
        let auth = match (user, password) {
            (Some(u), Some(p)) => format!("{}:{}@", u, p),
            (Some(u), None) => format!("{}@", u),
            _ => String::new(),
        };
        Some(Self {
            url: format!(
                "postgres://{}{}:{}/{}?sslmode={}",
                auth, host, port, database, sslmode
            ),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DbBackend,
    pub postgres: Option<PostgresConfig>,
}

#[derive(Debug, Clone)]
pub struct TwitchConfig {
    pub mode: AuthMode,
    pub username: Option<String>,
    pub token: Option<String>,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub buffer_size: usize,
}

#[derive(Debug, Clone)]
pub struct FeaturesConfig {
    pub search: bool,
    pub sse: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub twitch: TwitchConfig,
    pub ingest: IngestConfig,
    pub features: FeaturesConfig,
    pub debug: bool,
}

impl AppConfig {
    /// Load configuration from all sources.
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.scrollback/scrollback.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path() {
            if profile_path.exists() {
                let profile_config = FileConfig::load_from_file(&profile_path)?;
                profile_config.warn_unknown_fields();
                file_config.merge(profile_config);
                found_configs.push(profile_path.display().to_string());
            }
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let file_server = file_config.server.unwrap_or_default();
        let file_database = file_config.database.unwrap_or_default();
        let file_twitch = file_config.twitch.unwrap_or_default();
        let file_ingest = file_config.ingest.unwrap_or_default();
        let file_features = file_config.features.unwrap_or_default();

        let host = cli
            .host
            .clone()
            .or(file_server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT);

        let backend = cli.db_backend.or(file_database.backend).unwrap_or_default();
        let postgres = PostgresConfig::resolve(
            cli.postgres_url.clone().or(file_database.postgres_url),
            cli.db_host.clone().or(file_database.postgres_host),
            cli.db_port.or(file_database.postgres_port),
            cli.db_user.clone().or(file_database.postgres_user),
            cli.db_password.clone().or(file_database.postgres_password),
            cli.db_name.clone().or(file_database.postgres_database),
            cli.db_sslmode.clone().or(file_database.postgres_sslmode),
        );
        if backend == DbBackend::Postgres && postgres.is_none() {
            anyhow::bail!(
                "postgres backend selected but no connection info supplied \
                 (set --postgres-url or --db-host/--db-name)"
            );
        }

        let channels = if !cli.channels.is_empty() {
            cli.channels.clone()
        } else {
            file_twitch.channels.unwrap_or_default()
        };

        let username = cli.twitch_username.clone().or(file_twitch.username);
        let token = cli.twitch_token.clone().or(file_twitch.token);
        let mode = cli.twitch_mode.or(file_twitch.mode).unwrap_or_else(|| {
            if username.is_some() && token.is_some() {
                AuthMode::Credentialed
            } else {
                AuthMode::Anonymous
            }
        });

        if mode == AuthMode::Anonymous && token.is_some() {
            anyhow::bail!(
                "a Twitch token was supplied but auth mode is anonymous; \
                 set twitch.mode=credentialed or drop the token"
            );
        }
        if mode == AuthMode::Credentialed && (username.is_none() || token.is_none()) {
            anyhow::bail!(
                "credentialed auth mode requires both twitch.username and twitch.token"
            );
        }

        let batch_size = cli
            .batch_size
            .or(file_ingest.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        let flush_interval_ms = cli
            .flush_interval_ms
            .or(file_ingest.flush_interval_ms)
            .unwrap_or(DEFAULT_FLUSH_INTERVAL_MS);
        let buffer_size = cli
            .ingest_buffer_size
            .or(file_ingest.buffer_size)
            .unwrap_or(DEFAULT_INGEST_BUFFER_SIZE);

        let search = cli.search.or(file_features.search).unwrap_or(true);
        let sse = cli.sse.or(file_features.sse).unwrap_or(true);
        let debug = cli.debug || file_config.debug.unwrap_or(false);

        Ok(AppConfig {
            server: ServerConfig { host, port },
            database: DatabaseConfig { backend, postgres },
            twitch: TwitchConfig {
                mode,
                username,
                token,
                channels,
            },
            ingest: IngestConfig {
                batch_size,
                flush_interval_ms,
                buffer_size,
            },
            features: FeaturesConfig { search, sse },
            debug,
        })
    }
}

/// Get the profile config path (~/.scrollback/scrollback.json)
fn get_profile_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Check if host binds to all network interfaces
pub fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_backend_serde() {
        let backend: DbBackend = serde_json::from_str(r#""postgres""#).unwrap();
        assert_eq!(backend, DbBackend::Postgres);
    }

    #[test]
    fn test_is_all_interfaces() {
        assert!(is_all_interfaces("0.0.0.0"));
        assert!(is_all_interfaces("::"));
        assert!(!is_all_interfaces("127.0.0.1"));
    }

    #[test]
    fn test_file_config_merge_overwrites_section() {
        let mut base = FileConfig::default();
        base.merge(FileConfig {
            server: Some(ServerFileConfig {
                host: Some("0.0.0.0".into()),
                port: Some(9000),
            }),
            ..Default::default()
        });
        assert_eq!(base.server.unwrap().port, Some(9000));
    }
}
