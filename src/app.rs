//! Core application: wires configuration, storage, the chat protocol client,
//! the ingestion pipeline, the live event bus, and the HTTP surface together,
//! then drives startup/shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::api::ApiServer;
use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands, ConfigCommands, DbCommands};
use crate::core::config::AppConfig;
use crate::core::constants::ENV_LOG;
use crate::core::shutdown::ShutdownService;
use crate::core::storage::AppStorage;
use crate::data::DbService;
use crate::domain::bus::LiveBus;
use crate::domain::ingest::IngestPipeline;
use crate::domain::processor::Processor;
use crate::domain::protocol::ChatClient;

/// The assembled, running application: every long-lived component plus the
/// shutdown coordinator that sequences their teardown.
pub struct CoreApp {
    pub config: AppConfig,
    pub shutdown: ShutdownService,
    pub database: Arc<DbService>,
    pub bus: Arc<LiveBus>,
    pub processor: Arc<Processor>,
    data_dir: String,
    chat_client: Arc<ChatClient>,
}

impl CoreApp {
    /// Parse CLI arguments/env, dispatch subcommands, and run the server.
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();

        let (cli_config, command) = cli::parse();
        Self::init_logging(cli_config.debug);
        tracing::debug!("scrollback starting");

        match command {
            Some(Commands::Config { command }) => return Self::handle_config_command(command, &cli_config),
            Some(Commands::Db { command }) => return Self::handle_db_command(command, &cli_config).await,
            Some(Commands::Run) | None => {}
        }

        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let storage = AppStorage::init()
            .await
            .context("failed to initialize data directory")?;
        let data_dir = storage.data_dir().display().to_string();

        let database = Arc::new(
            DbService::init(
                config.database.backend,
                &storage,
                config.database.postgres.as_ref(),
                config.features.search,
            )
            .await
            .context("failed to initialize database")?,
        );

        let bus = Arc::new(LiveBus::new());
        let processor = Arc::new(Processor::new(database.repository(), bus.clone()));
        let shutdown = ShutdownService::new(bus.clone(), database.clone());

        let checkpoint_handle = database.start_checkpoint_task(shutdown.subscribe());
        shutdown.register(checkpoint_handle).await;

        let (pipeline, ingest_handle) = IngestPipeline::start(
            config.ingest.buffer_size,
            config.ingest.batch_size,
            Duration::from_millis(config.ingest.flush_interval_ms),
            processor.clone(),
            shutdown.subscribe(),
        );
        shutdown.register(ingest_handle).await;

        let chat_client = Arc::new(ChatClient::new(config.twitch.clone(), Arc::new(pipeline)));

        Ok(Self {
            config,
            shutdown,
            database,
            bus,
            processor,
            data_dir,
            chat_client,
        })
    }

    fn handle_config_command(command: ConfigCommands, cli: &CliConfig) -> Result<()> {
        let config = AppConfig::load(cli)?;
        match command {
            ConfigCommands::Show => {
                println!("server: {}:{}", config.server.host, config.server.port);
                println!("database backend: {}", config.database.backend);
                println!("twitch mode: {:?}", config.twitch.mode);
                println!("twitch channels: {}", config.twitch.channels.join(", "));
                println!(
                    "ingest: batch_size={} flush_interval_ms={} buffer_size={}",
                    config.ingest.batch_size, config.ingest.flush_interval_ms, config.ingest.buffer_size
                );
                println!(
                    "features: search={} sse={}",
                    config.features.search, config.features.sse
                );
            }
            ConfigCommands::Path => {
                println!("{}", AppStorage::resolve_data_dir().display());
            }
        }
        Ok(())
    }

    async fn handle_db_command(command: DbCommands, cli: &CliConfig) -> Result<()> {
        let config = AppConfig::load(cli)?;
        let storage = AppStorage::init().await?;
        let database = DbService::init(
            config.database.backend,
            &storage,
            config.database.postgres.as_ref(),
            config.features.search,
        )
        .await?;

        match command {
            DbCommands::Checkpoint => {
                database.checkpoint().await?;
                println!("checkpoint complete");
            }
        }
        database.close().await;
        Ok(())
    }

    fn init_logging(debug: bool) {
        let default_filter = if debug { "debug".to_string() } else { "info".to_string() };
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await?;

        banner::print_banner(
            &app.config.server.host,
            app.config.server.port,
            &app.data_dir,
            app.config.twitch.channels.len(),
        );

        let server = ApiServer::new(app);
        let app = server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }

    /// Spawn the chat client's connection/reconnect task and register it with
    /// the shutdown coordinator. A failure on the very first connect aborts
    /// startup; every subsequent failure is handled internally by the client.
    pub async fn start_background_tasks(&self) -> Result<()> {
        let shutdown_rx = self.shutdown.subscribe();
        let handle = self
            .chat_client
            .connect(shutdown_rx)
            .await
            .context("failed to connect to Twitch chat")?;
        self.shutdown.register(handle).await;

        tracing::debug!("background tasks started");
        Ok(())
    }
}

