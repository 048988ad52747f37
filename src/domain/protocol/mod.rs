//! TLS IRC client for Twitch chat.
//!
//! Holds one connection, authenticates (credentialed or anonymous), joins
//! the configured channel set, answers keepalives, parses `PRIVMSG` lines,
//! and reconnects with backoff on any read/write failure. Failures during
//! the very first connect are returned synchronously; everything after that
//! is handled internally by the reconnect loop and never propagated.

pub mod error;
pub mod parse;

pub use error::ProtocolError;
pub use parse::{Line, PrivmsgEvent};

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::core::config::{AuthMode, TwitchConfig};
use crate::core::constants::{
    RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_ATTEMPTS, RECONNECT_MAX_DELAY_MS, TWITCH_IRC_HOST,
    TWITCH_IRC_TLS_PORT,
};
use crate::domain::sink::{ChannelChange, ProtocolSink};

const READ_TIMEOUT: Duration = Duration::from_secs(300);
const TWITCH_CAPS: &[u8] = b"CAP REQ :twitch.tv/tags twitch.tv/commands\r\n";

type ChatReader = BufReader<ReadHalf<TlsStream<TcpStream>>>;
type ChatWriter = WriteHalf<TlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Normalize a channel name: trim, lowercase, strip a leading `#`.
pub fn normalize_channel(name: &str) -> String {
    name.trim().trim_start_matches('#').to_lowercase()
}

struct Inner {
    state: ConnState,
    channels: HashSet<String>,
    writer: Option<ChatWriter>,
}

pub struct ChatClient {
    config: TwitchConfig,
    sink: Arc<dyn ProtocolSink>,
    inner: Arc<RwLock<Inner>>,
    connected: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl ChatClient {
    pub fn new(config: TwitchConfig, sink: Arc<dyn ProtocolSink>) -> Self {
        let channels = config.channels.iter().map(|c| normalize_channel(c)).collect();
        Self {
            config,
            sink,
            inner: Arc::new(RwLock::new(Inner {
                state: ConnState::Disconnected,
                channels,
                writer: None,
            })),
            connected: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn channels(&self) -> Vec<String> {
        self.inner.read().await.channels.iter().cloned().collect()
    }

    /// Dial, authenticate, join the configured channels, and spawn the
    /// background task that drives the read loop and subsequent reconnects.
    ///
    /// Returns an error synchronously if the *initial* connect fails.
    pub async fn connect(self: &Arc<Self>, shutdown_rx: watch::Receiver<bool>) -> Result<JoinHandle<()>, ProtocolError> {
        let (reader, writer) = Self::dial_and_auth(&self.config).await?;

        {
            let mut inner = self.inner.write().await;
            inner.writer = Some(writer);
            inner.state = ConnState::Connected;
        }
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("chat client connected");

        let client = Arc::clone(self);
        Ok(tokio::spawn(async move {
            client.join_all_current().await;
            client.run(reader, shutdown_rx).await;
        }))
    }

    /// Stop the client. The read loop observes this on its next iteration
    /// and exits without reconnecting.
    pub fn disconnect(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Idempotent: adding an already-joined channel sends no outbound `JOIN`.
    pub async fn join(&self, name: &str) {
        let name = normalize_channel(name);
        let mut inner = self.inner.write().await;
        if !inner.channels.insert(name.clone()) {
            return;
        }
        if let Some(writer) = inner.writer.as_mut() {
            if let Err(e) = write_line(writer, &format!("JOIN #{}", name)).await {
                tracing::warn!(channel = %name, error = %e, "failed to send JOIN");
            }
        }
        drop(inner);
        self.sink.on_channel_change(&name, ChannelChange::Joined).await;
    }

    pub async fn part(&self, name: &str) {
        let name = normalize_channel(name);
        let mut inner = self.inner.write().await;
        if !inner.channels.remove(&name) {
            return;
        }
        if let Some(writer) = inner.writer.as_mut() {
            if let Err(e) = write_line(writer, &format!("PART #{}", name)).await {
                tracing::warn!(channel = %name, error = %e, "failed to send PART");
            }
        }
        drop(inner);
        self.sink.on_channel_change(&name, ChannelChange::Parted).await;
    }

    async fn join_all_current(&self) {
        let channels: Vec<String> = self.inner.read().await.channels.iter().cloned().collect();
        let mut inner = self.inner.write().await;
        if let Some(writer) = inner.writer.as_mut() {
            for name in &channels {
                if let Err(e) = write_line(writer, &format!("JOIN #{}", name)).await {
                    tracing::warn!(channel = %name, error = %e, "failed to send JOIN");
                }
            }
        }
    }

    async fn run(self: Arc<Self>, mut reader: ChatReader, mut shutdown_rx: watch::Receiver<bool>) {
        let mut consecutive_failures: u32 = 0;

        loop {
            let mut line = String::new();
            let read = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("chat client stopping on shutdown signal");
                        self.connected.store(false, Ordering::SeqCst);
                        return;
                    }
                    continue;
                }
                res = tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut line)) => res,
            };

            if self.stopped.load(Ordering::SeqCst) {
                tracing::info!("chat client stopping on disconnect()");
                self.connected.store(false, Ordering::SeqCst);
                return;
            }

            let disconnected = match read {
                Err(_) => {
                    tracing::warn!("read timed out, reconnecting");
                    true
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "read error, reconnecting");
                    true
                }
                Ok(Ok(0)) => {
                    tracing::warn!("connection closed by remote, reconnecting");
                    true
                }
                Ok(Ok(_)) => {
                    let trimmed = line.trim_end_matches(['\r', '\n']);
                    if !trimmed.is_empty() {
                        self.handle_line(trimmed).await;
                    }
                    false
                }
            };

            if !disconnected {
                continue;
            }

            self.connected.store(false, Ordering::SeqCst);
            {
                let mut inner = self.inner.write().await;
                inner.state = ConnState::Reconnecting;
                inner.writer = None;
            }

            match self.reconnect_loop(&mut shutdown_rx, &mut consecutive_failures).await {
                Some(new_reader) => {
                    reader = new_reader;
                    consecutive_failures = 0;
                    self.connected.store(true, Ordering::SeqCst);
                    self.join_all_current().await;
                    tracing::info!("chat client reconnected");
                }
                None => {
                    tracing::info!("reconnect loop aborted on shutdown");
                    return;
                }
            }
        }
    }

    /// Sleeps with exponential backoff + jitter between attempts, respecting
    /// shutdown. Returns `None` if shutdown fired, `Some(reader)` once a
    /// reconnect attempt succeeds.
    async fn reconnect_loop(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
        consecutive_failures: &mut u32,
    ) -> Option<ChatReader> {
        loop {
            let delay = backoff_delay(*consecutive_failures);
            tracing::info!(delay_ms = delay.as_millis(), attempt = *consecutive_failures + 1, "reconnecting after delay");

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return None;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }

            if self.stopped.load(Ordering::SeqCst) {
                return None;
            }

            match Self::dial_and_auth(&self.config).await {
                Ok((reader, writer)) => {
                    self.inner.write().await.writer = Some(writer);
                    return Some(reader);
                }
                Err(e) => {
                    *consecutive_failures = consecutive_failures.saturating_add(1);
                    tracing::warn!(error = %e, attempt = *consecutive_failures, "reconnect attempt failed");
                    if *consecutive_failures >= RECONNECT_MAX_ATTEMPTS {
                        tracing::warn!(
                            attempts = *consecutive_failures,
                            "repeated reconnect failures, holding at max backoff"
                        );
                    }
                }
            }
        }
    }

    async fn handle_line(&self, line: &str) {
        match parse::parse_line(line) {
            Line::Ping { suffix } => {
                let mut inner = self.inner.write().await;
                if let Some(writer) = inner.writer.as_mut() {
                    let pong = if suffix.is_empty() {
                        "PONG".to_string()
                    } else {
                        format!("PONG {}", suffix)
                    };
                    if let Err(e) = write_line(writer, &pong).await {
                        tracing::warn!(error = %e, "failed to send PONG");
                    }
                }
            }
            Line::Privmsg(message) => {
                self.sink
                    .on_message(crate::domain::sink::IngestEvent {
                        message,
                        received_at: chrono::Utc::now(),
                    })
                    .await;
            }
            Line::Other => {
                tracing::trace!(line = %line, "ignoring protocol line");
            }
        }
    }

    async fn dial_and_auth(config: &TwitchConfig) -> Result<(ChatReader, ChatWriter), ProtocolError> {
        let tcp = TcpStream::connect((TWITCH_IRC_HOST, TWITCH_IRC_TLS_PORT)).await?;
        let connector = build_tls_connector()?;
        let server_name = ServerName::try_from(TWITCH_IRC_HOST)?.to_owned();
        let tls = connector.connect(server_name, tcp).await?;

        let (read_half, mut write_half) = tokio::io::split(tls);
        let reader = BufReader::new(read_half);

        write_half.write_all(TWITCH_CAPS).await?;

        match config.mode {
            AuthMode::Credentialed => {
                let token = config.token.as_deref().ok_or_else(|| {
                    ProtocolError::Config("credentialed auth requires a token".to_string())
                })?;
                let username = config.username.as_deref().ok_or_else(|| {
                    ProtocolError::Config("credentialed auth requires a username".to_string())
                })?;
                write_line(&mut write_half, &format!("PASS {}", token)).await?;
                write_line(&mut write_half, &format!("NICK {}", username)).await?;
            }
            AuthMode::Anonymous => {
                let nick = format!("justinfan{}", rand::thread_rng().gen_range(10_000..99_999));
                write_line(&mut write_half, &format!("NICK {}", nick)).await?;
            }
        }

        Ok((reader, write_half))
    }
}

async fn write_line(writer: &mut ChatWriter, line: &str) -> Result<(), ProtocolError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

fn build_tls_connector() -> Result<TlsConnector, ProtocolError> {
    let mut root_store = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in native.errors {
        tracing::warn!(error = %err, "failed to load a native certificate");
    }
    for cert in native.certs {
        if let Err(e) = root_store.add(cert) {
            tracing::warn!(error = %e, "failed to add a native certificate to the TLS root store");
        }
    }
    if root_store.is_empty() {
        return Err(ProtocolError::Config(
            "no trusted root certificates available".to_string(),
        ));
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

fn backoff_delay(consecutive_failures: u32) -> Duration {
    let base = RECONNECT_BASE_DELAY_MS.saturating_mul(1u64 << consecutive_failures.min(16));
    let capped = base.min(RECONNECT_MAX_DELAY_MS);
    let jitter_range = (capped as f64 * 0.2) as i64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(-jitter_range..=jitter_range)
    } else {
        0
    };
    Duration::from_millis((capped as i64 + jitter).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_channel_strips_hash_and_lowercases() {
        assert_eq!(normalize_channel("#SomeChannel"), "somechannel");
        assert_eq!(normalize_channel("  somechannel "), "somechannel");
    }

    #[test]
    fn backoff_delay_caps_at_configured_max() {
        let d = backoff_delay(30);
        assert!(d.as_millis() as u64 <= RECONNECT_MAX_DELAY_MS + RECONNECT_MAX_DELAY_MS / 5);
    }

    #[test]
    fn backoff_delay_grows_with_failures() {
        let d0 = backoff_delay(0).as_millis();
        let d3 = backoff_delay(3).as_millis();
        assert!(d3 > d0);
    }
}
