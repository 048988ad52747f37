//! Errors surfaced by the chat protocol client.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("TLS handshake failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid TLS server name: {0}")]
    InvalidServerName(#[from] rustls::pki_types::InvalidDnsNameError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection timed out")]
    Timeout,

    #[error("connection closed by remote")]
    Closed,

    #[error("not connected")]
    NotConnected,
}
