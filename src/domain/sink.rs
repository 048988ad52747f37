//! Ports that decouple the protocol client from the ingestion pipeline, and
//! the ingestion pipeline's processor from the live bus.
//!
//! Ingestion depends on storage; the live bus depends on ingestion; HTTP
//! handlers depend on both. The cycle is broken by injecting a one-way sink
//! at construction rather than letting a lower layer import a higher one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::data::types::{Channel, StoredMessage, User};
use crate::domain::protocol::parse::PrivmsgEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelChange {
    Joined,
    Parted,
}

/// A parsed chat message stamped with the time the client received it.
#[derive(Debug, Clone)]
pub struct IngestEvent {
    pub message: PrivmsgEvent,
    pub received_at: DateTime<Utc>,
}

/// Receives raw protocol events. Implemented by the ingestion pipeline;
/// injected into the chat client so it never depends on ingestion directly.
#[async_trait]
pub trait ProtocolSink: Send + Sync {
    /// Non-blocking: must never await on backpressure from the consumer.
    async fn on_message(&self, event: IngestEvent);

    async fn on_channel_change(&self, channel: &str, change: ChannelChange);
}

/// Receives committed rows and the counter updates they produced.
/// Implemented by the live bus; injected into the Processor so storage never
/// depends on the bus.
#[async_trait]
pub trait StoredMessageSink: Send + Sync {
    async fn on_stored_message(&self, message: &StoredMessage);

    /// A channel's derived counters changed as a result of a committed batch.
    async fn on_channel_count(&self, channel: &Channel);

    /// A user's derived counters changed as a result of a committed batch.
    async fn on_user_count(&self, user: &User);
}
