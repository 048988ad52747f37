//! Ingestion pipeline, identity resolution, live event bus, and the upstream
//! chat protocol client.
//!
//! Ingestion depends on storage; the live bus depends on ingestion; HTTP
//! handlers depend on both. The cycle is broken by [`sink`]: the protocol
//! client holds a [`sink::ProtocolSink`] (implemented by [`ingest::IngestPipeline`])
//! and the processor holds a [`sink::StoredMessageSink`] (implemented by
//! [`bus::LiveBus`]), so neither lower layer imports the one above it.

pub mod bus;
pub mod ingest;
pub mod processor;
pub mod protocol;
pub mod sink;
