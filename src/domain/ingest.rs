//! Bounded single-producer/single-consumer ingestion queue with size- and
//! time-triggered batch flushing.
//!
//! `ingest` (via [`ProtocolSink::on_message`]) never blocks the chat client:
//! a full queue drops the event and increments a counter rather than
//! applying backpressure upstream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::processor::Processor;
use crate::domain::sink::{ChannelChange, IngestEvent, ProtocolSink};

pub struct IngestPipeline {
    tx: mpsc::Sender<IngestEvent>,
    dropped: Arc<AtomicU64>,
}

impl IngestPipeline {
    /// Spawn the consumer task and return the pipeline handle plus its
    /// `JoinHandle`, so the caller can register the latter with the
    /// shutdown coordinator.
    pub fn start(
        buffer_size: usize,
        batch_size: usize,
        flush_interval: Duration,
        processor: Arc<Processor>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        let dropped = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(Self::run(rx, batch_size, flush_interval, processor, shutdown_rx));
        (Self { tx, dropped }, handle)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    async fn run(
        mut rx: mpsc::Receiver<IngestEvent>,
        batch_size: usize,
        flush_interval: Duration,
        processor: Arc<Processor>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut batch = Vec::with_capacity(batch_size);
        let mut ticker = tokio::time::interval(flush_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        while let Ok(event) = rx.try_recv() {
                            batch.push(event);
                        }
                        Self::flush(&processor, &mut batch).await;
                        tracing::debug!("ingestion pipeline drained on shutdown");
                        break;
                    }
                }
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            batch.push(event);
                            if batch.len() >= batch_size {
                                Self::flush(&processor, &mut batch).await;
                            }
                        }
                        None => {
                            Self::flush(&processor, &mut batch).await;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        Self::flush(&processor, &mut batch).await;
                    }
                }
            }
        }
    }

    async fn flush(processor: &Arc<Processor>, batch: &mut Vec<IngestEvent>) {
        if batch.is_empty() {
            return;
        }
        let events = std::mem::take(batch);
        let batch_size = events.len();
        let start = std::time::Instant::now();
        let span = tracing::info_span!("ingest_flush", batch_size);
        let _enter = span.enter();

        match processor.process_batch(events).await {
            Ok(stored) => {
                tracing::debug!(
                    batch_size,
                    stored,
                    skipped = batch_size - stored,
                    elapsed_ms = start.elapsed().as_millis(),
                    "batch flushed"
                );
            }
            Err(e) => {
                tracing::warn!(batch_size, error = %e, "batch commit failed, dropping batch");
            }
        }
    }
}

#[async_trait]
impl ProtocolSink for IngestPipeline {
    async fn on_message(&self, event: IngestEvent) {
        if self.tx.try_send(event).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!(total_dropped = total, "ingestion queue full, dropping event");
        }
    }

    async fn on_channel_change(&self, channel: &str, change: ChannelChange) {
        tracing::info!(channel, ?change, "channel membership changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DbService;
    use crate::domain::bus::LiveBus;
    use crate::domain::protocol::parse::PrivmsgEvent;
    use chrono::Utc;
    use std::collections::HashMap;

    async fn test_processor() -> Arc<Processor> {
        let store = crate::data::sqlite::SqliteStore::init_for_test().await;
        let db = Arc::new(DbService::Sqlite(Arc::new(store)));
        db.repository()
            .create_channel("alpha", "Alpha", true)
            .await
            .unwrap();
        Arc::new(Processor::new(db.repository(), Arc::new(LiveBus::new())))
    }

    fn event(channel: &str, username: &str) -> IngestEvent {
        IngestEvent {
            message: PrivmsgEvent {
                channel: channel.to_string(),
                username: username.to_string(),
                display_name: None,
                text: "hello".to_string(),
                tags: HashMap::new(),
            },
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn flush_triggers_on_batch_size() {
        let processor = test_processor().await;
        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(IngestPipeline::run(
            rx,
            2,
            Duration::from_secs(60),
            processor.clone(),
            shutdown_rx,
        ));

        tx.send(event("alpha", "u1")).await.unwrap();
        tx.send(event("alpha", "u2")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown_tx.send(true);
        drop(tx);
        handle.await.unwrap();

        let total = processor.repo().total_message_count().await.unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn on_message_drops_when_queue_full() {
        let processor = test_processor().await;
        let (pipeline, handle) = IngestPipeline::start(
            1,
            100,
            Duration::from_secs(60),
            processor,
            watch::channel(false).1,
        );
        handle.abort();

        // fill the single slot, then overflow it before anything drains.
        let _ = pipeline.tx.try_send(event("alpha", "u1"));
        pipeline.on_message(event("alpha", "u2")).await;
        assert_eq!(pipeline.dropped_count(), 1);
    }
}
