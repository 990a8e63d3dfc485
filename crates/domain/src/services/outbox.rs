//! Outbound notification queue.
//!
//! Requests enqueue composed notifications and return immediately; a single
//! worker task hands them to the dispatcher in order. Failures are logged and
//! counted rather than propagated back to the request that caused them.

use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::notification::{Notification, NotificationDispatcher};

enum OutboxMessage {
    Deliver(Notification),
    Flush(oneshot::Sender<()>),
}

/// Delivery counters.
#[derive(Debug, Default)]
pub struct OutboxStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl OutboxStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Handle to the outbox worker. Cheap to clone.
#[derive(Clone)]
pub struct NotificationOutbox {
    tx: mpsc::UnboundedSender<OutboxMessage>,
    stats: Arc<OutboxStats>,
}

impl NotificationOutbox {
    /// Starts the worker. It runs until every handle has been dropped.
    pub fn spawn(dispatcher: Arc<dyn NotificationDispatcher>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(OutboxStats::default());
        let handle = tokio::spawn(run_worker(rx, dispatcher, stats.clone()));
        (Self { tx, stats }, handle)
    }

    /// Queues a notification. Never blocks.
    pub fn enqueue(&self, notification: Notification) {
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(OutboxMessage::Deliver(notification)).is_err() {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            counter!("notifications_outbox_total", "outcome" => "dropped").increment(1);
            warn!("Notification outbox worker has stopped; notification dropped");
        }
    }

    /// Waits until everything enqueued before this call has been processed.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(OutboxMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn stats(&self) -> &OutboxStats {
        &self.stats
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<OutboxMessage>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    stats: Arc<OutboxStats>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            OutboxMessage::Deliver(notification) => {
                match dispatcher.send(&notification).await {
                    Ok(()) => {
                        stats.delivered.fetch_add(1, Ordering::Relaxed);
                        counter!("notifications_outbox_total", "outcome" => "delivered")
                            .increment(1);
                        debug!(topic = %notification.topic, "Notification delivered");
                    }
                    Err(e) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        counter!("notifications_outbox_total", "outcome" => "failed")
                            .increment(1);
                        warn!(
                            topic = %notification.topic,
                            recipients = notification.recipients.len(),
                            error = %e,
                            "Notification delivery failed"
                        );
                    }
                }
            }
            OutboxMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Notification outbox worker stopped");
}
