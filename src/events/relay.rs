use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::config::OutboxSettings;
use crate::error::Result;
use crate::events::sink::NotificationSink;
use crate::models::OutboxStatus;
use crate::observability::get_metrics;
use crate::repositories::OutboxStore;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub max_attempts: i32,
    pub delivery_timeout: Duration,
}

impl From<&OutboxSettings> for RelayConfig {
    fn from(settings: &OutboxSettings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            batch_size: settings.batch_size,
            max_attempts: settings.max_attempts,
            delivery_timeout: Duration::from_millis(settings.delivery_timeout_ms),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from(&OutboxSettings::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Delivers committed outbox events to the notification sink.
///
/// Failures stay inside the relay: they are logged, counted against the
/// event and retried on the next pass.
pub struct OutboxRelay {
    outbox: Arc<dyn OutboxStore>,
    sink: Arc<dyn NotificationSink>,
    config: RelayConfig,
    signal: Arc<Notify>,
}

impl OutboxRelay {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        sink: Arc<dyn NotificationSink>,
        config: RelayConfig,
        signal: Arc<Notify>,
    ) -> Self {
        Self {
            outbox,
            sink,
            config,
            signal,
        }
    }

    /// Delivers one batch of pending events.
    pub async fn run_once(&self) -> Result<RelayReport> {
        let mut report = RelayReport::default();
        let events = self.outbox.pending_events(self.config.batch_size).await?;

        for event in events {
            let outcome = match tokio::time::timeout(self.config.delivery_timeout, self.sink.deliver(&event)).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("delivery timed out after {:?}", self.config.delivery_timeout)),
            };

            match outcome {
                Ok(()) => {
                    self.outbox.mark_delivered(event.id).await?;
                    get_metrics().record_notification(event.event_type.as_str(), true);
                    report.delivered += 1;
                }
                Err(reason) => {
                    get_metrics().record_notification(event.event_type.as_str(), false);
                    report.failed += 1;
                    let status = self
                        .outbox
                        .mark_failed(event.id, &reason, self.config.max_attempts)
                        .await?;
                    if status == OutboxStatus::Dead {
                        error!(event_id = %event.id, sink = self.sink.name(), error = %reason, "Notification abandoned");
                    } else {
                        warn!(event_id = %event.id, sink = self.sink.name(), error = %reason, "Notification delivery failed");
                    }
                }
            }
        }

        if let Ok(backlog) = self.outbox.pending_count().await {
            get_metrics().set_outbox_backlog(backlog);
        }
        Ok(report)
    }

    /// Starts the relay in a background task, waking on commits and on a timer.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.poll_interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = self.signal.notified() => {}
                }

                match self.run_once().await {
                    Ok(report) if report.delivered + report.failed > 0 => {
                        debug!(delivered = report.delivered, failed = report.failed, "Outbox pass complete");
                    }
                    Ok(_) => {}
                    Err(e) => error!("Outbox relay pass failed: {}", e),
                }
            }
        })
    }
}
