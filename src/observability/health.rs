use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::events::NotificationSink;
use crate::repositories::OutboxStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl DependencyHealth {
    pub fn healthy(name: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            message: None,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
}

impl AggregatedHealth {
    pub fn new(version: String, uptime_seconds: u64, dependencies: Vec<DependencyHealth>) -> Self {
        let status = if dependencies.iter().any(|d| d.status.is_unhealthy()) {
            HealthStatus::Unhealthy
        } else if dependencies.iter().any(|d| d.status.is_degraded()) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            version,
            uptime_seconds,
            dependencies,
        }
    }
}

/// Checks the record store, the notification outbox and the delivery sink.
///
/// Without a pool the service runs on the in-memory store and the database
/// check reports healthy with a note.
pub struct HealthChecker {
    pool: Option<PgPool>,
    outbox: Arc<dyn OutboxStore>,
    sink: Arc<dyn NotificationSink>,
    backlog_threshold: i64,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(
        pool: Option<PgPool>,
        outbox: Arc<dyn OutboxStore>,
        sink: Arc<dyn NotificationSink>,
        backlog_threshold: i64,
    ) -> Self {
        Self {
            pool,
            outbox,
            sink,
            backlog_threshold,
            start_time: Instant::now(),
        }
    }

    pub async fn check_all(&self) -> AggregatedHealth {
        let dependencies = vec![
            self.check_database().await,
            self.check_outbox().await,
            self.check_sink(),
        ];

        AggregatedHealth::new(
            env!("CARGO_PKG_VERSION").to_string(),
            self.uptime_seconds(),
            dependencies,
        )
    }

    pub async fn check_database(&self) -> DependencyHealth {
        let Some(pool) = &self.pool else {
            return DependencyHealth {
                message: Some("in-memory store".to_string()),
                ..DependencyHealth::healthy("database", 0.0)
            };
        };

        let start = Instant::now();
        match tokio::time::timeout(Duration::from_secs(5), sqlx::query("SELECT 1").fetch_one(pool)).await {
            Ok(Ok(_)) => {
                let latency = start.elapsed().as_secs_f64() * 1000.0;
                if latency > 100.0 {
                    DependencyHealth {
                        latency_ms: Some(latency),
                        ..DependencyHealth::degraded("database", "High latency detected")
                    }
                } else {
                    DependencyHealth::healthy("database", latency)
                }
            }
            Ok(Err(e)) => DependencyHealth::unhealthy("database", format!("Query failed: {}", e)),
            Err(_) => DependencyHealth::unhealthy("database", "Connection timeout"),
        }
    }

    /// Degraded once undelivered notifications pile up past the threshold.
    pub async fn check_outbox(&self) -> DependencyHealth {
        let start = Instant::now();
        match self.outbox.pending_count().await {
            Ok(backlog) if backlog > self.backlog_threshold => {
                DependencyHealth::degraded("outbox", format!("{} notifications pending", backlog))
            }
            Ok(_) => DependencyHealth::healthy("outbox", start.elapsed().as_secs_f64() * 1000.0),
            Err(e) => DependencyHealth::unhealthy("outbox", format!("Backlog query failed: {}", e)),
        }
    }

    pub fn check_sink(&self) -> DependencyHealth {
        if self.sink.is_connected() {
            DependencyHealth::healthy(self.sink.name(), 0.0)
        } else {
            DependencyHealth::degraded(self.sink.name(), "Not connected yet")
        }
    }

    pub fn is_alive(&self) -> bool {
        true
    }

    /// Ready when the store answers; notification trouble only degrades.
    pub async fn is_ready(&self) -> bool {
        self.check_database().await.status.is_healthy()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TracingNotificationSink;
    use crate::repositories::InMemoryStore;

    fn checker(threshold: i64) -> HealthChecker {
        HealthChecker::new(
            None,
            Arc::new(InMemoryStore::new()),
            Arc::new(TracingNotificationSink),
            threshold,
        )
    }

    #[test]
    fn test_aggregated_health_takes_worst_status() {
        let health = AggregatedHealth::new(
            "0.1.0".to_string(),
            10,
            vec![
                DependencyHealth::healthy("database", 1.0),
                DependencyHealth::degraded("outbox", "backlog"),
            ],
        );
        assert_eq!(health.status, HealthStatus::Degraded);

        let health = AggregatedHealth::new(
            "0.1.0".to_string(),
            10,
            vec![
                DependencyHealth::degraded("outbox", "backlog"),
                DependencyHealth::unhealthy("database", "down"),
            ],
        );
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_in_memory_service_is_ready_and_healthy() {
        let checker = checker(100);
        assert!(checker.is_ready().await);

        let health = checker.check_all().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.dependencies.len(), 3);
        assert_eq!(health.dependencies[2].name, "tracing");
    }
}
