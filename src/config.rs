use serde::Deserialize;

use crate::observability::{LogConfig, LogFormat};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub policy: PolicySettings,
    #[serde(default)]
    pub outbox: OutboxSettings,
    #[serde(default)]
    pub kafka: Option<KafkaSettings>,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

/// Without a `url` the service runs on the in-memory store.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub pool_size: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    pub base_url: String,
    pub key_id: String,
    /// Supplied through `APP__GATEWAY__KEY_SECRET`; never committed.
    #[serde(default)]
    pub key_secret: String,
    pub currency: String,
    pub timeout_ms: u64,
}

/// Sample values that must never sign real callbacks.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "changeme", "secret"];

impl GatewaySettings {
    /// The callback signing secret. Blank and placeholder values are refused.
    pub fn signing_secret(&self) -> Result<&str, config::ConfigError> {
        let secret = self.key_secret.trim();
        if secret.is_empty() || PLACEHOLDER_SECRETS.contains(&secret.to_lowercase().as_str()) {
            return Err(config::ConfigError::Message(
                "gateway.key_secret is not set; provide APP__GATEWAY__KEY_SECRET".to_string(),
            ));
        }
        Ok(secret)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Lets a doctor approve an appointment whose payment is still pending.
    pub allow_unpaid_approval: bool,
    pub max_commit_retries: u32,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            allow_unpaid_approval: false,
            max_commit_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxSettings {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    pub max_attempts: i32,
    pub delivery_timeout_ms: u64,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            batch_size: 50,
            max_attempts: 5,
            delivery_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaSettings {
    pub brokers: String,
    pub topic: String,
}

impl KafkaSettings {
    pub fn broker_list(&self) -> Vec<String> {
        self.brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingSettings {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level.clone(),
            format: LogFormat::from(self.format.as_str()),
            ..LogConfig::default()
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
