pub mod messages;
pub mod relay;
pub mod sink;
pub mod types;

pub use relay::{OutboxRelay, RelayConfig, RelayReport};
pub use sink::{KafkaNotificationSink, KafkaSinkConfig, NotificationSink, TracingNotificationSink};
pub use types::{topics, EventEnvelope, Notification};
