use petcare_payments::api::{create_router, AppState};
use petcare_payments::config::Settings;
use petcare_payments::events::{
    KafkaNotificationSink, KafkaSinkConfig, NotificationSink, OutboxRelay, RelayConfig, TracingNotificationSink,
};
use petcare_payments::gateway::{HttpPaymentGateway, PaymentGateway};
use petcare_payments::observability::{init_logging, init_metrics, HealthChecker};
use petcare_payments::repositories::{
    InMemoryStore, OutboxRepository, OutboxStore, ProductCatalog, ProductRepository, TransactionRepository,
    TransactionStore,
};
use petcare_payments::services::{ServiceConfig, TransactionService};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outbox backlog above which `/health` reports degraded.
const OUTBOX_BACKLOG_THRESHOLD: i64 = 1000;

struct Stores {
    pool: Option<PgPool>,
    transactions: Arc<dyn TransactionStore>,
    catalog: Arc<dyn ProductCatalog>,
    outbox: Arc<dyn OutboxStore>,
}

async fn connect_stores(settings: &Settings) -> Result<Stores, Box<dyn std::error::Error>> {
    let Some(url) = settings.database.url.as_deref() else {
        warn!("No database url configured, using in-memory store");
        let memory = Arc::new(InMemoryStore::new());
        return Ok(Stores {
            pool: None,
            transactions: memory.clone(),
            catalog: memory.clone(),
            outbox: memory,
        });
    };

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    info!("Database connection established");

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    Ok(Stores {
        transactions: Arc::new(TransactionRepository::new(pool.clone())),
        catalog: Arc::new(ProductRepository::new(pool.clone())),
        outbox: Arc::new(OutboxRepository::new(pool.clone())),
        pool: Some(pool),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    init_logging(&settings.logging.to_log_config());
    info!("Configuration loaded");

    let metrics_handle = init_metrics()?;

    let stores = connect_stores(&settings).await?;

    let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpPaymentGateway::new(&settings.gateway)?);
    let service = Arc::new(TransactionService::new(
        stores.transactions.clone(),
        stores.catalog.clone(),
        gateway,
        ServiceConfig::from_settings(&settings)?,
    ));

    let sink: Arc<dyn NotificationSink> = match &settings.kafka {
        Some(kafka) => {
            info!("Publishing notifications to Kafka topic {}", kafka.topic);
            Arc::new(KafkaNotificationSink::new(KafkaSinkConfig::new(
                kafka.broker_list(),
                kafka.topic.clone(),
            )))
        }
        None => {
            info!("No Kafka configured, notifications go to the log");
            Arc::new(TracingNotificationSink)
        }
    };

    let relay = OutboxRelay::new(
        stores.outbox.clone(),
        sink.clone(),
        RelayConfig::from(&settings.outbox),
        service.outbox_signal(),
    );
    let _relay_handle = relay.start();

    let health_checker = Arc::new(HealthChecker::new(
        stores.pool,
        stores.outbox,
        sink,
        OUTBOX_BACKLOG_THRESHOLD,
    ));

    let state = AppState::new(service, health_checker).with_metrics(metrics_handle);
    let app = create_router(state);

    let address = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on {}", address);

    axum::serve(listener, app).await?;
    Ok(())
}
