use std::sync::Arc;

use event_bus::{EventBus, InMemoryBus, NatsBus};
use orders_rs::{orders_router, BusType, Config};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    // Database connection
    tracing::info!("Connecting to database...");
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // Event bus: the broker endpoint comes from configuration, never code
    let bus: Arc<dyn EventBus> = match config.bus_type {
        BusType::InMemory => {
            tracing::info!("Using InMemory event bus");
            Arc::new(InMemoryBus::new())
        }
        BusType::Nats => {
            let nats_url = config
                .nats_url
                .clone()
                .unwrap_or_else(|| "nats://localhost:4222".to_string());
            tracing::info!("Connecting to NATS at {}", nats_url);
            let client = async_nats::connect(&nats_url)
                .await
                .expect("Failed to connect to NATS");
            Arc::new(NatsBus::new(client))
        }
    };

    // Spawn the outbox dispatcher
    let dispatcher_pool = pool.clone();
    let dispatcher_bus = bus.clone();
    let dispatch_config = config.dispatch.clone();
    tokio::spawn(async move {
        orders_rs::run_dispatcher(dispatcher_pool, dispatcher_bus, dispatch_config).await;
    });

    let app = orders_router(pool).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Orders service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
