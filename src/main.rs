use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use herepay_gateway as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await?;
    }
    let db = Arc::new(db_pool);

    // Init events
    let (event_sender, event_rx) = api::events::channel(1024);
    tokio::spawn(api::events::process_events(event_rx));

    // Processor client; credentials are handed in explicitly
    let credentials = cfg.herepay.credentials();
    if !credentials.is_complete() {
        warn!(
            "Herepay credentials incomplete; initiation will fail until \
             api_key, secret_key and private_key are configured"
        );
    }
    if credentials.private_key().is_none() {
        warn!("No private key configured: inbound events will not be checksum-verified");
    }

    let herepay = Arc::new(api::services::herepay::HerepayClient::new(
        credentials.clone(),
        Duration::from_secs(cfg.http_timeout_secs),
    )?);

    let order_store: Arc<dyn api::services::order_store::OrderStore> =
        Arc::new(api::services::order_store::SeaOrmOrderStore::new(db.clone()));

    let payments = Arc::new(api::services::payments::PaymentService::new(
        db.clone(),
        herepay.clone(),
        order_store.clone(),
        event_sender.clone(),
        cfg.store_name.clone(),
        cfg.herepay.public_redirect_url.clone(),
    ));

    let reconciliation = Arc::new(api::services::reconciliation::ReconciliationService::new(
        db.clone(),
        order_store.clone(),
        event_sender.clone(),
        credentials.private_key().map(str::to_string),
    ));

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        herepay,
        payments,
        reconciliation,
        order_store,
    };

    let app = api::app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(cfg.http_timeout_secs)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port configuration")?;
    info!(%addr, "Starting Herepay gateway");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("Shutdown signal received");
}
