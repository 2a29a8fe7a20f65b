//! Herepay Payment Gateway Service
//!
//! Connects an e-commerce checkout to the Herepay processor: initiates
//! signed payment requests, relays the hosted-payment redirect, and
//! reconciles outcomes arriving over the webhook and the shopper
//! redirect onto order state exactly once.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod checksum;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod html;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::services::herepay::HerepayClient;
use crate::services::order_store::OrderStore;
use crate::services::payments::PaymentService;
use crate::services::reconciliation::ReconciliationService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub herepay: Arc<HerepayClient>,
    pub payments: Arc<PaymentService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub order_store: Arc<dyn OrderStore>,
}

// Common response wrapper
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Versioned API surface
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/payments/channels", get(handlers::channels::list_channels))
        .route("/payments/initiate", post(handlers::checkout::initiate_payment))
        .route("/payments/webhook", post(handlers::webhooks::payment_webhook))
        .route(
            "/payments/transactions/:payment_code",
            get(handlers::transactions::get_transaction_status),
        )
        .route(
            "/payments/intents",
            get(handlers::transactions::list_recent_intents),
        )
}

/// Full application router. The shopper redirect lives outside the API
/// prefix: its URL is registered with the processor and browsers follow
/// it directly.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .route(
            "/payments/redirect",
            get(handlers::redirect::shopper_redirect_get)
                .post(handlers::redirect::shopper_redirect_post),
        )
        .layer(axum::middleware::from_fn(request_logging_middleware))
        .with_state(state)
}

async fn api_status() -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "herepay-gateway",
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}

// Request logging middleware
async fn request_logging_middleware(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    tracing::info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        elapsed_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}
