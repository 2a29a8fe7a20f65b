//! Operator tooling: live status queries and the recent-intents listing.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::payment_intent;
use crate::errors::ServiceError;
use crate::services::herepay::RemoteTransactionStatus;
use crate::{ApiResponse, AppState};

/// Payment intent as presented to operators
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentIntentView {
    pub payment_code: String,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<payment_intent::Model> for PaymentIntentView {
    fn from(model: payment_intent::Model) -> Self {
        Self {
            payment_code: model.payment_code,
            order_id: model.order_id,
            amount: model.amount,
            currency: model.currency,
            status: model.status,
            transaction_id: model.transaction_id,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecentIntentsQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    10
}

/// On-demand poll of a payment code's processor-side state. Never part of
/// the automated reconciliation path, and never cached.
#[utoipa::path(
    get,
    path = "/api/v1/payments/transactions/{payment_code}",
    params(("payment_code" = String, Path, description = "Payment code to query")),
    responses(
        (status = 200, description = "Current processor-side status"),
        (status = 404, description = "Processor has no such transaction", body = crate::errors::ErrorResponse),
        (status = 502, description = "Processor API unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn get_transaction_status(
    State(state): State<AppState>,
    Path(payment_code): Path<String>,
) -> Result<Json<ApiResponse<RemoteTransactionStatus>>, ServiceError> {
    let status = state.herepay.transaction_status(&payment_code).await?;
    Ok(Json(ApiResponse::success(status)))
}

/// Recent payment intents, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/payments/intents",
    params(("limit" = Option<u64>, Query, description = "Maximum rows, default 10")),
    responses((status = 200, description = "Recent payment intents")),
    tag = "Payments"
)]
pub async fn list_recent_intents(
    State(state): State<AppState>,
    Query(query): Query<RecentIntentsQuery>,
) -> Result<Json<ApiResponse<Vec<PaymentIntentView>>>, ServiceError> {
    let intents = state.payments.recent_intents(query.limit.min(100)).await?;
    Ok(Json(ApiResponse::success(
        intents.into_iter().map(PaymentIntentView::from).collect(),
    )))
}
