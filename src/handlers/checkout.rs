use axum::{extract::State, response::Html, response::IntoResponse, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InitiatePaymentRequest {
    pub order_id: Uuid,
    /// Bank selected at checkout, e.g. "TEST0021"
    #[validate(length(min = 1))]
    pub bank_prefix: String,
    /// Method group the bank belongs to, e.g. "Online Banking"
    #[validate(length(min = 1))]
    pub payment_method: String,
}

/// Initiates a payment and relays the processor's hosted-payment redirect
/// page. The response body is HTML the shopper's browser renders; it
/// auto-submits towards the processor.
#[utoipa::path(
    post,
    path = "/api/v1/payments/initiate",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Sanitized redirect payload", content_type = "text/html"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Processor rejected or unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request.validate()?;

    let initiated = state
        .payments
        .initiate_payment(request.order_id, &request.bank_prefix, &request.payment_method)
        .await?;

    Ok((
        [("x-payment-code", initiated.payment_code)],
        Html(initiated.html),
    ))
}
