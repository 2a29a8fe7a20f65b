use axum::{extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;

use crate::errors::ServiceError;
use crate::services::reconciliation::{Ingress, PaymentEvent};
use crate::AppState;

/// Server-to-server status notification from the processor.
///
/// The body may be JSON or form-encoded; there is no session, so
/// authenticity rests entirely on the checksum. Events with a status the
/// vocabulary does not cover are acknowledged with 200 after annotation —
/// the processor must not keep retrying something we have recorded.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Undecodable payload", body = crate::errors::ErrorResponse),
        (status = 403, description = "Checksum verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown payment code", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let event = PaymentEvent::from_body(&body)?;

    state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await?;

    Ok((StatusCode::OK, "OK"))
}
