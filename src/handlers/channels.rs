use axum::{extract::State, Json};
use tracing::info;

use crate::errors::ServiceError;
use crate::services::herepay::PaymentChannel;
use crate::{ApiResponse, AppState};

/// Lists the active bank/payment-method options for checkout. Doubles as
/// the operator's connectivity probe: a 502 here means the processor API
/// is unreachable, which is a different situation from an empty list.
#[utoipa::path(
    get,
    path = "/api/v1/payments/channels",
    responses(
        (status = 200, description = "Active payment channels"),
        (status = 502, description = "Processor API unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn list_channels(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<PaymentChannel>>>, ServiceError> {
    let channels = state.herepay.payment_channels().await?;
    info!(count = channels.len(), "Fetched payment channels");
    Ok(Json(ApiResponse::success(channels)))
}
