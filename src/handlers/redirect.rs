//! Shopper-facing leg of reconciliation.
//!
//! The processor sends the browser back here with the same field
//! vocabulary the webhook carries. The transition pipeline is identical;
//! only the failure mode differs — a shopper gets a destination with a
//! notice, never a bare error page.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{error, info};

use crate::errors::ServiceError;
use crate::services::reconciliation::{Ingress, PaymentEvent, ReconciliationOutcome};
use crate::AppState;

/// GET return from the hosted payment page
pub async fn shopper_redirect_get(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    complete_redirect(state, params).await
}

/// Some processor flows POST the browser back instead
pub async fn shopper_redirect_post(State(state): State<AppState>, body: Bytes) -> Response {
    let params: BTreeMap<String, String> =
        url::form_urlencoded::parse(&body).into_owned().collect();
    complete_redirect(state, params).await
}

async fn complete_redirect(state: AppState, fields: BTreeMap<String, String>) -> Response {
    let event = PaymentEvent::from_fields(fields);
    let payment_code = event.payment_code().unwrap_or("").to_string();
    let pages = state.config.pages.clone();

    let destination = match state
        .reconciliation
        .process_event(&event, Ingress::Redirect)
        .await
    {
        Ok(ReconciliationOutcome::Completed { .. }) => with_params(
            &pages.order_received_url,
            &[("payment_code", payment_code.as_str()), ("status", "success")],
        ),
        Ok(ReconciliationOutcome::Pending) => with_params(
            &pages.order_received_url,
            &[
                ("payment_code", payment_code.as_str()),
                ("status", "processing"),
                ("notice", "payment-processing"),
            ],
        ),
        Ok(ReconciliationOutcome::Failed { unauthorized }) => with_params(
            &pages.payment_retry_url,
            &[
                ("payment_code", payment_code.as_str()),
                (
                    "notice",
                    if unauthorized {
                        "payment-unauthorized"
                    } else {
                        "payment-failed"
                    },
                ),
            ],
        ),
        Ok(ReconciliationOutcome::Ignored { .. }) => with_params(
            &pages.order_view_url,
            &[
                ("payment_code", payment_code.as_str()),
                ("notice", "payment-status-unknown"),
            ],
        ),
        Err(ServiceError::NotFound(_)) => {
            info!(%payment_code, "Redirect with unknown payment code; sending shopper to cart");
            with_params(&pages.cart_url, &[("notice", "order-not-found")])
        }
        Err(ServiceError::Unauthorized(_)) => with_params(
            &pages.payment_retry_url,
            &[
                ("payment_code", payment_code.as_str()),
                ("notice", "verification-failed"),
            ],
        ),
        Err(e) => {
            error!(%payment_code, error = %e, "Redirect reconciliation failed");
            with_params(&pages.cart_url, &[("notice", "payment-error")])
        }
    };

    found(&destination)
}

/// Appends notice parameters to a configured page URL.
fn with_params(base: &str, params: &[(&str, &str)]) -> String {
    match url::Url::parse(base) {
        Ok(mut url) => {
            {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in params {
                    if !value.is_empty() {
                        pairs.append_pair(key, value);
                    }
                }
            }
            url.to_string()
        }
        Err(_) => base.to_string(),
    }
}

/// Plain 302 with a Location header.
fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_appended_to_page_urls() {
        let url = with_params(
            "http://shop.example/checkout/order-received",
            &[("payment_code", "HP-PAY-1"), ("status", "success")],
        );
        assert_eq!(
            url,
            "http://shop.example/checkout/order-received?payment_code=HP-PAY-1&status=success"
        );
    }

    #[test]
    fn empty_params_are_skipped() {
        let url = with_params("http://shop.example/cart", &[("payment_code", ""), ("notice", "x")]);
        assert_eq!(url, "http://shop.example/cart?notice=x");
    }

    #[test]
    fn existing_query_strings_are_preserved() {
        let url = with_params("http://shop.example/pay?order=42", &[("notice", "failed")]);
        assert_eq!(url, "http://shop.example/pay?order=42&notice=failed");
    }
}
