//! HTTP client for the Herepay processor API.
//!
//! Three endpoints: channel listing, payment initiation, and the
//! per-payment-code transaction status query. All calls carry the
//! `XApiKey`/`SecretKey` header pair and share one bounded-timeout
//! client; there is no retry here — callers decide.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{instrument, warn};
use utoipa::ToSchema;

use crate::config::HerepayCredentials;
use crate::errors::ServiceError;

const CHANNELS_PATH: &str = "/api/v1/herepay/payment/channels";
const INITIATE_PATH: &str = "/api/v1/herepay/initiate";
const TRANSACTIONS_PATH: &str = "/api/v1/herepay/transactions";

/// A bank/payment-method option offered at checkout
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentChannel {
    pub bank_prefix: String,
    pub bank_name: String,
    /// Method group the channel belongs to (e.g. "FPX", "Online Banking")
    #[serde(default)]
    pub payment_method: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// The processor groups channels by payment method
#[derive(Debug, Deserialize)]
struct ChannelGroup {
    #[serde(default)]
    payment_method: String,
    #[serde(default)]
    channels: Vec<PaymentChannel>,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    data: Vec<ChannelGroup>,
}

/// Current processor-side state of a payment code, normalized to the flat
/// shape regardless of whether the API wrapped it in a `data` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RemoteTransactionStatus {
    #[serde(default)]
    pub reference_code: Option<String>,
    #[serde(default)]
    pub payment_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Accepts strings and bare numbers; the processor is not consistent
/// about which it sends for amounts and status codes.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }))
}

#[derive(Clone)]
pub struct HerepayClient {
    http: reqwest::Client,
    credentials: HerepayCredentials,
}

impl HerepayClient {
    pub fn new(credentials: HerepayCredentials, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, credentials })
    }

    pub fn credentials(&self) -> &HerepayCredentials {
        &self.credentials
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.credentials.base_url.trim_end_matches('/'), path)
    }

    /// Fetches the channels available to this merchant, active ones only.
    ///
    /// An unreachable or erroring API is an `ExternalApiError`, distinct
    /// from a reachable API with zero configured channels (empty Vec).
    #[instrument(skip(self))]
    pub async fn payment_channels(&self) -> Result<Vec<PaymentChannel>, ServiceError> {
        if !self.credentials.has_api_keys() {
            return Err(ServiceError::ConfigurationError(
                "api_key and secret_key are required for channel listing".to_string(),
            ));
        }

        let response = self
            .http
            .get(self.url(CHANNELS_PATH))
            .header("XApiKey", &self.credentials.api_key)
            .header("SecretKey", &self.credentials.secret_key)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| ServiceError::ExternalApiError(format!("channel listing unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalApiError(format!(
                "channel listing returned {}",
                response.status()
            )));
        }

        let body: ChannelListResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalApiError(format!("unreadable channel payload: {}", e)))?;

        Ok(flatten_channel_groups(body.data))
    }

    /// Submits the signed, form-encoded initiation request. The response
    /// body is the processor's HTML/script redirect payload, returned
    /// raw; the caller sanitizes it before it reaches a browser.
    #[instrument(skip(self, fields), fields(payment_code = fields.get("payment_code").map(String::as_str).unwrap_or("")))]
    pub async fn initiate(&self, fields: &BTreeMap<String, String>) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(self.url(INITIATE_PATH))
            .header("XApiKey", &self.credentials.api_key)
            .header("SecretKey", &self.credentials.secret_key)
            .form(fields)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalApiError(format!("initiate call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body.chars().take(256).collect::<String>(), "Initiate rejected by processor");
            return Err(ServiceError::ExternalApiError(format!(
                "initiate returned {}",
                status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ServiceError::ExternalApiError(format!("unreadable initiate payload: {}", e)))
    }

    /// Polls the processor for the current state of a payment code.
    /// Used interactively by operators; never part of reconciliation.
    #[instrument(skip(self))]
    pub async fn transaction_status(
        &self,
        payment_code: &str,
    ) -> Result<RemoteTransactionStatus, ServiceError> {
        if !self.credentials.has_api_keys() {
            return Err(ServiceError::ConfigurationError(
                "api_key and secret_key are required for status queries".to_string(),
            ));
        }

        let response = self
            .http
            .get(format!("{}/{}", self.url(TRANSACTIONS_PATH), payment_code))
            .header("XApiKey", &self.credentials.api_key)
            .header("SecretKey", &self.credentials.secret_key)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| ServiceError::ExternalApiError(format!("status query unreachable: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!(
                "processor has no transaction for payment code {}",
                payment_code
            )));
        }
        if !status.is_success() {
            return Err(ServiceError::ExternalApiError(format!(
                "status query returned {}",
                status
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalApiError(format!("unreadable status payload: {}", e)))?;

        serde_json::from_value(flatten_status_payload(value))
            .map_err(|e| ServiceError::ExternalApiError(format!("unrecognized status payload: {}", e)))
    }
}

/// Flattens method groups into one list and keeps active channels only.
/// Channels inherit the group's payment method when they carry none.
fn flatten_channel_groups(groups: Vec<ChannelGroup>) -> Vec<PaymentChannel> {
    groups
        .into_iter()
        .flat_map(|group| {
            let method = group.payment_method;
            group.channels.into_iter().map(move |mut channel| {
                if channel.payment_method.is_empty() {
                    channel.payment_method = method.clone();
                }
                channel
            })
        })
        .filter(|channel| channel.active)
        .collect()
}

/// The status endpoint answers either a flat object or `{"data": {...}}`.
fn flatten_status_payload(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(inner @ Value::Object(_)) => inner,
            Some(other) => {
                // A non-object `data` key is part of a flat payload; put it back.
                map.insert("data".to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}
