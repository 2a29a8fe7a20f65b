//! Payment initiation: builds the signed request, records the intent,
//! and relays the processor's hosted-payment redirect to the shopper.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, QuerySelect, Set};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::checksum;
use crate::entities::payment_intent::{self, IntentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::html::sanitize_redirect_payload;
use crate::services::herepay::HerepayClient;
use crate::services::order_store::OrderStore;

/// Placeholder the processor accepts when an order has no phone number
const FALLBACK_PHONE: &str = "0123456789";

/// Result of a successful initiation: the correlation id and the
/// sanitized redirect payload for the shopper's browser.
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub payment_code: String,
    pub html: String,
}

pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    client: Arc<HerepayClient>,
    order_store: Arc<dyn OrderStore>,
    event_sender: EventSender,
    store_name: String,
    redirect_url: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        client: Arc<HerepayClient>,
        order_store: Arc<dyn OrderStore>,
        event_sender: EventSender,
        store_name: String,
        redirect_url: String,
    ) -> Self {
        Self {
            db,
            client,
            order_store,
            event_sender,
            store_name,
            redirect_url,
        }
    }

    /// Starts a payment for an order through the selected channel.
    ///
    /// The intent row is persisted in status Created before the outbound
    /// call; a transport failure surfaces to the caller with the order
    /// untouched and unpaid.
    #[instrument(skip(self))]
    pub async fn initiate_payment(
        &self,
        order_id: Uuid,
        bank_prefix: &str,
        payment_method: &str,
    ) -> Result<InitiatedPayment, ServiceError> {
        let credentials = self.client.credentials();
        if !credentials.is_complete() {
            return Err(ServiceError::ConfigurationError(
                "Herepay credentials not configured: api_key, secret_key and private_key are all required".to_string(),
            ));
        }
        let private_key = credentials.private_key().ok_or_else(|| {
            ServiceError::ConfigurationError("private_key is required for initiation".to_string())
        })?;

        let order = self
            .order_store
            .find(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        if order.paid {
            return Err(ServiceError::ValidationError(format!(
                "order {} is already paid",
                order.order_number
            )));
        }

        let payment_code = generate_payment_code();
        let now = Utc::now();
        let amount = order.total_amount.round_dp(2);

        let phone = order
            .billing_phone
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(FALLBACK_PHONE)
            .to_string();

        let mut fields = BTreeMap::new();
        fields.insert("payment_code".to_string(), payment_code.clone());
        fields.insert(
            "created_at".to_string(),
            now.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        fields.insert("amount".to_string(), format!("{:.2}", amount));
        fields.insert("name".to_string(), order.billing_name.clone());
        fields.insert("email".to_string(), order.billing_email.clone());
        fields.insert("phone".to_string(), phone);
        fields.insert(
            "description".to_string(),
            format!("Order #{} from {}", order.order_number, self.store_name),
        );
        fields.insert("bank_prefix".to_string(), bank_prefix.to_string());
        fields.insert("payment_method".to_string(), payment_method.to_string());
        fields.insert("redirect_url".to_string(), self.redirect_url.clone());

        let digest = checksum::sign(&fields, private_key);
        fields.insert(checksum::CHECKSUM_FIELD.to_string(), digest);

        payment_intent::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_code: Set(payment_code.clone()),
            order_id: Set(order.id),
            amount: Set(amount),
            currency: Set(order.currency.clone()),
            bank_prefix: Set(bank_prefix.to_string()),
            payment_method: Set(payment_method.to_string()),
            status: Set(IntentStatus::Created.to_string()),
            transaction_id: Set(None),
            inventory_decremented: Set(false),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await?;

        info!(%order_id, %payment_code, %amount, "Payment intent created, calling processor");

        let body = self.client.initiate(&fields).await?;
        let html = sanitize_redirect_payload(&body);

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentInitiated {
                order_id: order.id,
                payment_code: payment_code.clone(),
                amount,
            })
            .await
        {
            warn!(error = %e, "Failed to emit initiation event");
        }

        Ok(InitiatedPayment { payment_code, html })
    }

    /// Most recent payment intents, newest first. Operator tooling.
    pub async fn recent_intents(
        &self,
        limit: u64,
    ) -> Result<Vec<payment_intent::Model>, ServiceError> {
        let intents = payment_intent::Entity::find()
            .order_by_desc(payment_intent::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await?;
        Ok(intents)
    }
}

/// High-entropy correlation id: a counter would let outsiders guess live
/// payment codes.
fn generate_payment_code() -> String {
    format!("HP-PAY-{}", Uuid::new_v4().simple().to_string().to_uppercase())
}
