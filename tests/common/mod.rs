#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use herepay_gateway::{
    checksum,
    config::{AppConfig, HerepayConfig, HerepayEnvironment, PageConfig},
    db,
    entities::{order, order_item, order_note, payment_intent, product},
    entities::payment_intent::IntentStatus,
    events,
    services::{
        herepay::HerepayClient, order_store::SeaOrmOrderStore, payments::PaymentService,
        reconciliation::ReconciliationService,
    },
    AppState,
};

pub const PRIVATE_KEY: &str = "test-private-key";
pub const API_KEY: &str = "test-api-key";
pub const SECRET_KEY: &str = "test-secret-key";

pub const ORDER_RECEIVED_URL: &str = "http://shop.test/checkout/order-received";
pub const PAYMENT_RETRY_URL: &str = "http://shop.test/checkout/payment";
pub const CART_URL: &str = "http://shop.test/cart";
pub const ORDER_VIEW_URL: &str = "http://shop.test/my-account/orders";

/// Test harness: application state over a fresh in-memory SQLite database.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_credentials(API_KEY, SECRET_KEY, PRIVATE_KEY, None).await
    }

    /// Degraded mode: no signing key configured.
    pub async fn without_private_key() -> Self {
        Self::with_credentials(API_KEY, SECRET_KEY, "", None).await
    }

    /// Points the processor client at a mock server.
    pub async fn with_processor(base_url: &str) -> Self {
        Self::with_credentials(API_KEY, SECRET_KEY, PRIVATE_KEY, Some(base_url)).await
    }

    /// No credentials at all; initiation must fail fast.
    pub async fn unconfigured() -> Self {
        Self::with_credentials("", "", "", None).await
    }

    pub async fn with_credentials(
        api_key: &str,
        secret_key: &str,
        private_key: &str,
        base_url: Option<&str>,
    ) -> Self {
        let cfg = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            log_level: "warn".to_string(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: 1,
            db_min_connections: 1,
            store_name: "Test Store".to_string(),
            http_timeout_secs: 5,
            herepay: HerepayConfig {
                api_key: api_key.to_string(),
                secret_key: secret_key.to_string(),
                private_key: private_key.to_string(),
                environment: HerepayEnvironment::Sandbox,
                base_url: base_url.map(str::to_string),
                public_redirect_url: "http://127.0.0.1:8080/payments/redirect".to_string(),
            },
            pages: PageConfig {
                order_received_url: ORDER_RECEIVED_URL.to_string(),
                payment_retry_url: PAYMENT_RETRY_URL.to_string(),
                cart_url: CART_URL.to_string(),
                order_view_url: ORDER_VIEW_URL.to_string(),
            },
        };

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db = Arc::new(pool);

        let (event_sender, mut event_rx) = events::channel(64);
        // Drain events so senders never block on a full channel.
        tokio::spawn(async move { while event_rx.recv().await.is_some() {} });

        let credentials = cfg.herepay.credentials();
        let herepay = Arc::new(
            HerepayClient::new(credentials.clone(), Duration::from_secs(cfg.http_timeout_secs))
                .expect("failed to build client"),
        );
        let order_store = Arc::new(SeaOrmOrderStore::new(db.clone()));

        let payments = Arc::new(PaymentService::new(
            db.clone(),
            herepay.clone(),
            order_store.clone(),
            event_sender.clone(),
            cfg.store_name.clone(),
            cfg.herepay.public_redirect_url.clone(),
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            db.clone(),
            order_store.clone(),
            event_sender.clone(),
            credentials.private_key().map(str::to_string),
        ));

        let state = AppState {
            db,
            config: cfg,
            event_sender,
            herepay,
            payments,
            reconciliation,
            order_store,
        };

        Self {
            router: herepay_gateway::app_router(state.clone()),
            state,
        }
    }

    /// Inserts an unpaid order with one line item (quantity 2) backed by a
    /// product with 10 units in stock.
    pub async fn seed_order(&self, total: Decimal) -> Uuid {
        let order_id = Uuid::new_v4();
        let product_id = Uuid::new_v4();
        let now = Utc::now();

        order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!("ORD-{}", &order_id.simple().to_string()[..8])),
            status: Set("pending".to_string()),
            currency: Set("MYR".to_string()),
            total_amount: Set(total),
            billing_name: Set("Jane Shopper".to_string()),
            billing_email: Set("jane@example.com".to_string()),
            billing_phone: Set(None),
            transaction_id: Set(None),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to insert order");

        product::ActiveModel {
            id: Set(product_id),
            sku: Set(format!("SKU-{}", &product_id.simple().to_string()[..8])),
            name: Set("Widget".to_string()),
            stock_quantity: Set(10),
            created_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to insert product");

        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product_id),
            quantity: Set(2),
            unit_price: Set(total / Decimal::from(2)),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to insert order item");

        order_id
    }

    /// Inserts a payment intent directly, bypassing initiation.
    pub async fn seed_intent(
        &self,
        order_id: Uuid,
        payment_code: &str,
        status: IntentStatus,
        amount: Decimal,
    ) {
        payment_intent::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_code: Set(payment_code.to_string()),
            order_id: Set(order_id),
            amount: Set(amount),
            currency: Set("MYR".to_string()),
            bank_prefix: Set("TEST0021".to_string()),
            payment_method: Set("Online Banking".to_string()),
            status: Set(status.to_string()),
            transaction_id: Set(None),
            inventory_decremented: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to insert payment intent");
    }

    pub async fn intent(&self, payment_code: &str) -> payment_intent::Model {
        payment_intent::Entity::find()
            .filter(payment_intent::Column::PaymentCode.eq(payment_code))
            .one(&*self.state.db)
            .await
            .expect("intent query failed")
            .expect("intent not found")
    }

    pub async fn order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("order query failed")
            .expect("order not found")
    }

    /// Stock of the (single) product behind the order's line item.
    pub async fn product_stock(&self, order_id: Uuid) -> i32 {
        let item = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .one(&*self.state.db)
            .await
            .expect("item query failed")
            .expect("order item not found");

        product::Entity::find_by_id(item.product_id)
            .one(&*self.state.db)
            .await
            .expect("product query failed")
            .expect("product not found")
            .stock_quantity
    }

    pub async fn notes(&self, order_id: Uuid) -> Vec<order_note::Model> {
        order_note::Entity::find()
            .filter(order_note::Column::OrderId.eq(order_id))
            .order_by_asc(order_note::Column::CreatedAt)
            .all(&*self.state.db)
            .await
            .expect("notes query failed")
    }
}

/// Builds an event field map and signs it with the given key.
pub fn signed_fields(pairs: &[(&str, &str)], private_key: &str) -> BTreeMap<String, String> {
    let mut fields: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let digest = checksum::sign(&fields, private_key);
    fields.insert(checksum::CHECKSUM_FIELD.to_string(), digest);
    fields
}

/// Unsigned variant for degraded-mode and rejection tests.
pub fn unsigned_fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Percent-encodes a field map as a form/query string.
pub fn form_encode(fields: &BTreeMap<String, String>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
