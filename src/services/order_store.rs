//! Boundary to the host platform's order storage.
//!
//! The gateway never owns orders: it reads billing data and totals,
//! requests status transitions, and appends audit notes through this
//! trait. The sea-orm implementation runs against the platform's tables;
//! tests substitute a mock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{order, order_item, order_note, payment_intent, product};
use crate::errors::ServiceError;

/// Read view of a host platform order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub id: Uuid,
    pub order_number: String,
    pub status: String,
    pub currency: String,
    pub total_amount: Decimal,
    pub billing_name: String,
    pub billing_email: String,
    pub billing_phone: Option<String>,
    pub paid: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find(&self, order_id: Uuid) -> Result<Option<OrderRecord>, ServiceError>;

    async fn find_by_payment_code(
        &self,
        payment_code: &str,
    ) -> Result<Option<OrderRecord>, ServiceError>;

    async fn is_paid(&self, order_id: Uuid) -> Result<bool, ServiceError>;

    /// Sets a new order status and records why.
    async fn transition_status(
        &self,
        order_id: Uuid,
        new_status: &str,
        note: &str,
    ) -> Result<(), ServiceError>;

    /// Marks the order paid. Conditional on the order not being paid yet;
    /// returns true only when this call performed the transition.
    async fn mark_payment_complete(
        &self,
        order_id: Uuid,
        transaction_id: Option<String>,
    ) -> Result<bool, ServiceError>;

    /// Appends to the order's durable audit trail.
    async fn append_audit_note(&self, order_id: Uuid, text: &str) -> Result<(), ServiceError>;

    async fn decrement_inventory(&self, order_id: Uuid) -> Result<(), ServiceError>;

    async fn restore_inventory(&self, order_id: Uuid) -> Result<(), ServiceError>;
}

/// `OrderStore` over the host platform's database.
#[derive(Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn record(model: order::Model) -> OrderRecord {
        let paid = model.paid_at.is_some();
        OrderRecord {
            id: model.id,
            order_number: model.order_number,
            status: model.status,
            currency: model.currency,
            total_amount: model.total_amount,
            billing_name: model.billing_name,
            billing_email: model.billing_email,
            billing_phone: model.billing_phone,
            paid,
        }
    }

    /// Applies a stock delta to every line item of the order.
    async fn adjust_inventory(&self, order_id: Uuid, restore: bool) -> Result<(), ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        for item in items {
            let delta = if restore {
                Expr::col(product::Column::StockQuantity).add(item.quantity)
            } else {
                Expr::col(product::Column::StockQuantity).sub(item.quantity)
            };

            product::Entity::update_many()
                .col_expr(product::Column::StockQuantity, delta)
                .filter(product::Column::Id.eq(item.product_id))
                .exec(&*self.db)
                .await?;
        }

        info!(%order_id, restore, "Adjusted inventory for order");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    async fn find(&self, order_id: Uuid) -> Result<Option<OrderRecord>, ServiceError> {
        let model = order::Entity::find_by_id(order_id).one(&*self.db).await?;
        Ok(model.map(Self::record))
    }

    async fn find_by_payment_code(
        &self,
        payment_code: &str,
    ) -> Result<Option<OrderRecord>, ServiceError> {
        let Some(intent) = payment_intent::Entity::find()
            .filter(payment_intent::Column::PaymentCode.eq(payment_code))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        self.find(intent.order_id).await
    }

    async fn is_paid(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self
            .find(order_id)
            .await?
            .map(|order| order.paid)
            .unwrap_or(false))
    }

    #[instrument(skip(self, note))]
    async fn transition_status(
        &self,
        order_id: Uuid,
        new_status: &str,
        note: &str,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db)
            .await?;

        self.append_audit_note(order_id, note).await
    }

    #[instrument(skip(self))]
    async fn mark_payment_complete(
        &self,
        order_id: Uuid,
        transaction_id: Option<String>,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value("processing"))
            .col_expr(order::Column::PaidAt, Expr::value(Some(now)))
            .col_expr(order::Column::TransactionId, Expr::value(transaction_id))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaidAt.is_null())
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn append_audit_note(&self, order_id: Uuid, text: &str) -> Result<(), ServiceError> {
        order_note::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            note: Set(text.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        Ok(())
    }

    async fn decrement_inventory(&self, order_id: Uuid) -> Result<(), ServiceError> {
        self.adjust_inventory(order_id, false).await
    }

    async fn restore_inventory(&self, order_id: Uuid) -> Result<(), ServiceError> {
        self.adjust_inventory(order_id, true).await
    }
}
