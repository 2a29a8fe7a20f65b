use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a payment intent.
///
/// `created -> pending -> {completed, failed}`; `created -> completed`
/// directly on fast settlement. Unauthorized is the failure family with
/// its own label so disputes can tell a decline from a forged event.
/// Unknown processor vocabularies never become a stored status.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Created,
    Pending,
    Completed,
    Failed,
    Unauthorized,
}

impl IntentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Unauthorized)
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Statuses the reconciliation transition may move away from
    pub fn open_statuses() -> [String; 2] {
        [Self::Created.to_string(), Self::Pending.to_string()]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_intents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Processor-visible correlation id, immutable once assigned
    #[sea_orm(unique)]
    pub payment_code: String,

    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub bank_prefix: String,
    pub payment_method: String,
    pub status: String,

    /// Processor-assigned id, set when the payment settles
    pub transaction_id: Option<String>,

    /// Guards the compensating stock increment on failure
    pub inventory_decremented: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Stored status as the typed enum. A row only ever holds values
    /// written from `IntentStatus`, so parse failures do not occur in
    /// practice; an unreadable value is treated as still-open.
    pub fn intent_status(&self) -> IntentStatus {
        self.status.parse().unwrap_or(IntentStatus::Created)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
