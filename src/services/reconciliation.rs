//! Dual-path status reconciliation.
//!
//! The processor reports a payment's outcome twice: a server-to-server
//! webhook and the shopper's browser redirect, in either order, possibly
//! both, possibly repeated. Both ingress adapters normalize their payload
//! into a [`PaymentEvent`] and run it through the same pipeline here, so
//! authenticity, classification, and idempotency live in exactly one
//! place.
//!
//! The applied transition is a single conditional UPDATE on the intent
//! row (`status IN ('created', 'pending')`); its row count is the only
//! license to run side effects. Two racing completions cannot both
//! decrement inventory.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{info, instrument, warn};

use crate::checksum;
use crate::entities::payment_intent::{self, IntentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::order_store::OrderStore;

/// Absolute tolerance before an event amount counts as a discrepancy
fn amount_tolerance() -> Decimal {
    dec!(0.01)
}

/// Which path delivered the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Ingress {
    Webhook,
    Redirect,
}

/// Normalized inbound event: the full field map as strings (the checksum
/// is computed over all of it) plus typed accessors for the fields the
/// state machine reads.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub fields: BTreeMap<String, String>,
}

impl PaymentEvent {
    /// Decodes a webhook/redirect body. JSON is attempted first; anything
    /// that is not a JSON object falls back to form-decoding, matching
    /// the processor's two delivery formats.
    pub fn from_body(bytes: &[u8]) -> Result<Self, ServiceError> {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
            if let Some(object) = value.as_object() {
                return Ok(Self {
                    fields: checksum::normalize_fields(object),
                });
            }
        }

        let fields: BTreeMap<String, String> = url::form_urlencoded::parse(bytes)
            .into_owned()
            .collect();

        if fields.is_empty() {
            return Err(ServiceError::BadRequest(
                "empty or undecodable event payload".to_string(),
            ));
        }

        Ok(Self { fields })
    }

    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn payment_code(&self) -> Option<&str> {
        self.get("payment_code")
    }

    pub fn status(&self) -> Option<&str> {
        self.get("status")
    }

    pub fn status_code(&self) -> Option<&str> {
        self.get("status_code")
    }

    pub fn message(&self) -> Option<&str> {
        self.get("message")
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.get("transaction_id")
    }

    pub fn checksum(&self) -> Option<&str> {
        self.get(checksum::CHECKSUM_FIELD)
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.get("amount").and_then(|raw| raw.parse().ok())
    }
}

/// What the processor's heterogeneous vocabulary says happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Failure { unauthorized: bool },
    Pending,
    Unknown,
}

/// Classifies an event across the processor's inconsistent signals.
///
/// Success is an OR over three independent surfaces (`status_code`,
/// `status`, `message`); each disjunct is evaluated because integrations
/// see any subset of them populated depending on the delivery path.
pub fn classify(event: &PaymentEvent) -> StatusClass {
    let status = event.status().unwrap_or("").to_ascii_lowercase();
    let message = event.message().unwrap_or("").to_ascii_lowercase();
    let code = event.status_code().unwrap_or("");

    let code_says_success = code == "00";
    let status_says_success = matches!(status.as_str(), "success" | "completed");
    let message_says_approved = message == "approved";
    if code_says_success || status_says_success || message_says_approved {
        return StatusClass::Success;
    }

    let unauthorized = status == "unauthorized" || message == "unauthorized";
    let code_says_failure = matches!(code, "30" | "41");
    let vocab_says_failure = matches!(status.as_str(), "failed" | "cancelled")
        || matches!(message.as_str(), "failed" | "cancelled");
    if code_says_failure || vocab_says_failure || unauthorized {
        return StatusClass::Failure { unauthorized };
    }

    if code == "29" || matches!(status.as_str(), "pending" | "processing") {
        return StatusClass::Pending;
    }

    StatusClass::Unknown
}

/// Planned transition for an event against the current intent state.
/// Pure; the async apply step holds all database access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionPlan {
    Complete,
    Fail { unauthorized: bool },
    MarkPending,
    AnnotateOnly(&'static str),
}

/// Transitions are monotonic: terminal states are never regressed or
/// overwritten. A success replay still routes through Complete so the
/// conditional update can detect the duplicate and the shopper lands on
/// the confirmation page.
pub fn plan(current: IntentStatus, class: StatusClass) -> TransitionPlan {
    match class {
        StatusClass::Success => {
            if current.is_terminal() && !current.is_paid() {
                TransitionPlan::AnnotateOnly("success event after failed settlement")
            } else {
                TransitionPlan::Complete
            }
        }
        StatusClass::Failure { unauthorized } => {
            if current.is_terminal() {
                TransitionPlan::AnnotateOnly("failure event after settlement")
            } else {
                TransitionPlan::Fail { unauthorized }
            }
        }
        StatusClass::Pending => {
            if current.is_terminal() {
                TransitionPlan::AnnotateOnly("pending event after settlement")
            } else {
                TransitionPlan::MarkPending
            }
        }
        StatusClass::Unknown => TransitionPlan::AnnotateOnly("unrecognized status vocabulary"),
    }
}

/// How an accepted event was resolved. Ingress adapters translate this
/// into an HTTP status or a shopper-facing redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    Completed {
        newly_completed: bool,
        amount_mismatch: bool,
    },
    Failed {
        unauthorized: bool,
    },
    Pending,
    Ignored {
        reason: String,
    },
}

impl ReconciliationOutcome {
    fn audit_label(&self) -> String {
        match self {
            Self::Completed {
                newly_completed: true,
                ..
            } => "completed".to_string(),
            Self::Completed {
                newly_completed: false,
                ..
            } => "duplicate success (already completed)".to_string(),
            Self::Failed { unauthorized: true } => "unauthorized".to_string(),
            Self::Failed {
                unauthorized: false,
            } => "failed".to_string(),
            Self::Pending => "pending".to_string(),
            Self::Ignored { reason } => format!("ignored: {}", reason),
        }
    }
}

pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    order_store: Arc<dyn OrderStore>,
    event_sender: EventSender,
    /// None runs the gateway in degraded mode: unsigned events accepted
    private_key: Option<String>,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        order_store: Arc<dyn OrderStore>,
        event_sender: EventSender,
        private_key: Option<String>,
    ) -> Self {
        Self {
            db,
            order_store,
            event_sender,
            private_key,
        }
    }

    /// Runs one inbound event through lookup, authenticity, classification
    /// and the idempotent transition. Every accepted event leaves an audit
    /// note on the order; every rejection is logged with the raw payload.
    #[instrument(skip(self, event), fields(source = %source))]
    pub async fn process_event(
        &self,
        event: &PaymentEvent,
        source: Ingress,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        let payment_code = event
            .payment_code()
            .ok_or_else(|| ServiceError::BadRequest("event is missing payment_code".to_string()))?
            .to_string();

        let intent = payment_intent::Entity::find()
            .filter(payment_intent::Column::PaymentCode.eq(payment_code.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                warn!(%payment_code, raw = ?event.fields, "Event for unknown payment code");
                ServiceError::NotFound(format!(
                    "no payment intent for payment code {}",
                    payment_code
                ))
            })?;

        self.verify_authenticity(event, &intent).await?;

        let class = classify(event);
        let current = intent.intent_status();

        let outcome = match plan(current, class) {
            TransitionPlan::Complete => self.apply_completion(&intent, event).await?,
            TransitionPlan::Fail { unauthorized } => {
                self.apply_failure(&intent, unauthorized).await?
            }
            TransitionPlan::MarkPending => self.apply_pending(&intent).await?,
            TransitionPlan::AnnotateOnly(reason) => {
                info!(%payment_code, ?class, %current, reason, "Event left intent state unchanged");
                ReconciliationOutcome::Ignored {
                    reason: reason.to_string(),
                }
            }
        };

        self.append_event_note(&intent, event, source, &outcome)
            .await?;

        Ok(outcome)
    }

    /// Checksum gate. With a configured private key every event must carry
    /// a matching digest; without one (degraded/test mode) unsigned events
    /// pass with a warning — a known weak point, surfaced in the logs.
    async fn verify_authenticity(
        &self,
        event: &PaymentEvent,
        intent: &payment_intent::Model,
    ) -> Result<(), ServiceError> {
        let Some(key) = self.private_key.as_deref() else {
            warn!(
                payment_code = %intent.payment_code,
                "Accepting event without checksum verification: no private key configured"
            );
            return Ok(());
        };

        match event.checksum() {
            Some(claimed) if checksum::verify(&event.fields, claimed, key) => Ok(()),
            claimed => {
                let reason = if claimed.is_none() {
                    "missing checksum"
                } else {
                    "checksum mismatch"
                };
                warn!(
                    payment_code = %intent.payment_code,
                    raw = ?event.fields,
                    reason,
                    "Rejected unauthenticated event"
                );
                self.order_store
                    .append_audit_note(
                        intent.order_id,
                        &format!(
                            "herepay: rejected event for {} ({}); fields: {}",
                            intent.payment_code,
                            reason,
                            serde_json::to_string(&event.fields).unwrap_or_default()
                        ),
                    )
                    .await?;
                Err(ServiceError::Unauthorized(format!(
                    "{} for payment code {}",
                    reason, intent.payment_code
                )))
            }
        }
    }

    async fn apply_completion(
        &self,
        intent: &payment_intent::Model,
        event: &PaymentEvent,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        let order = self
            .order_store
            .find(intent.order_id)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "payment intent {} references missing order {}",
                    intent.payment_code, intent.order_id
                ))
            })?;

        // Amount mismatches are recorded, not blocking: stranding a
        // settled payment on a rounding difference costs more than the
        // annotation. The audit note keeps the gap visible.
        let mut amount_mismatch = false;
        if let Some(amount) = event.amount() {
            if (amount - order.total_amount).abs() > amount_tolerance() {
                amount_mismatch = true;
                warn!(
                    payment_code = %intent.payment_code,
                    event_amount = %amount,
                    order_total = %order.total_amount,
                    "Amount discrepancy on successful payment"
                );
                self.order_store
                    .append_audit_note(
                        intent.order_id,
                        &format!(
                            "herepay: amount discrepancy on {}: event reported {}, order total {}",
                            intent.payment_code, amount, order.total_amount
                        ),
                    )
                    .await?;
            }
        }

        let transaction_id = event.transaction_id().map(str::to_string);
        let now = Utc::now();

        let mut update = payment_intent::Entity::update_many()
            .col_expr(
                payment_intent::Column::Status,
                Expr::value(IntentStatus::Completed.to_string()),
            )
            .col_expr(payment_intent::Column::UpdatedAt, Expr::value(Some(now)));
        if let Some(txn) = &transaction_id {
            update = update.col_expr(
                payment_intent::Column::TransactionId,
                Expr::value(Some(txn.clone())),
            );
        }
        let result = update
            .filter(payment_intent::Column::PaymentCode.eq(intent.payment_code.as_str()))
            .filter(payment_intent::Column::Status.is_in(IntentStatus::open_statuses()))
            .exec(&*self.db)
            .await?;

        let newly_completed = result.rows_affected > 0;

        if newly_completed {
            // Side effects run exactly once, licensed by the row count.
            self.order_store.decrement_inventory(intent.order_id).await?;
            payment_intent::Entity::update_many()
                .col_expr(
                    payment_intent::Column::InventoryDecremented,
                    Expr::value(true),
                )
                .filter(payment_intent::Column::PaymentCode.eq(intent.payment_code.as_str()))
                .exec(&*self.db)
                .await?;

            self.order_store
                .mark_payment_complete(intent.order_id, transaction_id.clone())
                .await?;

            info!(
                payment_code = %intent.payment_code,
                order_id = %intent.order_id,
                ?transaction_id,
                "Payment completed"
            );

            if let Err(e) = self
                .event_sender
                .send(Event::PaymentCompleted {
                    order_id: intent.order_id,
                    payment_code: intent.payment_code.clone(),
                    transaction_id,
                })
                .await
            {
                warn!(error = %e, "Failed to emit completion event");
            }
        } else {
            info!(
                payment_code = %intent.payment_code,
                "Duplicate success event; completion already applied"
            );
        }

        Ok(ReconciliationOutcome::Completed {
            newly_completed,
            amount_mismatch,
        })
    }

    async fn apply_failure(
        &self,
        intent: &payment_intent::Model,
        unauthorized: bool,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        let target = if unauthorized {
            IntentStatus::Unauthorized
        } else {
            IntentStatus::Failed
        };
        let now = Utc::now();

        let result = payment_intent::Entity::update_many()
            .col_expr(payment_intent::Column::Status, Expr::value(target.to_string()))
            .col_expr(payment_intent::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(payment_intent::Column::PaymentCode.eq(intent.payment_code.as_str()))
            .filter(payment_intent::Column::Status.is_in(IntentStatus::open_statuses()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            if intent.inventory_decremented {
                self.order_store.restore_inventory(intent.order_id).await?;
                payment_intent::Entity::update_many()
                    .col_expr(
                        payment_intent::Column::InventoryDecremented,
                        Expr::value(false),
                    )
                    .filter(payment_intent::Column::PaymentCode.eq(intent.payment_code.as_str()))
                    .exec(&*self.db)
                    .await?;
            }

            self.order_store
                .transition_status(
                    intent.order_id,
                    "failed",
                    &format!(
                        "herepay: payment {} {}",
                        intent.payment_code,
                        if unauthorized {
                            "rejected as unauthorized"
                        } else {
                            "failed"
                        }
                    ),
                )
                .await?;

            warn!(
                payment_code = %intent.payment_code,
                order_id = %intent.order_id,
                unauthorized,
                "Payment failed"
            );

            if let Err(e) = self
                .event_sender
                .send(Event::PaymentFailed {
                    order_id: intent.order_id,
                    payment_code: intent.payment_code.clone(),
                    unauthorized,
                })
                .await
            {
                warn!(error = %e, "Failed to emit failure event");
            }
        }

        Ok(ReconciliationOutcome::Failed { unauthorized })
    }

    async fn apply_pending(
        &self,
        intent: &payment_intent::Model,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        let now = Utc::now();
        let result = payment_intent::Entity::update_many()
            .col_expr(
                payment_intent::Column::Status,
                Expr::value(IntentStatus::Pending.to_string()),
            )
            .col_expr(payment_intent::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(payment_intent::Column::PaymentCode.eq(intent.payment_code.as_str()))
            .filter(payment_intent::Column::Status.is_in(IntentStatus::open_statuses()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 && intent.intent_status() == IntentStatus::Created {
            self.order_store
                .transition_status(
                    intent.order_id,
                    "on-hold",
                    &format!(
                        "herepay: payment {} awaiting processor confirmation",
                        intent.payment_code
                    ),
                )
                .await?;

            if let Err(e) = self
                .event_sender
                .send(Event::PaymentPending {
                    order_id: intent.order_id,
                    payment_code: intent.payment_code.clone(),
                })
                .await
            {
                warn!(error = %e, "Failed to emit pending event");
            }
        }

        Ok(ReconciliationOutcome::Pending)
    }

    /// The durable record: every accepted event lands on the order with
    /// its normalized fields, the ingress path, and the resolution.
    async fn append_event_note(
        &self,
        intent: &payment_intent::Model,
        event: &PaymentEvent,
        source: Ingress,
        outcome: &ReconciliationOutcome,
    ) -> Result<(), ServiceError> {
        let note = format!(
            "herepay: {} event for {} -> {}; fields: {}",
            source,
            intent.payment_code,
            outcome.audit_label(),
            serde_json::to_string(&event.fields).unwrap_or_default()
        );
        self.order_store
            .append_audit_note(intent.order_id, &note)
            .await
    }
}
