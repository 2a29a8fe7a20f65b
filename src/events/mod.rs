use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the gateway. Consumed in-process; the host
/// platform's accounting hooks subscribe here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PaymentInitiated {
        order_id: Uuid,
        payment_code: String,
        amount: Decimal,
    },
    PaymentCompleted {
        order_id: Uuid,
        payment_code: String,
        transaction_id: Option<String>,
    },
    PaymentFailed {
        order_id: Uuid,
        payment_code: String,
        unauthorized: bool,
    },
    PaymentPending {
        order_id: Uuid,
        payment_code: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. Delivery failure is reported, not
    /// fatal: reconciliation outcomes are already durable by the time an
    /// event is emitted.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates the event channel used by the application.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Consumes events for the lifetime of the process, logging each one.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::PaymentInitiated {
                order_id,
                payment_code,
                amount,
            } => {
                info!(%order_id, %payment_code, %amount, "Payment initiated");
            }
            Event::PaymentCompleted {
                order_id,
                payment_code,
                transaction_id,
            } => {
                info!(%order_id, %payment_code, ?transaction_id, "Payment completed");
            }
            Event::PaymentFailed {
                order_id,
                payment_code,
                unauthorized,
            } => {
                warn!(%order_id, %payment_code, unauthorized, "Payment failed");
            }
            Event::PaymentPending {
                order_id,
                payment_code,
            } => {
                info!(%order_id, %payment_code, "Payment pending");
            }
        }
    }
    info!("Event channel closed; event processor exiting");
}
