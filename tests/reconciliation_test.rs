mod common;

use std::sync::Arc;

use common::{signed_fields, unsigned_fields, TestApp, PRIVATE_KEY};
use rust_decimal_macros::dec;

use herepay_gateway::entities::payment_intent::IntentStatus;
use herepay_gateway::errors::ServiceError;
use herepay_gateway::services::reconciliation::{Ingress, PaymentEvent, ReconciliationOutcome};

#[tokio::test]
async fn success_event_completes_intent_and_order_exactly_once() {
    let app = TestApp::new().await;
    let order_id = app.seed_order(dec!(25.50)).await;
    app.seed_intent(order_id, "HP-PAY-A1", IntentStatus::Created, dec!(25.50))
        .await;

    let event = PaymentEvent::from_fields(signed_fields(
        &[
            ("payment_code", "HP-PAY-A1"),
            ("status_code", "00"),
            ("transaction_id", "TXN123"),
            ("amount", "25.50"),
        ],
        PRIVATE_KEY,
    ));

    let outcome = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconciliationOutcome::Completed {
            newly_completed: true,
            amount_mismatch: false
        }
    );

    let intent = app.intent("HP-PAY-A1").await;
    assert_eq!(intent.intent_status(), IntentStatus::Completed);
    assert_eq!(intent.transaction_id.as_deref(), Some("TXN123"));
    assert!(intent.inventory_decremented);

    let order = app.order(order_id).await;
    assert!(order.paid_at.is_some());
    assert_eq!(order.status, "processing");
    assert_eq!(order.transaction_id.as_deref(), Some("TXN123"));

    // Two units on the order, stock 10 -> 8
    assert_eq!(app.product_stock(order_id).await, 8);
    assert!(!app.notes(order_id).await.is_empty());
}

#[tokio::test]
async fn replayed_success_event_is_a_no_op_for_inventory() {
    let app = TestApp::new().await;
    let order_id = app.seed_order(dec!(40.00)).await;
    app.seed_intent(order_id, "HP-PAY-A2", IntentStatus::Created, dec!(40.00))
        .await;

    let event = PaymentEvent::from_fields(signed_fields(
        &[
            ("payment_code", "HP-PAY-A2"),
            ("status", "completed"),
            ("amount", "40.00"),
        ],
        PRIVATE_KEY,
    ));

    let first = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await
        .unwrap();
    let second = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Redirect)
        .await
        .unwrap();

    assert_eq!(
        first,
        ReconciliationOutcome::Completed {
            newly_completed: true,
            amount_mismatch: false
        }
    );
    assert_eq!(
        second,
        ReconciliationOutcome::Completed {
            newly_completed: false,
            amount_mismatch: false
        }
    );

    // Decrement fired exactly once
    assert_eq!(app.product_stock(order_id).await, 8);
    assert!(app.order(order_id).await.paid_at.is_some());
}

#[tokio::test]
async fn racing_completions_decrement_inventory_once() {
    let app = Arc::new(TestApp::new().await);
    let order_id = app.seed_order(dec!(10.00)).await;
    app.seed_intent(order_id, "HP-PAY-RACE", IntentStatus::Created, dec!(10.00))
        .await;

    let fields = signed_fields(
        &[("payment_code", "HP-PAY-RACE"), ("status_code", "00")],
        PRIVATE_KEY,
    );

    let mut handles = Vec::new();
    for _ in 0..2 {
        let app = app.clone();
        let fields = fields.clone();
        handles.push(tokio::spawn(async move {
            let event = PaymentEvent::from_fields(fields);
            app.state
                .reconciliation
                .process_event(&event, Ingress::Webhook)
                .await
        }));
    }

    let mut fresh_completions = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ReconciliationOutcome::Completed {
                newly_completed: true,
                ..
            } => fresh_completions += 1,
            ReconciliationOutcome::Completed { .. } => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    assert_eq!(fresh_completions, 1);
    assert_eq!(app.product_stock(order_id).await, 8);
}

#[tokio::test]
async fn pending_then_success_walks_the_state_machine() {
    let app = TestApp::new().await;
    let order_id = app.seed_order(dec!(15.00)).await;
    app.seed_intent(order_id, "HP-PAY-A3", IntentStatus::Created, dec!(15.00))
        .await;

    let pending = PaymentEvent::from_fields(signed_fields(
        &[("payment_code", "HP-PAY-A3"), ("status_code", "29")],
        PRIVATE_KEY,
    ));
    let outcome = app
        .state
        .reconciliation
        .process_event(&pending, Ingress::Webhook)
        .await
        .unwrap();
    assert_eq!(outcome, ReconciliationOutcome::Pending);
    assert_eq!(
        app.intent("HP-PAY-A3").await.intent_status(),
        IntentStatus::Pending
    );
    assert_eq!(app.order(order_id).await.status, "on-hold");

    let success = PaymentEvent::from_fields(signed_fields(
        &[("payment_code", "HP-PAY-A3"), ("status", "Success")],
        PRIVATE_KEY,
    ));
    let outcome = app
        .state
        .reconciliation
        .process_event(&success, Ingress::Webhook)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconciliationOutcome::Completed {
            newly_completed: true,
            amount_mismatch: false
        }
    );
    assert_eq!(
        app.intent("HP-PAY-A3").await.intent_status(),
        IntentStatus::Completed
    );
}

#[tokio::test]
async fn pending_after_completion_never_regresses() {
    let app = TestApp::new().await;
    let order_id = app.seed_order(dec!(20.00)).await;
    app.seed_intent(order_id, "HP-PAY-A4", IntentStatus::Completed, dec!(20.00))
        .await;

    let pending = PaymentEvent::from_fields(signed_fields(
        &[("payment_code", "HP-PAY-A4"), ("status", "pending")],
        PRIVATE_KEY,
    ));

    let outcome = app
        .state
        .reconciliation
        .process_event(&pending, Ingress::Webhook)
        .await
        .unwrap();

    match outcome {
        ReconciliationOutcome::Ignored { .. } => {}
        other => panic!("expected Ignored, got {:?}", other),
    }
    assert_eq!(
        app.intent("HP-PAY-A4").await.intent_status(),
        IntentStatus::Completed
    );
    // Annotate-only still leaves the audit record
    assert_eq!(app.notes(order_id).await.len(), 1);
}

#[tokio::test]
async fn failure_event_fails_intent_and_order() {
    let app = TestApp::new().await;
    let order_id = app.seed_order(dec!(30.00)).await;
    app.seed_intent(order_id, "HP-PAY-A5", IntentStatus::Pending, dec!(30.00))
        .await;

    let event = PaymentEvent::from_fields(signed_fields(
        &[("payment_code", "HP-PAY-A5"), ("status_code", "30")],
        PRIVATE_KEY,
    ));

    let outcome = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconciliationOutcome::Failed {
            unauthorized: false
        }
    );
    assert_eq!(
        app.intent("HP-PAY-A5").await.intent_status(),
        IntentStatus::Failed
    );
    assert_eq!(app.order(order_id).await.status, "failed");
    // Nothing was decremented, so nothing is restored
    assert_eq!(app.product_stock(order_id).await, 10);
}

#[tokio::test]
async fn unauthorized_vocabulary_gets_its_own_terminal_status() {
    let app = TestApp::new().await;
    let order_id = app.seed_order(dec!(12.00)).await;
    app.seed_intent(order_id, "HP-PAY-A6", IntentStatus::Created, dec!(12.00))
        .await;

    let event = PaymentEvent::from_fields(signed_fields(
        &[("payment_code", "HP-PAY-A6"), ("status", "Unauthorized")],
        PRIVATE_KEY,
    ));

    let outcome = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await
        .unwrap();

    assert_eq!(outcome, ReconciliationOutcome::Failed { unauthorized: true });
    assert_eq!(
        app.intent("HP-PAY-A6").await.intent_status(),
        IntentStatus::Unauthorized
    );
}

#[tokio::test]
async fn checksum_mismatch_never_mutates_state() {
    let app = TestApp::new().await;
    let order_id = app.seed_order(dec!(50.00)).await;
    app.seed_intent(order_id, "HP-PAY-A7", IntentStatus::Created, dec!(50.00))
        .await;

    // Signed with the wrong key, status claims success
    let event = PaymentEvent::from_fields(signed_fields(
        &[("payment_code", "HP-PAY-A7"), ("status_code", "00")],
        "attacker-key",
    ));

    let result = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await;

    match result {
        Err(ServiceError::Unauthorized(_)) => {}
        other => panic!("expected Unauthorized, got {:?}", other),
    }

    let intent = app.intent("HP-PAY-A7").await;
    assert_eq!(intent.intent_status(), IntentStatus::Created);
    assert!(app.order(order_id).await.paid_at.is_none());
    assert_eq!(app.product_stock(order_id).await, 10);

    // The rejection itself is audited
    let notes = app.notes(order_id).await;
    assert_eq!(notes.len(), 1);
    assert!(notes[0].note.contains("rejected"));
}

#[tokio::test]
async fn missing_checksum_is_rejected_when_a_key_is_configured() {
    let app = TestApp::new().await;
    let order_id = app.seed_order(dec!(18.00)).await;
    app.seed_intent(order_id, "HP-PAY-A8", IntentStatus::Created, dec!(18.00))
        .await;

    let event = PaymentEvent::from_fields(unsigned_fields(&[
        ("payment_code", "HP-PAY-A8"),
        ("status_code", "00"),
    ]));

    let result = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await;

    assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    assert_eq!(
        app.intent("HP-PAY-A8").await.intent_status(),
        IntentStatus::Created
    );
}

#[tokio::test]
async fn unsigned_events_pass_in_degraded_mode() {
    let app = TestApp::without_private_key().await;
    let order_id = app.seed_order(dec!(22.00)).await;
    app.seed_intent(order_id, "HP-PAY-A9", IntentStatus::Created, dec!(22.00))
        .await;

    let event = PaymentEvent::from_fields(unsigned_fields(&[
        ("payment_code", "HP-PAY-A9"),
        ("status", "success"),
    ]));

    let outcome = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconciliationOutcome::Completed {
            newly_completed: true,
            amount_mismatch: false
        }
    );
}

#[tokio::test]
async fn unknown_status_annotates_without_transitioning() {
    let app = TestApp::new().await;
    let order_id = app.seed_order(dec!(33.00)).await;
    app.seed_intent(order_id, "HP-PAY-B1", IntentStatus::Created, dec!(33.00))
        .await;

    let event = PaymentEvent::from_fields(signed_fields(
        &[("payment_code", "HP-PAY-B1"), ("status", "xyz")],
        PRIVATE_KEY,
    ));

    let outcome = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await
        .unwrap();

    match outcome {
        ReconciliationOutcome::Ignored { reason } => {
            assert!(reason.contains("unrecognized"));
        }
        other => panic!("expected Ignored, got {:?}", other),
    }

    assert_eq!(
        app.intent("HP-PAY-B1").await.intent_status(),
        IntentStatus::Created
    );
    let notes = app.notes(order_id).await;
    assert_eq!(notes.len(), 1);
    assert!(notes[0].note.contains("ignored"));
}

#[tokio::test]
async fn amount_discrepancy_is_recorded_but_not_blocking() {
    let app = TestApp::new().await;
    let order_id = app.seed_order(dec!(25.50)).await;
    app.seed_intent(order_id, "HP-PAY-B2", IntentStatus::Created, dec!(25.50))
        .await;

    let event = PaymentEvent::from_fields(signed_fields(
        &[
            ("payment_code", "HP-PAY-B2"),
            ("status_code", "00"),
            ("amount", "30.00"),
        ],
        PRIVATE_KEY,
    ));

    let outcome = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconciliationOutcome::Completed {
            newly_completed: true,
            amount_mismatch: true
        }
    );
    assert!(app.order(order_id).await.paid_at.is_some());

    let notes = app.notes(order_id).await;
    assert!(notes.iter().any(|n| n.note.contains("discrepancy")));
}

#[tokio::test]
async fn rounding_differences_within_tolerance_are_not_discrepancies() {
    let app = TestApp::new().await;
    let order_id = app.seed_order(dec!(25.50)).await;
    app.seed_intent(order_id, "HP-PAY-B3", IntentStatus::Created, dec!(25.50))
        .await;

    let event = PaymentEvent::from_fields(signed_fields(
        &[
            ("payment_code", "HP-PAY-B3"),
            ("status_code", "00"),
            ("amount", "25.51"),
        ],
        PRIVATE_KEY,
    ));

    let outcome = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconciliationOutcome::Completed {
            newly_completed: true,
            amount_mismatch: false
        }
    );
}

#[tokio::test]
async fn unknown_payment_code_is_not_found() {
    let app = TestApp::new().await;

    let event = PaymentEvent::from_fields(signed_fields(
        &[("payment_code", "HP-PAY-NOPE"), ("status_code", "00")],
        PRIVATE_KEY,
    ));

    let result = app
        .state
        .reconciliation
        .process_event(&event, Ingress::Webhook)
        .await;

    assert!(matches!(result, Err(ServiceError::NotFound(_))));
}
