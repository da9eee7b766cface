//! Client orchestration: receipt enforcement, retry budget, cancellation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use keon_client::gateway::testing::{
    receipt_for, AllowAllGateway, RecordingSleeper, ScriptedGateway,
};
use keon_client::{CancellationToken, DecideParams, Gateway, KeonClient, RetryPolicy};
use keon_types::{
    CorrelationId, DecideRequest, DecideRequestFields, Decision, DecisionReceipt, ErrorCode,
    ExecuteRequest, ExecutionResult, KeonError, KeonResult, ReceiptId,
};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn params() -> DecideParams {
    DecideParams::new(
        "tenant-123",
        "user-456",
        "execute_workflow",
        "workflow",
        "workflow-789",
    )
    .with_subject(json!({"workflow": "workflow-789", "priority": "high"}))
}

fn receipt(decision: Decision, expires_in: Option<chrono::Duration>) -> DecisionReceipt {
    let now = Utc::now();
    let mut builder = DecisionReceipt::builder()
        .receipt_id(ReceiptId::generate().to_string())
        .decision(decision)
        .correlation_id(CorrelationId::generate("tenant-123").unwrap().to_string())
        .tenant_id("tenant-123")
        .actor_id("user-456")
        .decided_at(now)
        .reason("Policy denies this action");
    if let Some(ttl) = expires_in {
        builder = builder.expires_at(now + ttl);
    }
    builder.build().unwrap()
}

fn client(
    gateway: Arc<ScriptedGateway>,
    policy: RetryPolicy,
) -> (KeonClient, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::new());
    let client = KeonClient::with_gateway(gateway, policy).with_sleeper(sleeper.clone());
    (client, sleeper)
}

/// Gateway whose calls never complete.
struct HangingGateway;

#[async_trait]
impl Gateway for HangingGateway {
    async fn decide(&self, _request: &DecideRequest) -> KeonResult<DecisionReceipt> {
        std::future::pending().await
    }

    async fn execute(&self, _request: &ExecuteRequest) -> KeonResult<ExecutionResult> {
        std::future::pending().await
    }
}

// ---------------------------------------------------------------------------
// Receipt enforcement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_without_receipt_fails_before_gateway() {
    let gateway = Arc::new(ScriptedGateway::new());
    let (client, _) = client(gateway.clone(), RetryPolicy::default());

    let err = client.execute(None, "execute_workflow", None).await.unwrap_err();
    assert!(matches!(err, KeonError::MissingReceipt));
    assert_eq!(err.code(), ErrorCode::MissingDecisionReceipt);
    assert!(err.is_validation());
    assert_eq!(gateway.execute_calls(), 0);
}

#[tokio::test]
async fn deny_receipt_fails_before_gateway() {
    let gateway = Arc::new(ScriptedGateway::new());
    let (client, _) = client(gateway.clone(), RetryPolicy::default());
    let denied = receipt(Decision::Deny, None);

    let err = client
        .execute(Some(&denied), "execute_workflow", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ExecutionDenied);
    assert_eq!(err.details()["receiptId"], denied.receipt_id().as_str());
    assert_eq!(gateway.execute_calls(), 0);
}

#[tokio::test]
async fn expired_receipt_fails_before_gateway() {
    let gateway = Arc::new(ScriptedGateway::new());
    let (client, _) = client(gateway.clone(), RetryPolicy::default());
    let stale = receipt(Decision::Allow, Some(chrono::Duration::seconds(-1)));

    let err = client.execute(Some(&stale), "x", None).await.unwrap_err();
    assert!(matches!(err, KeonError::InvalidReceipt { ref reason, .. } if reason == "expired"));
    assert_eq!(gateway.execute_calls(), 0);
}

#[tokio::test]
async fn allowing_receipt_reaches_gateway_once() {
    let gateway = Arc::new(ScriptedGateway::new());
    let (client, _) = client(gateway.clone(), RetryPolicy::default());
    let allowed = receipt(Decision::Allow, Some(chrono::Duration::minutes(5)));

    let result = client
        .execute(Some(&allowed), "execute_workflow", None)
        .await
        .unwrap();
    assert_eq!(result.decision_receipt_id(), allowed.receipt_id());

    let sent = gateway.execute_requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].receipt(), &allowed);
    assert_eq!(sent[0].action(), "execute_workflow");
}

#[tokio::test]
async fn remote_denial_at_decide_blocks_execute() {
    let gateway = Arc::new(ScriptedGateway::new());
    let (client, _) = client(gateway.clone(), RetryPolicy::default());

    let correlation_id = CorrelationId::generate("tenant-123").unwrap();
    let p = params().with_correlation_id(correlation_id.as_str());
    let request_for_receipt = DecideRequest::new(DecideRequestFields {
        correlation_id,
        tenant_id: "tenant-123".into(),
        actor_id: "user-456".into(),
        action: "execute_workflow".into(),
        resource_type: "workflow".into(),
        resource_id: "workflow-789".into(),
        subject_hash: Some("00".into()),
        context: None,
    })
    .unwrap();
    gateway.push_decide(receipt_for(
        &request_for_receipt,
        Decision::Deny,
        Some("outside business hours"),
    ));

    let err = client.decide_and_execute(p, None).await.unwrap_err();
    match err {
        KeonError::ExecutionDenied { reason, .. } => {
            assert_eq!(reason.as_deref(), Some("outside business hours"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(gateway.decide_calls(), 1);
    assert_eq!(gateway.execute_calls(), 0);
}

// ---------------------------------------------------------------------------
// Retry budget
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timeouts_exhaust_default_policy() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.always_fail_decide(KeonError::network("Request timeout", Some("/decide".into())));
    let (client, sleeper) = client(gateway.clone(), RetryPolicy::default());

    let err = client.decide(params()).await.unwrap_err();
    assert_eq!(gateway.decide_calls(), 3);
    assert_eq!(
        sleeper.waits(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    assert_eq!(err.code(), ErrorCode::RetryExhausted);
    assert_eq!(err.root_cause().code(), ErrorCode::NetworkError);
    assert_eq!(err.details()["attempts"], 3);
}

#[tokio::test]
async fn no_retry_makes_one_attempt() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.always_fail_decide(KeonError::network("Request timeout", None));
    let (client, sleeper) = client(gateway.clone(), RetryPolicy::no_retry());

    let err = client.decide(params()).await.unwrap_err();
    assert_eq!(gateway.decide_calls(), 1);
    assert!(sleeper.waits().is_empty());
    assert_eq!(err.code(), ErrorCode::NetworkError);
}

#[tokio::test]
async fn execute_failures_are_retried_too() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.push_execute(Err(KeonError::Server {
        status: 503,
        message: "unavailable".into(),
    }));
    let (client, sleeper) = client(gateway.clone(), RetryPolicy::aggressive());
    let allowed = receipt(Decision::Allow, None);

    client.execute(Some(&allowed), "x", None).await.unwrap();
    assert_eq!(gateway.execute_calls(), 2);
    assert_eq!(sleeper.waits(), vec![Duration::from_millis(500)]);
}

#[tokio::test]
async fn retry_never_outlives_receipt_expiry() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.push_execute(Err(KeonError::network("Request timeout", None)));
    let client = KeonClient::with_gateway(
        gateway.clone(),
        RetryPolicy::new(2, 1.0, 1.0, 1.0).unwrap(),
    );
    let short_lived = receipt(Decision::Allow, Some(chrono::Duration::milliseconds(300)));

    let err = client
        .execute(Some(&short_lived), "execute_workflow", None)
        .await
        .unwrap_err();

    assert!(Utc::now() > short_lived.expires_at().unwrap());
    assert!(matches!(err, KeonError::InvalidReceipt { ref reason, .. } if reason == "expired"));
    assert_eq!(gateway.execute_calls(), 1);
}

#[tokio::test]
async fn authority_errors_from_runtime_are_not_retried() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.always_fail_execute(KeonError::InvalidReceipt {
        receipt_id: "dr-x".into(),
        reason: "revoked".into(),
    });
    let (client, sleeper) = client(gateway.clone(), RetryPolicy::aggressive());
    let allowed = receipt(Decision::Allow, None);

    let err = client.execute(Some(&allowed), "x", None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidDecisionReceipt);
    assert_eq!(gateway.execute_calls(), 1);
    assert!(sleeper.waits().is_empty());
}

// ---------------------------------------------------------------------------
// Cancellation and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancellation_aborts_in_flight_call() {
    let token = CancellationToken::new();
    let client = KeonClient::with_gateway(Arc::new(HangingGateway), RetryPolicy::default())
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = client.decide(params()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Cancelled);
    canceller.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_backoff_wait() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.always_fail_decide(KeonError::network("down", None));
    let token = CancellationToken::new();
    let client = KeonClient::with_gateway(gateway.clone(), RetryPolicy::default())
        .with_cancellation(token.clone());

    let call = tokio::spawn(async move { client.decide(params()).await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    token.cancel();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, KeonError::Cancelled(_)));
    assert_eq!(gateway.decide_calls(), 1);
}

#[tokio::test]
async fn clones_share_gateway_across_tasks() {
    let gateway = Arc::new(AllowAllGateway::new());
    let client = KeonClient::with_gateway(gateway.clone(), RetryPolicy::default());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.decide_and_execute(params(), None).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(gateway.decide_calls(), 8);
    assert_eq!(gateway.execute_calls(), 8);
}
