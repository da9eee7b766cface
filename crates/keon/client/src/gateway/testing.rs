//! In-process gateways and sleepers for tests.
//!
//! Public so downstream crates can exercise governed code paths without a
//! runtime.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use keon_types::{
    DecideRequest, Decision, DecisionReceipt, ExecuteRequest, ExecutionResult, ExecutionStatus,
    KeonError, KeonResult, ReceiptId,
};
use serde_json::json;

use super::Gateway;
use crate::retry::Sleeper;

const RECEIPT_TTL_MINUTES: i64 = 5;

/// Receipt the runtime would issue for `request`.
pub fn receipt_for(
    request: &DecideRequest,
    decision: Decision,
    reason: Option<&str>,
) -> KeonResult<DecisionReceipt> {
    let now = Utc::now();
    let mut builder = DecisionReceipt::builder()
        .receipt_id(ReceiptId::generate().to_string())
        .decision(decision)
        .correlation_id(request.correlation_id().to_string())
        .tenant_id(request.tenant_id())
        .actor_id(request.actor_id())
        .decided_at(now)
        .expires_at(now + chrono::Duration::minutes(RECEIPT_TTL_MINUTES))
        .applied_policies(vec!["policy-default".into()]);
    if let Some(reason) = reason {
        builder = builder.reason(reason);
    }
    builder.build()
}

/// Completed execution for `request`.
pub fn completed_for(request: &ExecuteRequest) -> KeonResult<ExecutionResult> {
    let now = Utc::now();
    Ok(ExecutionResult::new(
        ExecutionResult::generate_id(),
        request,
        ExecutionStatus::Completed,
        now,
    )?
    .with_result(json!({ "action": request.action() }))
    .with_completed_at(now))
}

/// Gateway that replays queued outcomes.
///
/// With an empty queue, `decide` allows and `execute` completes. A sticky
/// failure set by `always_fail_*` overrides both.
#[derive(Default)]
pub struct ScriptedGateway {
    decide_queue: Mutex<VecDeque<KeonResult<DecisionReceipt>>>,
    execute_queue: Mutex<VecDeque<KeonResult<ExecutionResult>>>,
    decide_failure: Mutex<Option<KeonError>>,
    execute_failure: Mutex<Option<KeonError>>,
    decide_requests: Mutex<Vec<DecideRequest>>,
    execute_requests: Mutex<Vec<ExecuteRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_decide(&self, outcome: KeonResult<DecisionReceipt>) {
        lock(&self.decide_queue).push_back(outcome);
    }

    pub fn push_execute(&self, outcome: KeonResult<ExecutionResult>) {
        lock(&self.execute_queue).push_back(outcome);
    }

    pub fn always_fail_decide(&self, err: KeonError) {
        *lock(&self.decide_failure) = Some(err);
    }

    pub fn always_fail_execute(&self, err: KeonError) {
        *lock(&self.execute_failure) = Some(err);
    }

    pub fn decide_calls(&self) -> usize {
        lock(&self.decide_requests).len()
    }

    pub fn execute_calls(&self) -> usize {
        lock(&self.execute_requests).len()
    }

    pub fn decide_requests(&self) -> Vec<DecideRequest> {
        lock(&self.decide_requests).clone()
    }

    pub fn execute_requests(&self) -> Vec<ExecuteRequest> {
        lock(&self.execute_requests).clone()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn decide(&self, request: &DecideRequest) -> KeonResult<DecisionReceipt> {
        lock(&self.decide_requests).push(request.clone());
        if let Some(err) = lock(&self.decide_failure).clone() {
            return Err(err);
        }
        let queued = lock(&self.decide_queue).pop_front();
        queued.unwrap_or_else(|| receipt_for(request, Decision::Allow, None))
    }

    async fn execute(&self, request: &ExecuteRequest) -> KeonResult<ExecutionResult> {
        lock(&self.execute_requests).push(request.clone());
        if let Some(err) = lock(&self.execute_failure).clone() {
            return Err(err);
        }
        let queued = lock(&self.execute_queue).pop_front();
        queued.unwrap_or_else(|| completed_for(request))
    }
}

/// Allows every decision and completes every execution.
#[derive(Debug, Default)]
pub struct AllowAllGateway {
    decide_calls: AtomicU32,
    execute_calls: AtomicU32,
}

impl AllowAllGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decide_calls(&self) -> u32 {
        self.decide_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> u32 {
        self.execute_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Gateway for AllowAllGateway {
    async fn decide(&self, request: &DecideRequest) -> KeonResult<DecisionReceipt> {
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        receipt_for(request, Decision::Allow, Some("Allowed by policy"))
    }

    async fn execute(&self, request: &ExecuteRequest) -> KeonResult<ExecutionResult> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        completed_for(request)
    }
}

/// Denies every decision. `execute` also refuses, so a client that skipped
/// its local receipt check would still not get through.
#[derive(Debug)]
pub struct DenyAllGateway {
    reason: String,
    decide_calls: AtomicU32,
    execute_calls: AtomicU32,
}

impl DenyAllGateway {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            decide_calls: AtomicU32::new(0),
            execute_calls: AtomicU32::new(0),
        }
    }

    pub fn decide_calls(&self) -> u32 {
        self.decide_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> u32 {
        self.execute_calls.load(Ordering::SeqCst)
    }
}

impl Default for DenyAllGateway {
    fn default() -> Self {
        Self::new("Policy denies this action")
    }
}

#[async_trait]
impl Gateway for DenyAllGateway {
    async fn decide(&self, request: &DecideRequest) -> KeonResult<DecisionReceipt> {
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        receipt_for(request, Decision::Deny, Some(&self.reason))
    }

    async fn execute(&self, request: &ExecuteRequest) -> KeonResult<ExecutionResult> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        Err(KeonError::ExecutionDenied {
            receipt_id: request.decision_receipt_id().to_string(),
            reason: Some(self.reason.clone()),
        })
    }
}

/// Records requested waits and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        lock(&self.waits).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.waits).push(duration);
    }
}

/// Poisoning only follows a panic in another test thread; keep going.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
