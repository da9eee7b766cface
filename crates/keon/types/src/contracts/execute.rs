use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::correlation::CorrelationId;
use crate::error::{KeonError, KeonResult};

use super::receipt::{Decision, DecisionReceipt, ReceiptId};

const EXECUTION_PREFIX: &str = "exec-";

/// An execution request bound to an allowing, unexpired receipt.
///
/// There is no public constructor other than [`ExecuteRequest::authorize`],
/// and the type is never deserialized, so holding one proves the receipt
/// checks already passed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    receipt: DecisionReceipt,
    correlation_id: CorrelationId,
    decision_receipt_id: ReceiptId,
    tenant_id: String,
    actor_id: String,
    action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Map<String, Value>>,
}

impl ExecuteRequest {
    /// Check the receipt's authority and bind the action to it.
    ///
    /// Order of checks: denial, then expiry, then the action itself.
    pub fn authorize(
        receipt: &DecisionReceipt,
        action: impl Into<String>,
        parameters: Option<Map<String, Value>>,
        now: DateTime<Utc>,
    ) -> KeonResult<Self> {
        if receipt.decision() == Decision::Deny {
            return Err(KeonError::ExecutionDenied {
                receipt_id: receipt.receipt_id().to_string(),
                reason: receipt.reason().map(str::to_string),
            });
        }
        if receipt.is_expired_at(now) {
            return Err(KeonError::InvalidReceipt {
                receipt_id: receipt.receipt_id().to_string(),
                reason: "expired".into(),
            });
        }

        let action = action.into();
        if action.is_empty() {
            return Err(KeonError::invalid_field("action", "action must not be empty"));
        }

        Ok(Self {
            correlation_id: receipt.correlation_id().clone(),
            decision_receipt_id: receipt.receipt_id().clone(),
            tenant_id: receipt.tenant_id().to_string(),
            actor_id: receipt.actor_id().to_string(),
            receipt: receipt.clone(),
            action,
            parameters,
        })
    }

    pub fn receipt(&self) -> &DecisionReceipt {
        &self.receipt
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn decision_receipt_id(&self) -> &ReceiptId {
        &self.decision_receipt_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn parameters(&self) -> Option<&Map<String, Value>> {
        self.parameters.as_ref()
    }
}

/// Lifecycle of an execution on the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Outcome reported by `/execute`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireExecutionResult")]
pub struct ExecutionResult {
    execution_id: String,
    correlation_id: CorrelationId,
    decision_receipt_id: ReceiptId,
    status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    executed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl ExecutionResult {
    /// Result for `request` with a caller-supplied execution id.
    pub fn new(
        execution_id: impl Into<String>,
        request: &ExecuteRequest,
        status: ExecutionStatus,
        executed_at: DateTime<Utc>,
    ) -> KeonResult<Self> {
        let execution_id = execution_id.into();
        validate_execution_id(&execution_id)?;
        Ok(Self {
            execution_id,
            correlation_id: request.correlation_id().clone(),
            decision_receipt_id: request.decision_receipt_id().clone(),
            status,
            result: None,
            executed_at,
            completed_at: None,
        })
    }

    /// Fresh `exec-<uuidv7>` identifier.
    pub fn generate_id() -> String {
        format!("{EXECUTION_PREFIX}{}", Uuid::now_v7())
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn decision_receipt_id(&self) -> &ReceiptId {
        &self.decision_receipt_id
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn executed_at(&self) -> DateTime<Utc> {
        self.executed_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

fn validate_execution_id(id: &str) -> KeonResult<()> {
    match id.strip_prefix(EXECUTION_PREFIX) {
        Some(rest) if !rest.is_empty() => Ok(()),
        _ => Err(KeonError::invalid_field(
            "execution_id",
            format!("executionId must start with '{EXECUTION_PREFIX}': {id}"),
        )),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireExecutionResult {
    execution_id: String,
    correlation_id: CorrelationId,
    decision_receipt_id: ReceiptId,
    status: ExecutionStatus,
    #[serde(default)]
    result: Option<Value>,
    executed_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WireExecutionResult> for ExecutionResult {
    type Error = KeonError;

    fn try_from(wire: WireExecutionResult) -> Result<Self, Self::Error> {
        validate_execution_id(&wire.execution_id)?;
        Ok(Self {
            execution_id: wire.execution_id,
            correlation_id: wire.correlation_id,
            decision_receipt_id: wire.decision_receipt_id,
            status: wire.status,
            result: wire.result,
            executed_at: wire.executed_at,
            completed_at: wire.completed_at,
        })
    }
}
