//! Governed decide → execute orchestration.

use std::sync::Arc;

use chrono::Utc;
use keon_types::{
    subject_hash, CorrelationId, DecideRequest, DecideRequestFields, Decision, DecisionReceipt,
    ExecuteRequest, ExecutionResult, KeonError, KeonResult,
};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::gateway::Gateway;
use crate::http::HttpGateway;
use crate::retry::{Retrier, RetryPolicy, Sleeper, TokioSleeper};

/// What a decision is about: the payload itself or its precomputed hash.
#[derive(Clone, Debug, PartialEq)]
pub enum Subject {
    /// Hashed locally with [`keon_types::subject_hash`].
    Payload(Value),
    /// Lowercase hex SHA-256 computed by the caller.
    Hash(String),
}

/// Inputs for [`KeonClient::decide`].
#[derive(Clone, Debug)]
pub struct DecideParams {
    pub tenant_id: String,
    pub actor_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    /// Generated from `tenant_id` when absent.
    pub correlation_id: Option<String>,
    /// Required; a decision without a subject is refused locally.
    pub subject: Option<Subject>,
    pub context: Option<Map<String, Value>>,
}

impl DecideParams {
    pub fn new(
        tenant_id: impl Into<String>,
        actor_id: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_id: actor_id.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            correlation_id: None,
            subject: None,
            context: None,
        }
    }

    pub fn with_subject(mut self, payload: Value) -> Self {
        self.subject = Some(Subject::Payload(payload));
        self
    }

    pub fn with_subject_hash(mut self, hash: impl Into<String>) -> Self {
        self.subject = Some(Subject::Hash(hash.into()));
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }
}

/// Client for the Keon runtime.
///
/// Execution is only reachable through [`execute`](Self::execute), which
/// refuses to contact the runtime without an allowing, unexpired receipt.
/// Cloning is cheap and clones share the gateway.
#[derive(Clone)]
pub struct KeonClient {
    gateway: Arc<dyn Gateway>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancellation: Option<CancellationToken>,
}

impl std::fmt::Debug for KeonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeonClient")
            .field("retry", &self.retry)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl KeonClient {
    /// Client over HTTP as described by `config`.
    pub fn new(config: ClientConfig) -> KeonResult<Self> {
        let gateway = HttpGateway::from_config(&config)?;
        info!(base_url = gateway.base_url(), "keon client ready");
        Ok(Self::with_gateway(Arc::new(gateway), config.retry))
    }

    /// Client over a custom transport.
    ///
    /// `retry` is used as given; backoff waits are clamped to
    /// `[0, Duration::MAX]` rather than validated here.
    pub fn with_gateway(gateway: Arc<dyn Gateway>, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            retry,
            sleeper: Arc::new(TokioSleeper),
            cancellation: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Abort in-flight attempts and retry waits once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn retrier(&self) -> Retrier<'_> {
        Retrier::new(&self.retry, self.sleeper.as_ref()).with_cancellation(self.cancellation.as_ref())
    }

    /// Request a policy decision.
    pub async fn decide(&self, params: DecideParams) -> KeonResult<DecisionReceipt> {
        let correlation_id = match &params.correlation_id {
            Some(id) => CorrelationId::parse(id)?,
            None => CorrelationId::generate(&params.tenant_id)?,
        };
        let subject_hash = match params.subject {
            Some(Subject::Payload(payload)) => Some(subject_hash(&payload)?),
            Some(Subject::Hash(hash)) => Some(hash),
            None => None,
        };

        let request = DecideRequest::new(DecideRequestFields {
            correlation_id,
            tenant_id: params.tenant_id,
            actor_id: params.actor_id,
            action: params.action,
            resource_type: params.resource_type,
            resource_id: params.resource_id,
            subject_hash,
            context: params.context,
        })?;

        info!(
            correlation_id = %request.correlation_id(),
            tenant_id = request.tenant_id(),
            action = request.action(),
            "decide request"
        );

        let receipt = self
            .retrier()
            .run("decide", |_| self.gateway.decide(&request))
            .await?;

        if receipt.correlation_id() != request.correlation_id() {
            return Err(KeonError::InvalidResponse {
                message: format!(
                    "receipt {} is bound to {}, expected {}",
                    receipt.receipt_id(),
                    receipt.correlation_id(),
                    request.correlation_id()
                ),
                status: None,
            });
        }

        match receipt.decision() {
            Decision::Allow => info!(
                correlation_id = %receipt.correlation_id(),
                receipt_id = %receipt.receipt_id(),
                "decision: allow"
            ),
            Decision::Deny => warn!(
                correlation_id = %receipt.correlation_id(),
                receipt_id = %receipt.receipt_id(),
                reason = receipt.reason().unwrap_or_default(),
                "decision: deny"
            ),
        }

        Ok(receipt)
    }

    /// Execute `action` under `receipt`.
    ///
    /// Missing, denying and expired receipts fail here without any network
    /// activity.
    pub async fn execute(
        &self,
        receipt: Option<&DecisionReceipt>,
        action: &str,
        parameters: Option<Map<String, Value>>,
    ) -> KeonResult<ExecutionResult> {
        let receipt = receipt.ok_or_else(|| {
            warn!(action, "execute refused: no decision receipt");
            KeonError::MissingReceipt
        })?;

        let request =
            ExecuteRequest::authorize(receipt, action, parameters, Utc::now()).map_err(|err| {
                warn!(
                    receipt_id = %receipt.receipt_id(),
                    code = %err.code(),
                    "execute refused"
                );
                err
            })?;

        info!(
            correlation_id = %request.correlation_id(),
            receipt_id = %request.decision_receipt_id(),
            action = request.action(),
            "execute request"
        );

        // Expiry is re-checked before every attempt: a retry must not outlive
        // the receipt it runs under.
        let gateway = &self.gateway;
        let request = &request;
        let result = self
            .retrier()
            .run("execute", move |attempt| async move {
                if receipt.is_expired_at(Utc::now()) {
                    warn!(
                        receipt_id = %receipt.receipt_id(),
                        attempt,
                        "execute refused: receipt expired"
                    );
                    return Err(KeonError::InvalidReceipt {
                        receipt_id: receipt.receipt_id().to_string(),
                        reason: "expired".into(),
                    });
                }
                gateway.execute(request).await
            })
            .await?;

        if result.decision_receipt_id() != request.decision_receipt_id() {
            return Err(KeonError::InvalidResponse {
                message: format!(
                    "execution {} reports receipt {}, expected {}",
                    result.execution_id(),
                    result.decision_receipt_id(),
                    request.decision_receipt_id()
                ),
                status: None,
            });
        }

        info!(
            execution_id = result.execution_id(),
            status = %result.status(),
            "execution accepted"
        );
        Ok(result)
    }

    /// Decide, then execute the same action when allowed.
    ///
    /// A denial surfaces as `ExecutionDenied` and `/execute` is never called.
    pub async fn decide_and_execute(
        &self,
        params: DecideParams,
        parameters: Option<Map<String, Value>>,
    ) -> KeonResult<ExecutionResult> {
        let action = params.action.clone();
        let receipt = self.decide(params).await?;
        self.execute(Some(&receipt), &action, parameters).await
    }
}
