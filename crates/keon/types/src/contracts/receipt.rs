//! Decision receipts issued by the runtime's `/decide` endpoint.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correlation::{parse_uuid_v7, CorrelationId};
use crate::drift::RequiredFields;
use crate::error::{KeonError, KeonResult};

use super::require;

const RECEIPT_PREFIX: &str = "dr-";

/// Policy verdict carried by a receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("allow"),
            Decision::Deny => f.write_str("deny"),
        }
    }
}

/// Receipt identifier of the form `dr-<uuidv7>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReceiptId(String);

impl ReceiptId {
    pub fn parse(value: impl AsRef<str>) -> KeonResult<Self> {
        let value = value.as_ref();
        value
            .strip_prefix(RECEIPT_PREFIX)
            .and_then(parse_uuid_v7)
            .map(|_| Self(value.to_string()))
            .ok_or_else(|| {
                KeonError::invalid_field(
                    "receipt_id",
                    format!("Invalid DecisionReceiptId format: {value}"),
                )
            })
    }

    /// Fresh receipt id. The runtime mints these; fakes and tests use this.
    pub fn generate() -> Self {
        Self(format!("{RECEIPT_PREFIX}{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ReceiptId {
    type Error = KeonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ReceiptId> for String {
    fn from(id: ReceiptId) -> Self {
        id.0
    }
}

/// A point-in-time authorization bound to the originating correlation id.
///
/// Immutable once built. Deserialization runs the same validation as
/// [`DecisionReceiptBuilder::build`], so a receipt parsed off the wire is as
/// trustworthy structurally as one built locally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireDecisionReceipt")]
pub struct DecisionReceipt {
    receipt_id: ReceiptId,
    decision: Decision,
    correlation_id: CorrelationId,
    tenant_id: String,
    actor_id: String,
    decided_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied_policies: Option<Vec<String>>,
}

impl DecisionReceipt {
    pub fn builder() -> DecisionReceiptBuilder {
        DecisionReceiptBuilder::default()
    }

    pub fn receipt_id(&self) -> &ReceiptId {
        &self.receipt_id
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn is_allow(&self) -> bool {
        self.decision == Decision::Allow
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn decided_at(&self) -> DateTime<Utc> {
        self.decided_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn applied_policies(&self) -> &[String] {
        self.applied_policies.as_deref().unwrap_or_default()
    }

    /// A receipt without `expiresAt` never expires locally; the runtime
    /// remains the final judge.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

impl RequiredFields for DecisionReceipt {
    const TYPE_NAME: &'static str = "DecisionReceipt";
    const REQUIRED_FIELDS: &'static [&'static str] = &[
        "receipt_id",
        "decision",
        "correlation_id",
        "tenant_id",
        "actor_id",
        "decided_at",
    ];
    const PINNED_FINGERPRINT: &'static str = "d5f0c62ffa683fde";
}

/// Builder for [`DecisionReceipt`]; all checks run in [`build`](Self::build).
#[derive(Clone, Debug, Default)]
pub struct DecisionReceiptBuilder {
    receipt_id: Option<String>,
    decision: Option<Decision>,
    correlation_id: Option<String>,
    tenant_id: Option<String>,
    actor_id: Option<String>,
    decided_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    reason: Option<String>,
    applied_policies: Option<Vec<String>>,
}

impl DecisionReceiptBuilder {
    pub fn receipt_id(mut self, id: impl Into<String>) -> Self {
        self.receipt_id = Some(id.into());
        self
    }

    pub fn decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn decided_at(mut self, at: DateTime<Utc>) -> Self {
        self.decided_at = Some(at);
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn applied_policies(mut self, policies: Vec<String>) -> Self {
        self.applied_policies = Some(policies);
        self
    }

    pub fn build(self) -> KeonResult<DecisionReceipt> {
        let receipt_id = ReceiptId::parse(require("receipt_id", self.receipt_id)?)?;
        let decision = self
            .decision
            .ok_or_else(|| KeonError::invalid_field("decision", "decision is required"))?;
        let correlation_id = CorrelationId::parse(require("correlation_id", self.correlation_id)?)?;
        let tenant_id = require("tenant_id", self.tenant_id)?;
        let actor_id = require("actor_id", self.actor_id)?;
        let decided_at = self
            .decided_at
            .ok_or_else(|| KeonError::invalid_field("decided_at", "decided_at is required"))?;

        Ok(DecisionReceipt {
            receipt_id,
            decision,
            correlation_id,
            tenant_id,
            actor_id,
            decided_at,
            expires_at: self.expires_at,
            reason: self.reason,
            applied_policies: self.applied_policies,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDecisionReceipt {
    receipt_id: String,
    decision: Decision,
    correlation_id: String,
    tenant_id: String,
    actor_id: String,
    decided_at: DateTime<Utc>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    applied_policies: Option<Vec<String>>,
}

impl TryFrom<WireDecisionReceipt> for DecisionReceipt {
    type Error = KeonError;

    fn try_from(wire: WireDecisionReceipt) -> Result<Self, Self::Error> {
        let mut builder = DecisionReceipt::builder()
            .receipt_id(wire.receipt_id)
            .decision(wire.decision)
            .correlation_id(wire.correlation_id)
            .tenant_id(wire.tenant_id)
            .actor_id(wire.actor_id)
            .decided_at(wire.decided_at);
        builder.expires_at = wire.expires_at;
        builder.reason = wire.reason;
        builder.applied_policies = wire.applied_policies;
        builder.build()
    }
}
