use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::correlation::CorrelationId;
use crate::drift::RequiredFields;
use crate::error::{KeonError, KeonResult};

use super::require;

/// Raw inputs for [`DecideRequest::new`].
#[derive(Clone, Debug)]
pub struct DecideRequestFields {
    pub correlation_id: CorrelationId,
    pub tenant_id: String,
    pub actor_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub subject_hash: Option<String>,
    pub context: Option<Map<String, Value>>,
}

/// Request for a policy decision.
///
/// `subject_hash` binds the decision to the content of the subject. A
/// request without one is refused locally: the runtime never sees a decide
/// call that is not bound to some content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireDecideRequest")]
pub struct DecideRequest {
    correlation_id: CorrelationId,
    tenant_id: String,
    actor_id: String,
    action: String,
    resource_type: String,
    resource_id: String,
    subject_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Map<String, Value>>,
}

impl DecideRequest {
    pub fn new(fields: DecideRequestFields) -> KeonResult<Self> {
        let subject_hash = match fields.subject_hash {
            Some(hash) if !hash.is_empty() => hash,
            _ => {
                return Err(KeonError::invalid_field(
                    "subject_hash",
                    "subjectHash is required and must not be empty",
                ))
            }
        };

        Ok(Self {
            correlation_id: fields.correlation_id,
            tenant_id: require("tenant_id", Some(fields.tenant_id))?,
            actor_id: require("actor_id", Some(fields.actor_id))?,
            action: require("action", Some(fields.action))?,
            resource_type: require("resource_type", Some(fields.resource_type))?,
            resource_id: require("resource_id", Some(fields.resource_id))?,
            subject_hash,
            context: fields.context,
        })
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

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn subject_hash(&self) -> &str {
        &self.subject_hash
    }

    pub fn context(&self) -> Option<&Map<String, Value>> {
        self.context.as_ref()
    }
}

impl RequiredFields for DecideRequest {
    const TYPE_NAME: &'static str = "DecideRequest";
    const REQUIRED_FIELDS: &'static [&'static str] = &[
        "correlation_id",
        "tenant_id",
        "actor_id",
        "action",
        "resource_type",
        "resource_id",
        "subject_hash",
    ];
    const PINNED_FINGERPRINT: &'static str = "5c7ae3e6d532d49a";
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDecideRequest {
    correlation_id: CorrelationId,
    tenant_id: String,
    actor_id: String,
    action: String,
    resource_type: String,
    resource_id: String,
    #[serde(default)]
    subject_hash: Option<String>,
    #[serde(default)]
    context: Option<Map<String, Value>>,
}

impl TryFrom<WireDecideRequest> for DecideRequest {
    type Error = KeonError;

    fn try_from(wire: WireDecideRequest) -> Result<Self, Self::Error> {
        DecideRequest::new(DecideRequestFields {
            correlation_id: wire.correlation_id,
            tenant_id: wire.tenant_id,
            actor_id: wire.actor_id,
            action: wire.action,
            resource_type: wire.resource_type,
            resource_id: wire.resource_id,
            subject_hash: wire.subject_hash,
            context: wire.context,
        })
    }
}
