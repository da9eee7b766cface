//! Canonical correlation identifiers: `t:<TenantId>|c:<uuidv7>`.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::{Uuid, Variant};

use crate::error::{KeonError, KeonResult};

const TENANT_PREFIX: &str = "t:";
const CORRELATION_PREFIX: &str = "c:";
const SEPARATOR: char = '|';

/// A validated correlation identifier.
///
/// The only ways to obtain one are [`CorrelationId::parse`] and
/// [`CorrelationId::generate`]; deserialization goes through `parse`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId {
    raw: String,
    uuid: Uuid,
}

impl CorrelationId {
    /// Validate a correlation id string.
    pub fn parse(value: impl AsRef<str>) -> KeonResult<Self> {
        let value = value.as_ref();
        let invalid = || KeonError::InvalidCorrelationId {
            value: value.to_string(),
        };

        let (tenant_part, correlation_part) = value.split_once(SEPARATOR).ok_or_else(invalid)?;
        let tenant = tenant_part.strip_prefix(TENANT_PREFIX).ok_or_else(invalid)?;
        if !is_valid_tenant_id(tenant) {
            return Err(invalid());
        }
        let uuid_text = correlation_part
            .strip_prefix(CORRELATION_PREFIX)
            .ok_or_else(invalid)?;
        let uuid = parse_uuid_v7(uuid_text).ok_or_else(invalid)?;

        Ok(Self {
            raw: value.to_string(),
            uuid,
        })
    }

    /// Synthesize `t:<tenant_id>|c:<fresh uuidv7>`.
    pub fn generate(tenant_id: &str) -> KeonResult<Self> {
        Self::parse(format!(
            "{TENANT_PREFIX}{tenant_id}{SEPARATOR}{CORRELATION_PREFIX}{}",
            Uuid::now_v7()
        ))
    }

    pub fn tenant_id(&self) -> &str {
        let end = self.raw.find(SEPARATOR).unwrap_or(self.raw.len());
        &self.raw[TENANT_PREFIX.len()..end]
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = KeonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.raw
    }
}

impl std::str::FromStr for CorrelationId {
    type Err = KeonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Tenant ids: one or more of `[A-Za-z0-9_-]`.
pub fn is_valid_tenant_id(tenant: &str) -> bool {
    !tenant.is_empty()
        && tenant
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Parse a lowercase, hyphenated, RFC 4122 variant version-7 UUID.
pub(crate) fn parse_uuid_v7(text: &str) -> Option<Uuid> {
    if text.len() != 36 {
        return None;
    }
    let well_formed = text.bytes().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => b == b'-',
        _ => b.is_ascii_digit() || (b'a'..=b'f').contains(&b),
    });
    if !well_formed {
        return None;
    }

    let uuid = Uuid::parse_str(text).ok()?;
    (uuid.get_version_num() == 7 && uuid.get_variant() == Variant::RFC4122).then_some(uuid)
}
