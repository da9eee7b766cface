use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Stable, machine-readable error codes.
///
/// Callers branch on these instead of matching message text. The string
/// forms are shared with the runtime's error envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InvalidCorrelationId,
    MissingDecisionReceipt,
    InvalidDecisionReceipt,
    ExecutionDenied,
    NetworkError,
    ServerError,
    RateLimitExceeded,
    RetryExhausted,
    InvalidResponse,
    RequestRejected,
    Cancelled,
    ConfigError,
    SchemaDrift,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidCorrelationId => "INVALID_CORRELATION_ID",
            ErrorCode::MissingDecisionReceipt => "MISSING_DECISION_RECEIPT",
            ErrorCode::InvalidDecisionReceipt => "INVALID_DECISION_RECEIPT",
            ErrorCode::ExecutionDenied => "EXECUTION_DENIED",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::RetryExhausted => "RETRY_EXHAUSTED",
            ErrorCode::InvalidResponse => "INVALID_RESPONSE",
            ErrorCode::RequestRejected => "REQUEST_REJECTED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::SchemaDrift => "SCHEMA_DRIFT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root error for every Keon operation.
///
/// Input errors (`Validation`, `InvalidCorrelationId`, `MissingReceipt`) are
/// raised before any network activity. Authority errors (`InvalidReceipt`,
/// `ExecutionDenied`) are never retried. Transport errors (`Network`,
/// `Server`, `RateLimit`) are retried by the client's retry policy and end up
/// wrapped in `RetryExhausted` when the budget runs out.
#[derive(Clone, Debug, Error)]
pub enum KeonError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Map<String, Value>,
    },

    #[error("CorrelationId must match canonical form: t:<TenantId>|c:<uuidv7>, got: {value}")]
    InvalidCorrelationId { value: String },

    #[error("Execute requires a DecisionReceipt (hard fail if absent)")]
    MissingReceipt,

    #[error("DecisionReceipt is invalid or expired: {receipt_id} ({reason})")]
    InvalidReceipt { receipt_id: String, reason: String },

    #[error("Execution denied by policy: {}", .reason.as_deref().unwrap_or("see decision receipt"))]
    ExecutionDenied {
        receipt_id: String,
        reason: Option<String>,
    },

    #[error("{message}")]
    Network { message: String, url: Option<String> },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Rate limit exceeded. Retry after: {}", .retry_after.map(|s| format!("{s}s")).unwrap_or_else(|| "unknown".into()))]
    RateLimit { retry_after: Option<u64> },

    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<KeonError>,
    },

    #[error("Request rejected ({code}): {message}")]
    Rejected {
        status: Option<u16>,
        code: String,
        message: String,
        details: Map<String, Value>,
    },

    #[error("Invalid response: {message}")]
    InvalidResponse {
        message: String,
        status: Option<u16>,
    },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema drift detected for {type_name}: expected fingerprint {expected}, got {actual} (required fields: {fields:?})")]
    DriftDetected {
        type_name: &'static str,
        expected: String,
        actual: String,
        fields: Vec<String>,
    },
}

/// Result alias used across the Keon crates.
pub type KeonResult<T> = Result<T, KeonError>;

impl KeonError {
    /// Validation failure without extra context.
    pub fn validation(message: impl Into<String>) -> Self {
        KeonError::Validation {
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Validation failure naming the offending field.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut details = Map::new();
        details.insert("field".into(), Value::String(field.to_string()));
        KeonError::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn network(message: impl Into<String>, url: Option<String>) -> Self {
        KeonError::Network {
            message: message.into(),
            url,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            KeonError::Validation { .. } => ErrorCode::ValidationError,
            KeonError::InvalidCorrelationId { .. } => ErrorCode::InvalidCorrelationId,
            KeonError::MissingReceipt => ErrorCode::MissingDecisionReceipt,
            KeonError::InvalidReceipt { .. } => ErrorCode::InvalidDecisionReceipt,
            KeonError::ExecutionDenied { .. } => ErrorCode::ExecutionDenied,
            KeonError::Network { .. } => ErrorCode::NetworkError,
            KeonError::Server { .. } => ErrorCode::ServerError,
            KeonError::RateLimit { .. } => ErrorCode::RateLimitExceeded,
            KeonError::RetryExhausted { .. } => ErrorCode::RetryExhausted,
            KeonError::Rejected { .. } => ErrorCode::RequestRejected,
            KeonError::InvalidResponse { .. } => ErrorCode::InvalidResponse,
            KeonError::Cancelled(_) => ErrorCode::Cancelled,
            KeonError::Config(_) => ErrorCode::ConfigError,
            KeonError::DriftDetected { .. } => ErrorCode::SchemaDrift,
        }
    }

    /// Human-readable message (same as `Display`).
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Additional structured context for the error.
    pub fn details(&self) -> Map<String, Value> {
        let value = match self {
            KeonError::Validation { details, .. } => return details.clone(),
            KeonError::InvalidCorrelationId { value } => json!({ "correlationId": value }),
            KeonError::MissingReceipt => json!({ "required": true }),
            KeonError::InvalidReceipt { receipt_id, reason } => {
                json!({ "receiptId": receipt_id, "reason": reason })
            }
            KeonError::ExecutionDenied { receipt_id, reason } => {
                json!({ "receiptId": receipt_id, "reason": reason })
            }
            KeonError::Network { url, .. } => match url {
                Some(url) => json!({ "url": url }),
                None => json!({}),
            },
            KeonError::Server { status, .. } => json!({ "statusCode": status }),
            KeonError::RateLimit { retry_after } => json!({ "retryAfter": retry_after }),
            KeonError::RetryExhausted { attempts, source } => json!({
                "attempts": attempts,
                "originalError": source.to_string(),
                "originalCode": source.code(),
            }),
            KeonError::Rejected {
                status, details, ..
            } => {
                let mut details = details.clone();
                if let Some(status) = status {
                    details.insert("statusCode".into(), json!(status));
                }
                return details;
            }
            KeonError::InvalidResponse { status, .. } => match status {
                Some(status) => json!({ "statusCode": status }),
                None => json!({}),
            },
            KeonError::Cancelled(_) | KeonError::Config(_) => json!({}),
            KeonError::DriftDetected {
                expected,
                actual,
                fields,
                ..
            } => json!({ "expected": expected, "actual": actual, "fields": fields }),
        };

        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// True for the input-error family: caught before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            KeonError::Validation { .. }
                | KeonError::InvalidCorrelationId { .. }
                | KeonError::MissingReceipt
        )
    }

    /// The innermost failure when this error wraps retries.
    pub fn root_cause(&self) -> &KeonError {
        match self {
            KeonError::RetryExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_to_wire_strings() {
        let encoded = serde_json::to_string(&ErrorCode::MissingDecisionReceipt).unwrap();
        assert_eq!(encoded, "\"MISSING_DECISION_RECEIPT\"");
        assert_eq!(
            ErrorCode::RateLimitExceeded.as_str(),
            ErrorCode::RateLimitExceeded.to_string()
        );
    }

    #[test]
    fn denial_details_carry_receipt_id() {
        let err = KeonError::ExecutionDenied {
            receipt_id: "dr-01932b3c-4d5e-7890-abcd-ef1234567890".into(),
            reason: Some("policy says no".into()),
        };
        assert_eq!(err.code(), ErrorCode::ExecutionDenied);
        assert_eq!(
            err.details()["receiptId"],
            "dr-01932b3c-4d5e-7890-abcd-ef1234567890"
        );
        assert!(err.message().contains("policy says no"));
    }

    #[test]
    fn retry_exhausted_exposes_root_cause() {
        let err = KeonError::RetryExhausted {
            attempts: 3,
            source: Box::new(KeonError::network("Request timeout", None)),
        };
        assert_eq!(err.code(), ErrorCode::RetryExhausted);
        assert_eq!(err.root_cause().code(), ErrorCode::NetworkError);
        assert_eq!(err.details()["attempts"], 3);
        assert_eq!(err.details()["originalCode"], "NETWORK_ERROR");
    }

    #[test]
    fn validation_family() {
        assert!(KeonError::MissingReceipt.is_validation());
        assert!(KeonError::InvalidCorrelationId {
            value: "x".into()
        }
        .is_validation());
        assert!(!KeonError::RateLimit { retry_after: None }.is_validation());
    }

    #[test]
    fn rate_limit_message_mentions_retry_after() {
        let err = KeonError::RateLimit {
            retry_after: Some(7),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded. Retry after: 7s");
        let err = KeonError::RateLimit { retry_after: None };
        assert!(err.to_string().ends_with("unknown"));
    }
}
