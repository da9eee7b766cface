use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{KeonError, KeonResult};

/// Runtime response wrapper: `{success, data}` or `{success: false, error}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// Structured error reported by the runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl ResponseEnvelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: ErrorDetail) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    /// Unwrap the payload, validating it as `T`.
    ///
    /// A success envelope whose data fails validation is an
    /// `InvalidResponse`, never a partial success.
    pub fn into_data<T: DeserializeOwned>(self, status: Option<u16>) -> KeonResult<T> {
        if !self.success {
            return Err(match self.error {
                Some(error) => error.into_error(status),
                None => KeonError::InvalidResponse {
                    message: "error envelope without error detail".into(),
                    status,
                },
            });
        }

        let data = self.data.ok_or_else(|| KeonError::InvalidResponse {
            message: "success envelope without data".into(),
            status,
        })?;
        serde_json::from_value(data).map_err(|e| KeonError::InvalidResponse {
            message: format!("response data failed validation: {e}"),
            status,
        })
    }
}

impl ErrorDetail {
    /// Map a runtime error code onto the local error taxonomy.
    pub fn into_error(self, status: Option<u16>) -> KeonError {
        let details = self.details.unwrap_or_default();
        let receipt_id = || {
            details
                .get("receiptId")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        };

        match self.code.as_str() {
            "MISSING_DECISION_RECEIPT" => KeonError::InvalidReceipt {
                receipt_id: "<missing>".into(),
                reason: self.message,
            },
            "INVALID_DECISION_RECEIPT" => KeonError::InvalidReceipt {
                receipt_id: receipt_id(),
                reason: self.message,
            },
            "EXECUTION_DENIED" => KeonError::ExecutionDenied {
                receipt_id: receipt_id(),
                reason: Some(self.message),
            },
            "INVALID_CORRELATION_ID" | "VALIDATION_ERROR" => KeonError::Validation {
                message: self.message,
                details,
            },
            _ => KeonError::Rejected {
                status,
                code: self.code,
                message: self.message,
                details,
            },
        }
    }
}
