use keon_types::{DecisionReceipt, KeonError};
use thiserror::Error;

/// Errors from governed adapter calls.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Keon(#[from] KeonError),

    /// The runtime denied the call; the receipt is kept for audit.
    #[error("{action} denied by policy: {}", .receipt.reason().unwrap_or("no reason given"))]
    Denied {
        action: &'static str,
        receipt: Box<DecisionReceipt>,
    },

    #[error("provider {provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },

    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("request could not be prepared: {0}")]
    InvalidRequest(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

impl AdapterError {
    /// Receipt behind a denial, if this is one.
    pub fn receipt(&self) -> Option<&DecisionReceipt> {
        match self {
            AdapterError::Denied { receipt, .. } => Some(receipt.as_ref()),
            _ => None,
        }
    }
}
