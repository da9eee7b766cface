//! Wire contracts shared with the runtime.
//!
//! Every type validates at construction. Types that arrive off the wire
//! deserialize through the same checks, so an instance in hand is always
//! structurally valid.

mod decide;
mod envelope;
mod execute;
mod receipt;

pub use decide::{DecideRequest, DecideRequestFields};
pub use envelope::{ErrorDetail, ResponseEnvelope};
pub use execute::{ExecuteRequest, ExecutionResult, ExecutionStatus};
pub use receipt::{Decision, DecisionReceipt, DecisionReceiptBuilder, ReceiptId};

use crate::error::{KeonError, KeonResult};

/// Required, non-empty string field.
fn require(field: &str, value: Option<String>) -> KeonResult<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => Err(KeonError::invalid_field(
            field,
            format!("{field} must not be empty"),
        )),
        None => Err(KeonError::invalid_field(field, format!("{field} is required"))),
    }
}
