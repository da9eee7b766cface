//! Transport seam between the client and the Keon runtime.

use async_trait::async_trait;
use keon_types::{DecideRequest, DecisionReceipt, ExecuteRequest, ExecutionResult, KeonResult};

pub mod testing;

/// One round trip to the runtime per call.
///
/// Implementations never retry; the client wraps every call in its retry
/// policy. A failure must never be reported as a receipt, least of all an
/// allowing one.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn decide(&self, request: &DecideRequest) -> KeonResult<DecisionReceipt>;

    async fn execute(&self, request: &ExecuteRequest) -> KeonResult<ExecutionResult>;
}
