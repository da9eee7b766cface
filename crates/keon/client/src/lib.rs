//! Keon Client: governed decide/execute against the Keon runtime.
//!
//! ## Guarantees
//!
//! - **Receipt-gated execution**: [`KeonClient::execute`] is the only path to
//!   `/execute` and refuses missing, denying or expired receipts before any
//!   network activity.
//! - **Content-bound decisions**: every decide call carries the subject hash
//!   of its payload.
//! - **Fail-closed transport**: transport failures surface as typed errors
//!   and never as an allow.
//! - **Bounded retries**: only network, rate-limit and 5xx failures are
//!   retried, sequentially, with exponential backoff.
//!
//! ```no_run
//! # async fn run() -> keon_types::KeonResult<()> {
//! use keon_client::{ClientConfig, DecideParams, KeonClient};
//! use serde_json::json;
//!
//! let client = KeonClient::new(ClientConfig::new("https://api.keon.systems/runtime/v1"))?;
//! let params = DecideParams::new("tenant-123", "user-456", "execute_workflow", "workflow", "wf-789")
//!     .with_subject(json!({"workflow": "wf-789"}));
//! let receipt = client.decide(params).await?;
//! if receipt.is_allow() {
//!     client.execute(Some(&receipt), "execute_workflow", None).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod gateway;
pub mod http;
pub mod logging;
pub mod retry;

pub use client::{DecideParams, KeonClient, Subject};
pub use config::{AuthConfig, ClientConfig, LoggingConfig};
pub use gateway::Gateway;
pub use http::HttpGateway;
pub use retry::{classify, FailureClass, Retrier, RetryPolicy, Sleeper, TokioSleeper};

pub use keon_types;
pub use tokio_util::sync::CancellationToken;
