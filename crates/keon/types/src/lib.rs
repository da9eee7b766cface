//! Keon Types: contracts and identifiers for governed execution.
//!
//! A caller asks the Keon runtime for a decision, receives a
//! [`DecisionReceipt`], and may only execute while holding an allowing,
//! unexpired receipt. This crate holds the pieces of that boundary that need
//! no I/O.
//!
//! ## Invariants
//!
//! - **Canonical correlation ids**: every [`CorrelationId`] in hand matches
//!   `t:<TenantId>|c:<uuidv7>`. Parsing is the only way in.
//! - **Content binding**: a [`DecideRequest`] always carries a non-empty
//!   subject hash, produced by [`canonical::subject_hash`] over the RFC 8785
//!   form of the subject.
//! - **Receipt authority**: an [`ExecuteRequest`] can only be built from a
//!   receipt that allows and has not expired.
//! - **Drift tripwires**: required-field lists are fingerprinted and pinned in
//!   [`drift`].

pub mod canonical;
pub mod contracts;
pub mod correlation;
pub mod drift;
pub mod error;

pub use canonical::{
    canonicalize, canonicalize_bytes, canonicalize_to_string, subject_hash, subject_hash_of,
    validate_integrity,
};
pub use contracts::{
    DecideRequest, DecideRequestFields, Decision, DecisionReceipt, DecisionReceiptBuilder,
    ErrorDetail, ExecuteRequest, ExecutionResult, ExecutionStatus, ReceiptId, ResponseEnvelope,
};
pub use correlation::CorrelationId;
pub use drift::{
    fingerprint, verify_required_fields, RequiredFields, DECIDE_REQUEST_FINGERPRINT,
    DECISION_RECEIPT_FINGERPRINT,
};
pub use error::{ErrorCode, KeonError, KeonResult};
