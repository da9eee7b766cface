//! Schema drift tripwires.
//!
//! Each contract type keeps its required field list next to its definition
//! and pins a fingerprint of that list. Changing the list without updating
//! the pin fails [`verify_required_fields`] and the sentinel tests.

use sha2::{Digest, Sha256};

use crate::contracts::{DecideRequest, DecisionReceipt};
use crate::error::{KeonError, KeonResult};

pub const DECIDE_REQUEST_FINGERPRINT: &str = <DecideRequest as RequiredFields>::PINNED_FINGERPRINT;
pub const DECISION_RECEIPT_FINGERPRINT: &str =
    <DecisionReceipt as RequiredFields>::PINNED_FINGERPRINT;

/// Static required-field metadata for a contract type.
pub trait RequiredFields {
    const TYPE_NAME: &'static str;
    /// snake_case names of the fields a valid instance must carry.
    const REQUIRED_FIELDS: &'static [&'static str];
    const PINNED_FINGERPRINT: &'static str;
}

/// First 16 hex chars of SHA-256 over the sorted names rendered as
/// `["a", "b", ...]`.
pub fn fingerprint(fields: &[&str]) -> String {
    let mut sorted: Vec<&str> = fields.to_vec();
    sorted.sort_unstable();

    let rendered = sorted
        .iter()
        .map(|name| format!("\"{}\"", name.escape_default()))
        .collect::<Vec<_>>()
        .join(", ");
    let digest = Sha256::digest(format!("[{rendered}]").as_bytes());

    let mut hex = hex::encode(digest);
    hex.truncate(16);
    hex
}

/// Compare `T`'s current required fields against its pin.
pub fn verify_required_fields<T: RequiredFields>() -> KeonResult<()> {
    let actual = fingerprint(T::REQUIRED_FIELDS);
    if actual == T::PINNED_FINGERPRINT {
        return Ok(());
    }
    Err(KeonError::DriftDetected {
        type_name: T::TYPE_NAME,
        expected: T::PINNED_FINGERPRINT.to_string(),
        actual,
        fields: T::REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
    })
}

/// Verify every contract type this crate pins.
pub fn verify_all() -> KeonResult<()> {
    verify_required_fields::<DecideRequest>()?;
    verify_required_fields::<DecisionReceipt>()
}
