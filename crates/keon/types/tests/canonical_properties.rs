//! Property tests: canonicalization is deterministic, idempotent and
//! independent of key insertion order.

use keon_types::{canonicalize, canonicalize_bytes, subject_hash, validate_integrity};
use proptest::prelude::*;
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Floats whose text form parses back to the identical double.
fn arb_float() -> impl Strategy<Value = f64> {
    prop::sample::select(vec![
        0.5, -2.25, 3.125, 1e-7, 1e21, 1.5e300, -0.000001, 123456.789, 100.0, -0.0,
    ])
}

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        arb_float().prop_map(Value::from),
        "\\PC{0,12}".prop_map(Value::String),
    ]
}

fn arb_json() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z_]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Render an object with its keys in reverse order, as a different producer
/// might.
fn render_reversed(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .rev()
                .map(|(k, v)| format!("{} : {}", Value::String(k.clone()), render_reversed(v)))
                .collect();
            format!("{{ {} }}", parts.join(" , "))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(render_reversed).collect();
            format!("[ {} ]", parts.join(" , "))
        }
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn canonicalization_is_idempotent(value in arb_json()) {
        let once = canonicalize(&value).unwrap();
        let twice = canonicalize_bytes(&once).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert!(validate_integrity(&once));
    }

    #[test]
    fn key_order_and_whitespace_do_not_matter(value in arb_json()) {
        let shuffled = render_reversed(&value);
        let from_shuffled = canonicalize_bytes(shuffled.as_bytes()).unwrap();
        prop_assert_eq!(canonicalize(&value).unwrap(), from_shuffled);
    }

    #[test]
    fn subject_hash_is_deterministic(value in arb_json()) {
        let first = subject_hash(&value).unwrap();
        let second = subject_hash(&value.clone()).unwrap();
        prop_assert_eq!(first.len(), 64);
        prop_assert!(first.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        prop_assert_eq!(first, second);
    }
}
