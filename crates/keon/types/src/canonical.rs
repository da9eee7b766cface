//! Deterministic JSON canonicalization (RFC 8785 / JCS style) and subject hashing.
//!
//! Output is byte-identical for value-equal inputs regardless of key
//! insertion order or platform:
//!
//! - strings and object keys are NFC-normalized;
//! - object keys are sorted by UTF-16 code units at every nesting level;
//! - arrays keep their order;
//! - no insignificant whitespace, `,` and `:` separators;
//! - only `"`, `\` and control characters are escaped, everything else is
//!   emitted as literal UTF-8;
//! - numbers use ECMAScript shortest round-trip formatting.
//!
//! The subject hash is the lowercase hex SHA-256 of the canonical bytes. It
//! binds a decision to specific content, so the remote evaluator must be able
//! to reproduce it exactly.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::error::{KeonError, KeonResult};

/// Largest integer magnitude a double represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Canonicalize a JSON value to UTF-8 bytes.
pub fn canonicalize(value: &Value) -> KeonResult<Vec<u8>> {
    canonicalize_to_string(value).map(String::into_bytes)
}

/// Canonicalize a JSON value to a string.
pub fn canonicalize_to_string(value: &Value) -> KeonResult<String> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

/// Parse JSON bytes and re-emit them in canonical form.
pub fn canonicalize_bytes(json: &[u8]) -> KeonResult<Vec<u8>> {
    let value: Value = serde_json::from_slice(json)
        .map_err(|e| KeonError::validation(format!("invalid JSON input: {e}")))?;
    canonicalize(&value)
}

/// True when `json` is already in canonical form.
pub fn validate_integrity(json: &[u8]) -> bool {
    canonicalize_bytes(json)
        .map(|canonical| canonical == json)
        .unwrap_or(false)
}

/// Lowercase hex SHA-256 of the canonical form of `value`.
pub fn subject_hash(value: &Value) -> KeonResult<String> {
    let bytes = canonicalize(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Subject hash of any serializable payload.
pub fn subject_hash_of<T: Serialize + ?Sized>(subject: &T) -> KeonResult<String> {
    let value = serde_json::to_value(subject)
        .map_err(|e| KeonError::validation(format!("subject is not representable as JSON: {e}")))?;
    subject_hash(&value)
}

fn write_value(out: &mut String, value: &Value) -> KeonResult<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, n)?,
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(String, &Value)> =
                map.iter().map(|(k, v)| (k.nfc().collect(), v)).collect();
            entries.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));

            if entries.windows(2).any(|pair| pair[0].0 == pair[1].0) {
                return Err(KeonError::validation(
                    "object keys collide after NFC normalization",
                ));
            }

            out.push('{');
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.nfc() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_number(out: &mut String, n: &Number) -> KeonResult<()> {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
    } else if let Some(f) = n.as_f64() {
        out.push_str(&format_f64(f)?);
    } else {
        return Err(KeonError::validation(format!("unsupported number: {n}")));
    }
    Ok(())
}

/// Format a double the way ECMAScript `Number.prototype.toString` does.
fn format_f64(value: f64) -> KeonResult<String> {
    if !value.is_finite() {
        return Err(KeonError::validation(
            "NaN and Infinity are not valid JSON numbers",
        ));
    }
    if value == 0.0 {
        return Ok("0".into());
    }
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        return Ok(format!("{}", value as i64));
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "-1.2345e-7".
    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific
        .split_once('e')
        .ok_or_else(|| KeonError::validation(format!("unexpected float form: {scientific}")))?;
    let exponent: i32 = exponent
        .parse()
        .map_err(|_| KeonError::validation(format!("unexpected float form: {scientific}")))?;
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let n = exponent + 1;

    let mut out = String::new();
    if value < 0.0 {
        out.push('-');
    }

    if k <= n && n <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((n - k) as usize));
    } else if 0 < n && n <= 21 {
        let (int_part, frac_part) = digits.split_at(n as usize);
        out.push_str(int_part);
        out.push('.');
        out.push_str(frac_part);
    } else if -6 < n && n <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-n) as usize));
        out.push_str(&digits);
    } else {
        let e = n - 1;
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        out.push('e');
        out.push(if e < 0 { '-' } else { '+' });
        let _ = write!(out, "{}", e.abs());
    }
    Ok(out)
}
