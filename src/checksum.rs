//! Canonical field signing for Herepay requests and events.
//!
//! The processor authenticates both directions with the same scheme: drop
//! any `checksum` key, sort the remaining keys lexicographically, join the
//! *values* (not keys) with a single comma, and HMAC-SHA256 the result
//! with the merchant private key. The digest travels as lowercase hex in
//! a `checksum` field.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Key excluded from the signed payload
pub const CHECKSUM_FIELD: &str = "checksum";

/// Signs a field map with the merchant private key.
///
/// Any `checksum` entry in the input is ignored, so signing a map that
/// already carries a digest is stable. An empty map signs the empty
/// string; that is defined behavior, not an error.
pub fn sign(fields: &BTreeMap<String, String>, private_key: &str) -> String {
    let payload = canonical_payload(fields);
    let mut mac =
        HmacSha256::new_from_slice(private_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Recomputes the digest over `fields` minus `checksum` and compares it
/// against the claimed value in constant time.
pub fn verify(fields: &BTreeMap<String, String>, claimed: &str, private_key: &str) -> bool {
    let expected = sign(fields, private_key);
    constant_time_eq(&expected, claimed)
}

/// Comma-joined values in sorted-key order, `checksum` excluded.
///
/// BTreeMap iteration already yields lexicographic key order, which is
/// exactly the processor's `ksort` contract.
fn canonical_payload(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .filter(|(k, _)| k.as_str() != CHECKSUM_FIELD)
        .map(|(_, v)| v.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Flattens a JSON object into the string map the signing scheme operates
/// on. Structured values are serialized to canonical (compact) JSON before
/// concatenation; numbers keep their literal decimal representation so a
/// signed `25.50` never drifts to `25.5` on the way through.
pub fn normalize_fields(object: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    object
        .iter()
        .map(|(k, v)| (k.clone(), normalize_value(v)))
        .collect()
}

fn normalize_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        // serde_json's arbitrary_precision keeps the source token, so this
        // is the stable decimal representation the scheme requires.
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
