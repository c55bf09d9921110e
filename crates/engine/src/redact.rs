//! Secret redaction utility (§6.6, §9 Design Notes).
//!
//! Centralised here so every trace-digest boundary and every logged error
//! payload applies the same substring key list, instead of each call site
//! growing its own ad-hoc heuristic.

use serde_json::Value;

/// Case-insensitive substrings that mark a field name as holding a secret.
pub const REDACTED_KEYS: &[&str] = &[
    "api_key",
    "apikey",
    "access_key",
    "secret",
    "token",
    "authorization",
    "password",
    "private_key",
    "client_secret",
];

pub fn is_secret_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    REDACTED_KEYS.iter().any(|needle| lower.contains(needle))
}

/// Replace every value whose field name matches the redaction list with a
/// fixed placeholder, recursing into nested objects/arrays. Used before
/// attaching inputs to spans and before building trace digests (§4.5,
/// §4.6).
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_secret_key(k) {
                    out.insert(k.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    out.insert(k.clone(), redact_value(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}

const DIGEST_TRUNCATE_CHARS: usize = 512;
const HASH_BYTES_THRESHOLD: usize = 4096;

/// Build a length-bounded, secret-redacted JSON digest string suitable for
/// `TraceStep::{inputs,outputs}_digest` (§4.6). Strings are truncated to
/// `DIGEST_TRUNCATE_CHARS`; if the whole serialized payload exceeds
/// `HASH_BYTES_THRESHOLD` bytes it is collapsed to a short content hash
/// instead of being embedded verbatim.
pub fn digest(value: &Value) -> String {
    let redacted = redact_value(value);
    let truncated = truncate_strings(&redacted, DIGEST_TRUNCATE_CHARS);
    let serialized = serde_json::to_string(&truncated).unwrap_or_default();

    if serialized.len() > HASH_BYTES_THRESHOLD {
        format!("sha256:{}", hex_digest(serialized.as_bytes()))
    } else {
        serialized
    }
}

fn truncate_strings(value: &Value, max_chars: usize) -> Value {
    match value {
        Value::String(s) if s.chars().count() > max_chars => {
            let truncated: String = s.chars().take(max_chars).collect();
            Value::String(format!("{truncated}…"))
        }
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), truncate_strings(v, max_chars))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| truncate_strings(v, max_chars)).collect()),
        other => other.clone(),
    }
}

/// FNV-1a, adequate for a length-bounded digest fingerprint — not used for
/// anything security-sensitive.
fn hex_digest(bytes: &[u8]) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_known_secret_keys_case_insensitively() {
        let input = json!({ "API_Key": "sk-123", "nested": { "Authorization": "Bearer xyz" }, "query": "hello" });
        let redacted = redact_value(&input);
        assert_eq!(redacted["API_Key"], json!("[REDACTED]"));
        assert_eq!(redacted["nested"]["Authorization"], json!("[REDACTED]"));
        assert_eq!(redacted["query"], json!("hello"));
    }

    #[test]
    fn digest_never_contains_redacted_substrings() {
        let input = json!({ "password": "hunter2", "client_secret": "abc" });
        let d = digest(&input);
        assert!(!d.contains("hunter2"));
        assert!(!d.contains("abc"));
    }

    #[test]
    fn digest_truncates_long_strings() {
        let long = "x".repeat(DIGEST_TRUNCATE_CHARS + 50);
        let input = json!({ "text": long });
        let d = digest(&input);
        assert!(d.len() < long.len());
    }
}
