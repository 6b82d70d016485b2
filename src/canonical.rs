//! Canonical JSON and hashing primitives shared by the audit logger and
//! the policy engines.
//!
//! Canonical form: object keys sorted lexicographically, no whitespace,
//! arrays in order, control characters escaped, no trailing newline. Two
//! JSON documents that differ only in key order hash identically.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Produce the canonical byte representation of a JSON value.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    write_canonical(value, &mut buf);
    buf
}

fn write_canonical(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(b) => buf.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => buf.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_canonical_string(s, buf),
        Value::Array(arr) => {
            buf.push(b'[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_canonical(item, buf);
            }
            buf.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            buf.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_canonical_string(key, buf);
                buf.push(b':');
                write_canonical(&map[*key], buf);
            }
            buf.push(b'}');
        }
    }
}

fn write_canonical_string(s: &str, buf: &mut Vec<u8>) {
    buf.push(b'"');
    for ch in s.chars() {
        match ch {
            '"' => buf.extend_from_slice(b"\\\""),
            '\\' => buf.extend_from_slice(b"\\\\"),
            '\n' => buf.extend_from_slice(b"\\n"),
            '\r' => buf.extend_from_slice(b"\\r"),
            '\t' => buf.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                buf.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut tmp = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
    buf.push(b'"');
}

/// SHA-256 of arbitrary bytes as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Deterministic hash of tool-call arguments: SHA-256 of the canonical JSON.
/// Absent or null arguments hash as the empty object.
pub fn hash_args(args: Option<&Value>) -> String {
    match args {
        Some(Value::Null) | None => sha256_hex(b"{}"),
        Some(v) => sha256_hex(&canonicalize(v)),
    }
}

/// Short hash prefix used in log lines: the first 8 bytes of the SHA-256,
/// hex-encoded. Correlates content without disclosing it.
pub fn content_hash_prefix(content: &str) -> String {
    sha256_hex(content.as_bytes())[..16].to_string()
}
