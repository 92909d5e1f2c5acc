//! Content ID: a pre-download, metadata-derived stable identifier.
//!
//! Metadata is a heterogeneous bag modeled as a tagged `Value` enum (per the
//! dynamic-typing note in the design notes); a canonical bencoding-style
//! encoder sorts keys, refuses nulls, and preserves type distinctions (the
//! string `"123"` and the integer `123` must encode differently). SHA-1 of
//! the canonical bytes, hex-encoded, is the content id.

use std::collections::BTreeMap;

use sha1::{Digest, Sha1};

use crate::error::{KmsyncError, Result};

/// A metadata value. Lists and dicts recurse; `Bytes` exists for providers
/// whose metadata carries raw binary fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
}

/// Encodes `value` in canonical bencoding-style form: integers as `i<n>e`,
/// byte strings (including UTF-8 strings) as `<len>:<bytes>`, lists as
/// `l...e`, and dicts as `d...e` with keys sorted lexicographically.
/// Dictionary insertion order never affects the output because keys are
/// always re-sorted at encode time.
fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Int(n) => {
            out.push(b'i');
            out.extend_from_slice(n.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Str(s) => {
            out.extend_from_slice(s.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bool(b) => {
            // Booleans are encoded as a distinct tag so "true"/"false" can
            // never collide with the strings "true"/"false".
            out.extend_from_slice(if *b { b"b1" } else { b"b0" });
        }
        Value::Bytes(b) => {
            out.push(b'x');
            out.extend_from_slice(b.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                encode_value(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(map) => {
            out.push(b'd');
            // BTreeMap already iterates in sorted key order.
            for (key, val) in map {
                encode_value(&Value::Str(key.clone()), out);
                encode_value(val, out);
            }
            out.push(b'e');
        }
    }
}

/// Normalizes a URL for content-id purposes: lowercases scheme and host,
/// strips the fragment and all query parameters, and collapses a trailing
/// slash.
pub fn normalize_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);

    let (scheme, rest) = match without_query.split_once("://") {
        Some((scheme, rest)) => (scheme.to_lowercase(), rest),
        None => (String::new(), without_query),
    };

    let (host, path) = match rest.split_once('/') {
        Some((host, path)) => (host.to_lowercase(), format!("/{path}")),
        None => (rest.to_lowercase(), String::new()),
    };

    let mut collapsed = path.trim_end_matches('/').to_string();
    if collapsed.is_empty() && !path.is_empty() {
        collapsed.push('/');
    }

    if scheme.is_empty() {
        format!("{host}{collapsed}")
    } else {
        format!("{scheme}://{host}{collapsed}")
    }
}

/// As `content_id`, but for callers whose URL may be absent entirely (the
/// source accepts a nullable URL field); `None` is rejected as
/// `InvalidArgument` since null values cannot be canonically encoded.
pub fn content_id_opt(metadata: &BTreeMap<String, Value>, url: Option<&str>) -> Result<String> {
    let url = url.ok_or_else(|| KmsyncError::InvalidArgument {
        message: "url must not be null".to_string(),
    })?;
    content_id(metadata, url)
}

/// Computes a content id from a provider metadata bag and a download URL.
/// `metadata` must contain a non-null `"provider"` key; an empty bag or one
/// missing `provider` yields `MissingProvider`.
pub fn content_id(metadata: &BTreeMap<String, Value>, url: &str) -> Result<String> {
    if metadata.is_empty() || !metadata.contains_key("provider") {
        return Err(KmsyncError::MissingProvider);
    }

    let mut full = metadata.clone();
    full.insert(
        "_url".to_string(),
        Value::Str(normalize_url(url)),
    );

    let mut bytes = Vec::new();
    encode_value(&Value::Dict(full), &mut bytes);

    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}
