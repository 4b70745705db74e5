//! Envelope response cache
//!
//! Keys are blake3 hashes of the capability name and the canonical JSON of
//! the input, so field order never changes the key. Values are successful
//! envelopes with a fixed TTL.

use moka::sync::Cache;
use sdk::envelope::{Capability, Envelope};
use serde_json::Value;
use std::time::Duration;

/// Injectable envelope cache
pub trait EnvelopeCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Envelope>;
    fn insert(&self, key: String, envelope: Envelope);
}

/// In-memory cache with TinyLFU admission and per-entry TTL
pub struct MemoryEnvelopeCache {
    cache: Cache<String, Envelope>,
}

impl MemoryEnvelopeCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Number of entries currently in the cache.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EnvelopeCache for MemoryEnvelopeCache {
    fn get(&self, key: &str) -> Option<Envelope> {
        self.cache.get(key)
    }

    fn insert(&self, key: String, envelope: Envelope) {
        self.cache.insert(key, envelope);
    }
}

/// Cache key for `(capability, input)`
pub fn cache_key(capability: Capability, input: &Value) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(capability.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(canonical_json(input).as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// JSON text with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
