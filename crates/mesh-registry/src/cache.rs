//! Response cache for read endpoints.
//!
//! Keys are a stable hash of `(endpoint, filter)`; values are the fully
//! serialized response body, so identical queries inside the TTL return
//! byte-identical payloads. Invalidation is coarse: any mutation drops the
//! whole cache. Discovery reads dominate and mutations are infrequent, so
//! selective invalidation would not pay for itself.

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

struct Entry {
    body: String,
    inserted: Instant,
}

/// TTL-bounded cache of serialized responses.
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Stable cache key for an endpoint and its filter parameters.
    pub fn key<T: Serialize>(endpoint: &str, params: &T) -> String {
        let params = serde_json::to_string(params).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(endpoint.as_bytes());
        hasher.update(b":");
        hasher.update(params.as_bytes());
        format!("{endpoint}:{}", hex::encode(hasher.finalize()))
    }

    /// Serialized body for `key`, if present and fresh.
    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|e| e.inserted.elapsed() < self.ttl)
            .map(|e| e.body.clone())
    }

    pub fn put(&self, key: String, body: String) {
        self.entries
            .lock()
            .insert(key, Entry { body, inserted: Instant::now() });
    }

    /// Drop everything; called on every mutation.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_params_produce_identical_keys() {
        let a = ResponseCache::key("/agents", &serde_json::json!({"namespace": "default"}));
        let b = ResponseCache::key("/agents", &serde_json::json!({"namespace": "default"}));
        assert_eq!(a, b);

        let c = ResponseCache::key("/capabilities", &serde_json::json!({"namespace": "default"}));
        assert_ne!(a, c);
    }

    #[test]
    fn hit_returns_identical_body() {
        let cache = ResponseCache::default();
        let key = ResponseCache::key("/agents", &serde_json::json!({}));
        cache.put(key.clone(), "{\"agents\":[]}".to_string());
        assert_eq!(cache.get(&key).as_deref(), Some("{\"agents\":[]}"));
    }

    #[test]
    fn expired_entries_miss() {
        let cache = ResponseCache::new(Duration::from_millis(0));
        let key = ResponseCache::key("/agents", &serde_json::json!({}));
        cache.put(key.clone(), "body".to_string());
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = ResponseCache::default();
        cache.put("a".to_string(), "1".to_string());
        cache.put("b".to_string(), "2".to_string());
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
