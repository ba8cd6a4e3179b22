//! A named, opaque JSON blob store (spec.md §6): backs the `/openapi/specs`
//! and `/grpc-protos` management endpoints, both of which this spec treats
//! as "opaque shape sources" rather than something the server parses.

use dashmap::DashMap;
use serde_json::Value;

pub struct BlobStore {
    items: DashMap<String, Value>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self { items: DashMap::new() }
    }

    pub fn list(&self) -> Vec<(String, Value)> {
        self.items.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.items.get(name).map(|e| e.value().clone())
    }

    pub fn put(&self, name: &str, value: Value) {
        self.items.insert(name.to_string(), value);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.items.remove(name).is_some()
    }
}

impl Default for BlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_round_trips() {
        let store = BlobStore::new();
        store.put("petstore", json!({"openapi": "3.0.0"}));
        assert_eq!(store.get("petstore"), Some(json!({"openapi": "3.0.0"})));
    }

    #[test]
    fn remove_reports_whether_anything_was_removed() {
        let store = BlobStore::new();
        store.put("a", json!({}));
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
    }
}
