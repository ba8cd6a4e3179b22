//! The context registry (spec.md §4.3): named `ApiContext`s behind a
//! concurrent map, with a background sweeper for expiration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use mockllm_core::traits::ContextStore;

use mockllm_config::ContextConfig;

use crate::context::ApiContext;
use crate::shared_keys::SharedKeyMatcher;

pub struct ContextRegistry {
    contexts: DashMap<String, Mutex<ApiContext>>,
    config: ContextConfig,
    matcher: SharedKeyMatcher,
}

impl ContextRegistry {
    pub fn new(config: ContextConfig) -> Arc<Self> {
        let matcher = SharedKeyMatcher::new(&config.shared_key_patterns);
        Arc::new(Self { contexts: DashMap::new(), config, matcher })
    }

    fn get_or_create(&self, name: &str) -> dashmap::mapref::one::Ref<'_, String, Mutex<ApiContext>> {
        self.contexts
            .entry(name.to_string())
            .or_insert_with(|| Mutex::new(ApiContext::new(name, self.config.recent_calls_limit)));
        self.contexts.get(name).expect("just inserted")
    }

    /// Merges caller-supplied key/value pairs into a context's shared data
    /// directly, for the management `/contexts/{name}/shared` endpoint
    /// (spec.md §6) — distinct from the automatic extraction `record`
    /// performs via [`SharedKeyMatcher`].
    pub fn patch_shared(&self, name: &str, pairs: Vec<(String, String)>) {
        let entry = self.get_or_create(name);
        entry.value().lock().merge_shared(pairs);
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let expiration = Duration::from_secs(registry.config.expiration_minutes * 60);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let before = registry.contexts.len();
                        registry.contexts.retain(|_, ctx| !ctx.lock().is_expired(expiration));
                        let after = registry.contexts.len();
                        if before != after {
                            info!(removed = before - after, remaining = after, "context store sweep evicted contexts");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("context store sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[async_trait]
impl ContextStore for ContextRegistry {
    async fn record(&self, name: &str, method: &str, path: &str, request_body: &str, response_body: &str) {
        let entry = self.get_or_create(name);
        let mut ctx = entry.value().lock();
        ctx.record_call(method, path, request_body, response_body);

        if let Ok(parsed) = mockllm_core::Json::parse(response_body) {
            let pairs = self.matcher.extract(&parsed);
            ctx.merge_shared(pairs);
        }
    }

    async fn format_for_prompt(&self, name: &str) -> Option<String> {
        self.contexts.get(name).map(|entry| entry.value().lock().format_for_prompt())
    }

    async fn clear(&self, name: &str) {
        self.contexts.remove(name);
    }

    async fn clear_all(&self) {
        self.contexts.clear();
    }

    async fn list_all(&self) -> Vec<String> {
        self.contexts.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn snapshot(&self, name: &str) -> Option<serde_json::Value> {
        self.contexts.get(name).map(|entry| {
            let ctx = entry.value().lock();
            json!({
                "name": ctx.name,
                "recentCalls": ctx.recent_calls.iter().map(|c| json!({
                    "method": c.method,
                    "path": c.path,
                    "requestBody": c.request_body,
                    "responseBody": c.response_body,
                    "at": c.at,
                })).collect::<Vec<_>>(),
                "sharedData": ctx.shared_data.iter().cloned().collect::<std::collections::BTreeMap<_, _>>(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_merges_shared_keys_across_calls() {
        let registry = ContextRegistry::new(ContextConfig::default());
        registry.record("orders", "POST", "/api/mock/orders", "{}", r#"{"orderId":"A1"}"#).await;
        registry.record("orders", "POST", "/api/mock/orders", "{}", r#"{"orderId":"A2","customerName":"Ann"}"#).await;

        let snapshot = registry.snapshot("orders").await.unwrap();
        let shared = snapshot.get("sharedData").unwrap();
        assert_eq!(shared.get("orderId").unwrap(), "A2");
        assert_eq!(shared.get("customerName").unwrap(), "Ann");
    }

    #[tokio::test]
    async fn clear_removes_named_context() {
        let registry = ContextRegistry::new(ContextConfig::default());
        registry.record("a", "GET", "/x", "{}", "{}").await;
        registry.clear("a").await;
        assert!(registry.format_for_prompt("a").await.is_none());
    }

    #[tokio::test]
    async fn list_all_reflects_recorded_contexts() {
        let registry = ContextRegistry::new(ContextConfig::default());
        registry.record("a", "GET", "/x", "{}", "{}").await;
        registry.record("b", "GET", "/y", "{}", "{}").await;
        let mut names = registry.list_all().await;
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
