use async_trait::async_trait;

/// Capability interface for the API context store (spec.md §4.3).
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn record(&self, name: &str, method: &str, path: &str, request_body: &str, response_body: &str);

    /// A bounded text block suitable for inclusion in a prompt, or `None`
    /// if the named context doesn't exist (or has expired).
    async fn format_for_prompt(&self, name: &str) -> Option<String>;

    async fn clear(&self, name: &str);

    async fn clear_all(&self);

    async fn list_all(&self) -> Vec<String>;

    /// Raw introspection snapshot (recent calls, shared data) for the
    /// `/contexts` management endpoint. `None` if `name` doesn't exist.
    async fn snapshot(&self, name: &str) -> Option<serde_json::Value>;
}
