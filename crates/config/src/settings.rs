//! The full configuration tree, loaded once at process startup (spec.md
//! §6 "Environment/config"). No hot-reload, no persistence.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub backends: Vec<BackendConfig>,
    pub cache: CacheConfig,
    pub context: ContextConfig,
    pub resilience: ResilienceConfig,
    pub streaming: StreamingConfig,
    pub rate_limit: RateLimitConfig,
    pub chunking: ChunkingConfig,
    pub push: PushConfig,
    pub sanitizer: SanitizerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backends: vec![BackendConfig::default()],
            cache: CacheConfig::default(),
            context: ContextConfig::default(),
            resilience: ResilienceConfig::default(),
            streaming: StreamingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            chunking: ChunkingConfig::default(),
            push: PushConfig::default(),
            sanitizer: SanitizerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix for the synthesis surface, spec.md §6 (default `/api/mock`).
    pub prefix: String,
    /// Prefix for the auth-gated management surface (default `/api`).
    pub management_prefix: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    pub auth: AuthConfig,
    pub max_request_size_bytes: usize,
    /// Ingress fixed-window limit, requests per minute per client partition.
    pub requests_per_minute: u32,
    pub random_request_delay_min_ms: u64,
    pub random_request_delay_max_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            prefix: "/api/mock".to_string(),
            management_prefix: "/api".to_string(),
            cors_enabled: true,
            cors_origins: vec![],
            auth: AuthConfig::default(),
            max_request_size_bytes: 10 * 1024 * 1024,
            requests_per_minute: 600,
            random_request_delay_min_ms: 0,
            random_request_delay_max_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    ApiKey,
    Jwt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub mode: AuthMode,
    /// `ManagementAuthSecret`: the API key itself in `ApiKey` mode, or the
    /// HMAC signing secret in `Jwt` mode.
    pub secret: Option<String>,
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: AuthMode::ApiKey,
            secret: None,
            public_paths: vec!["/health".to_string(), "/ready".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAiCompatible,
    Ollama,
    LmStudio,
    Azure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub provider: ProviderKind,
    pub base_url: String,
    pub model_name: String,
    pub api_key: Option<String>,
    pub weight: u32,
    pub enabled: bool,
    pub max_tokens: Option<u32>,
    pub priority: i32,
    pub max_context_window: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            provider: ProviderKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model_name: "llama3".to_string(),
            api_key: None,
            weight: 1,
            enabled: true,
            max_tokens: Some(1024),
            priority: 0,
            max_context_window: 8192,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_cache_per_key: u32,
    pub max_items_global: usize,
    pub sliding_minutes: u64,
    pub absolute_minutes: u64,
    pub compression_enabled: bool,
    pub compression_threshold_bytes: usize,
    pub stats_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_per_key: 50,
            max_items_global: 10_000,
            sliding_minutes: 15,
            absolute_minutes: 60,
            compression_enabled: false,
            compression_threshold_bytes: 1024,
            stats_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub expiration_minutes: u64,
    pub recent_calls_limit: usize,
    /// Configurable per Open Question #3 in SPEC_FULL.md — not hard-coded.
    pub shared_key_patterns: Vec<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            expiration_minutes: 15,
            recent_calls_limit: 20,
            shared_key_patterns: vec![
                r"(?i)^id$".to_string(),
                r"(?i)id$".to_string(),
                r"(?i)name$".to_string(),
                r"(?i)email$".to_string(),
                r"(?i)^sku$".to_string(),
                r"(?i)^code$".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub max_retry_attempts: u32,
    pub retry_base_delay_secs: f64,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_duration_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_base_delay_secs: 0.5,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_duration_secs: 30,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub chunk_delay_min_ms: u64,
    pub chunk_delay_max_ms: u64,
    pub continuous_interval_ms: u64,
    /// 0 means unlimited.
    pub continuous_max_duration_secs: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_delay_min_ms: 10,
            chunk_delay_max_ms: 40,
            continuous_interval_ms: 2_000,
            continuous_max_duration_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RateLimitDelayRange {
    None,
    MinMax { min_ms: u64, max_ms: u64 },
    Max,
}

impl Default for RateLimitDelayRange {
    fn default() -> Self {
        RateLimitDelayRange::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub delay_range: RateLimitDelayRange,
    pub stats_window_size: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_range: RateLimitDelayRange::None,
            stats_window_size: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub enabled: bool,
    /// Fraction of a backend's `max_context_window` the *output* is allowed
    /// to target before chunking kicks in (spec.md §4.8: `* 0.25`).
    pub context_window_fraction: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { enabled: true, context_window_fraction: 0.25 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub interval_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self { interval_ms: 5_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    pub max_len: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self { max_len: 4000 }
    }
}
