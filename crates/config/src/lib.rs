//! Configuration for the mock LLM API server.
//!
//! Supports loading from:
//! - TOML files
//! - Environment variables (`MOCKLLM_` prefix, `__` as the nesting
//!   separator, e.g. `MOCKLLM_SERVER__PORT=9090`)
//! - Library-default fallback when neither is present (so the server runs
//!   out of the box against a local Ollama instance)

pub mod settings;

pub use settings::{
    AuthConfig, AuthMode, BackendConfig, CacheConfig, ChunkingConfig, ContextConfig,
    ProviderKind, PushConfig, RateLimitConfig, RateLimitDelayRange, ResilienceConfig,
    SanitizerConfig, ServerConfig, Settings, StreamingConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Load settings from (in increasing precedence order): built-in defaults,
/// an optional `config_path` TOML file, then `MOCKLLM_*` environment
/// variables.
pub fn load_settings(config_path: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&Settings::default())?);

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::with_name(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MOCKLLM")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.backends.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "backends".to_string(),
            message: "at least one backend must be configured".to_string(),
        });
    }
    if settings.server.auth.enabled && settings.server.auth.secret.is_none() {
        return Err(ConfigError::InvalidValue {
            field: "server.auth.secret".to_string(),
            message: "auth is enabled but no secret is configured".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings.server.prefix, "/api/mock");
        assert_eq!(settings.backends.len(), 1);
    }

    #[test]
    fn rejects_enabled_auth_without_secret() {
        let mut settings = Settings::default();
        settings.server.auth.enabled = true;
        assert!(validate(&settings).is_err());
    }
}
