//! Engine configuration sourced from the environment.

use thiserror::Error;

/// Environment variable naming the content-service base URL.
pub const API_BASE_VAR: &str = "LIMMUD_API_BASE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
}

/// Connection settings for the generation endpoints.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the content-generation service,
    /// e.g. `https://study.example.com`. Endpoint paths are appended to it.
    pub base_url: String,
}

impl EngineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Read the configuration from the environment. The binary loads `.env`
    /// via dotenvy before calling this.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            std::env::var(API_BASE_VAR).map_err(|_| ConfigError::MissingVar(API_BASE_VAR))?;
        if base_url.trim().is_empty() {
            return Err(ConfigError::MissingVar(API_BASE_VAR));
        }
        Ok(Self::new(base_url.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = EngineConfig::new("https://study.example.com/");
        assert_eq!(config.base_url, "https://study.example.com");
    }
}
