//! Environment-driven configuration, read once at startup.

use llm::provider::ProviderConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub provider: ProviderConfig,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port_raw = env_or("PORT", "3000");
        let port = port_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "PORT",
            value: port_raw,
        })?;

        let defaults = ProviderConfig::default();
        let provider = ProviderConfig {
            base_url: env_or("LLM_BASE_URL", &defaults.base_url),
            api_key: env_or("LLM_API_KEY", &defaults.api_key),
            chat_model_id: env_or("LLM_CHAT_MODEL", &defaults.chat_model_id),
            reasoning_model_id: env_or("LLM_REASONING_MODEL", &defaults.reasoning_model_id),
            title_model_id: env_or("LLM_TITLE_MODEL", &defaults.title_model_id),
        };

        Ok(Self {
            host: env_or("HOST", "127.0.0.1"),
            port,
            database_url: env_or("DATABASE_URL", "sqlite://lumachor.db"),
            provider,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
