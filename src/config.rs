//! Service configuration
//!
//! Loaded from an optional TOML file, then `CONTEXT_BUDGET__SECTION__KEY`
//! environment overrides. Feature toggles additionally honour the rollout
//! variables read by [`FeatureToggles::from_env`].

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::api::DEFAULT_MAX_BODY_BYTES;
use crate::cache::CacheConfig;
use crate::context::assembler::AssemblerConfig;
use crate::context::classifier::ClassifierConfig;
use crate::context::summarizer::SummarizerConfig;
use crate::context::token_budget::TokenBudgetConfig;
use crate::error::{ContextError, Result};
use crate::quality::QualityConfig;
use crate::retrieval::RetrievalConfig;
use crate::toggles::FeatureToggles;

pub const ENV_PREFIX: &str = "CONTEXT_BUDGET";
pub const DEFAULT_CONFIG_PATH: &str = "config/context-budget.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ContextError::Configuration(format!("invalid server address: {}", e)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` wins when set
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub budget: TokenBudgetConfig,
    pub quality: QualityConfig,
    pub classifier: ClassifierConfig,
    pub retrieval: RetrievalConfig,
    pub summarizer: SummarizerConfig,
    pub cache: CacheConfig,
    pub assembler: AssemblerConfig,
    pub toggles: FeatureToggles,
}

impl Config {
    /// Load `.env`, the config file (if present) and environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.toggles = config.toggles.from_env()?;
        config.validate()?;

        info!(
            path = %path.display(),
            default_strategy = %config.toggles.default_strategy,
            index_configured = config.retrieval.index.url.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.budget.validate()?;

        let quality = &self.quality;
        if quality.soft_threshold > quality.hard_ceiling {
            return Err(ContextError::Configuration(format!(
                "quality soft threshold {} exceeds hard ceiling {}",
                quality.soft_threshold, quality.hard_ceiling
            )));
        }
        if !(0.0..=1.0).contains(&self.assembler.history_share) {
            return Err(ContextError::Configuration(format!(
                "assembler history_share {} outside [0, 1]",
                self.assembler.history_share
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(ContextError::Configuration("retrieval top_k must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.socket_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("context-budget-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[server]\nport = 9090\n\n[budget.balanced]\ncontext_tokens = 3000\nresponse_tokens = 800\n\n[retrieval]\ntop_k = 12"
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.budget.balanced.context_tokens, 3000);
        assert_eq!(config.retrieval.top_k, 12);
        assert_eq!(config.budget.aggressive.context_tokens, 2600);
    }

    #[test]
    fn test_invalid_history_share_rejected() {
        let mut config = Config::default();
        config.assembler.history_share = 1.5;
        assert!(matches!(config.validate(), Err(ContextError::Configuration(_))));
    }
}
