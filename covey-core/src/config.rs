//! Configuration management for Covey
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (COVEY_*)
//! 3. Config file (~/.config/covey/config.toml)
//! 4. Default values

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::workflow::OrchestratorConfig;
use crate::{Error, Result};

/// Decision-backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible endpoint
    pub api_base: String,

    /// Model to request
    pub model: String,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Orchestrator bounds
    pub orchestrator: OrchestratorConfig,

    /// Decision backend settings
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/covey/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("covey").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - COVEY_API_BASE: Base URL of the chat-completions endpoint
    /// - COVEY_MODEL: Model to request
    /// - COVEY_MAX_TURNS: Turn budget per run
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(api_base) = std::env::var("COVEY_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Ok(model) = std::env::var("COVEY_MODEL") {
            self.llm.model = model;
        }

        if let Ok(max_turns) = std::env::var("COVEY_MAX_TURNS") {
            match max_turns.parse() {
                Ok(value) => self.orchestrator.max_turns = value,
                Err(_) => {
                    tracing::warn!(value = %max_turns, "Ignoring unparseable COVEY_MAX_TURNS")
                }
            }
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(
        mut self,
        api_base: Option<String>,
        model: Option<String>,
        max_turns: Option<u32>,
    ) -> Self {
        if let Some(base) = api_base {
            self.llm.api_base = base;
        }

        if let Some(m) = model {
            self.llm.model = m;
        }

        if let Some(turns) = max_turns {
            self.orchestrator.max_turns = turns;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(
        api_base: Option<String>,
        model: Option<String>,
        max_turns: Option<u32>,
    ) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()
            .with_cli_overrides(api_base, model, max_turns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.orchestrator.max_turns, 20);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.api_base, "https://api.openai.com/v1");
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().with_cli_overrides(
            Some("https://proxy.example/v1".to_string()),
            Some("gpt-4o".to_string()),
            Some(7),
        );

        assert_eq!(config.llm.api_base, "https://proxy.example/v1");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.orchestrator.max_turns, 7);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[orchestrator]
max_turns = 12
tool_timeout = "30s"
post_attempts = 2

[llm]
model = "gpt-4o"
request_timeout = "90s"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.orchestrator.max_turns, 12);
        assert_eq!(config.orchestrator.tool_timeout, Duration::from_secs(30));
        assert_eq!(config.orchestrator.post_attempts, 2);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.request_timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
[llm]
model = "gpt-4o"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        // Everything else should use defaults
        assert_eq!(config.orchestrator.max_turns, 20);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.api_base, "https://api.openai.com/v1");
    }
}
