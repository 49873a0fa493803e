//! Terminal front end configuration.
//!
//! Loaded via the `config` crate from `AIBOT__`-prefixed environment
//! variables, nested keys separated by `__`:
//!
//! ```text
//! AIBOT__OPENAI__API_KEY=sk-...
//! AIBOT__OPENAI__MODEL=gpt-4o-mini
//! AIBOT__CHAT__INSTRUCTIONS="You are a helpful assistant."
//! AIBOT__CHAT__MAX_TURNS=10
//! ```

use aibot_ai::{LoopConfig, OpenAiConfig};
use serde::Deserialize;

/// CLI configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct CliConfig {
    /// Completion backend connection.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Conversation Loop settings.
    #[serde(default)]
    pub chat: LoopConfig,

    /// Extra guidance injected before every turn.
    #[serde(default)]
    pub additional_instructions: String,

    /// User that unprefixed input lines are attributed to.
    #[serde(default = "default_user")]
    pub default_user: String,
}

fn default_user() -> String {
    "local".to_string()
}

impl CliConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed into its field.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::with_prefix("AIBOT"))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                environment
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> CliConfig {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CliConfig::from_environment(config::Environment::with_prefix("AIBOT").source(Some(source)))
            .expect("config loads")
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = load(&[]);
        assert_eq!(config.default_user, "local");
        assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
        assert_eq!(config.chat.max_turns, Some(25));
        assert!(config.additional_instructions.is_empty());
    }

    #[test]
    fn nested_keys_are_read() {
        let config = load(&[
            ("AIBOT__OPENAI__API_KEY", "sk-test"),
            ("AIBOT__OPENAI__MODEL", "gpt-test"),
            ("AIBOT__CHAT__INSTRUCTIONS", "be brief"),
            ("AIBOT__CHAT__MAX_TURNS", "4"),
            ("AIBOT__CHAT__CALL_TIMEOUT_SECS", "30"),
            ("AIBOT__DEFAULT_USER", "ada"),
        ]);
        assert_eq!(config.openai.api_key, "sk-test");
        assert_eq!(config.openai.model, "gpt-test");
        assert_eq!(config.chat.instructions, "be brief");
        assert_eq!(config.chat.max_turns, Some(4));
        assert_eq!(config.chat.call_timeout_secs, Some(30));
        assert_eq!(config.default_user, "ada");
    }
}
