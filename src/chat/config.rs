//! Chat configuration

use super::prompt::SYSTEM_INSTRUCTION;
use crate::provider::GenerationConfig;
use crate::ChatYamlConfig;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Configuration for the chat adapter
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Model identifier sent to the provider
    pub model: String,
    /// Per-call sampling parameters (all optional)
    pub generation: GenerationConfig,
    /// System instruction placed first in every prompt
    pub system_instruction: String,
}

impl ChatConfig {
    /// Create config from environment and built-in defaults
    pub fn from_env() -> Self {
        Self::from_yaml_and_env(&ChatYamlConfig::default())
    }

    /// Resolve the chat section. Priority: env var > YAML > default.
    pub fn from_yaml_and_env(yaml: &ChatYamlConfig) -> Self {
        let model = std::env::var("CHAT_MODEL")
            .ok()
            .filter(|m| !m.is_empty())
            .or_else(|| yaml.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.into());

        let generation = GenerationConfig {
            temperature: env_parse("CHAT_TEMPERATURE").or(yaml.temperature),
            max_output_tokens: env_parse("CHAT_MAX_OUTPUT_TOKENS").or(yaml.max_output_tokens),
            top_p: yaml.top_p,
            top_k: yaml.top_k,
        };

        Self {
            model,
            generation,
            system_instruction: yaml
                .system_instruction
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| SYSTEM_INSTRUCTION.into()),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            generation: GenerationConfig::default(),
            system_instruction: SYSTEM_INSTRUCTION.into(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
