//! Bedrock Assistant
//!
//! A chat assistant for Minecraft Bedrock addon development:
//! - Gemini `streamGenerateContent` behind a `GenerationProvider` trait
//! - Stream relay turning provider chunks into an unframed UTF-8 byte stream
//! - Axum HTTP API (`POST /api/chat`) and a CLI (`serve`, `ask`, `chat`)

pub mod api;
pub mod chat;
pub mod provider;
pub mod relay;

use anyhow::{Context, Result};
use chat::{ChatAdapter, ChatConfig};
use provider::GeminiProvider;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub gemini: GeminiYamlConfig,
    pub chat: ChatYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
    pub host: String,
    /// Upper bound for a chat request body (images travel inline)
    pub max_request_bytes: usize,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".into(),
            max_request_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Gemini provider section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiYamlConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Connection timeout; streamed bodies are not bounded by it
    pub timeout_secs: u64,
}

impl Default for GeminiYamlConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: provider::gemini::DEFAULT_BASE_URL.into(),
            timeout_secs: 30,
        }
    }
}

/// Chat configuration section (YAML only; ChatConfig resolves env overrides)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ChatYamlConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub system_instruction: Option<String>,
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub max_request_bytes: usize,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_timeout_secs: u64,
    pub chat: ChatConfig,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .ok()
            .or(yaml.gemini.api_key)
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            server_host: std::env::var("SERVER_HOST").unwrap_or(yaml.server.host),
            server_port: env_parse("SERVER_PORT").unwrap_or(yaml.server.port),
            max_request_bytes: env_parse("MAX_REQUEST_BYTES")
                .unwrap_or(yaml.server.max_request_bytes),
            gemini_api_key,
            gemini_base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(yaml.gemini.base_url),
            gemini_timeout_secs: env_parse("GEMINI_TIMEOUT_SECS")
                .unwrap_or(yaml.gemini.timeout_secs),
            chat: ChatConfig::from_yaml_and_env(&yaml.chat),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Build the chat adapter backed by Gemini.
pub fn build_adapter(config: &Config) -> Result<ChatAdapter> {
    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; chat requests will be rejected");
    }
    let provider = GeminiProvider::new(
        config.gemini_base_url.clone(),
        config.gemini_api_key.clone(),
        Duration::from_secs(config.gemini_timeout_secs),
    )
    .context("failed to create Gemini client")?;

    Ok(ChatAdapter::new(Arc::new(provider), config.chat.clone()))
}

/// Run the HTTP server until Ctrl-C.
pub async fn start_server(config: Config) -> Result<()> {
    let adapter = build_adapter(&config)?;
    let state = Arc::new(api::handlers::ServerState {
        adapter,
        max_request_bytes: config.max_request_bytes,
    });
    let app = api::create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(
        "Bedrock assistant listening on http://{} (model {})",
        addr,
        config.chat.model
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_config_loading() {
        let yaml = r#"
server:
  port: 9090
  host: 0.0.0.0
  max_request_bytes: 1048576

gemini:
  api_key: yaml-key
  base_url: http://localhost:9999/v1beta
  timeout_secs: 5

chat:
  model: gemini-1.5-flash
  temperature: 0.7
  top_k: 32
  system_instruction: "Only talk about redstone."
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.max_request_bytes, 1_048_576);
        assert_eq!(config.gemini.api_key.as_deref(), Some("yaml-key"));
        assert_eq!(config.gemini.timeout_secs, 5);
        assert_eq!(config.chat.model.as_deref(), Some("gemini-1.5-flash"));
        assert_eq!(config.chat.temperature, Some(0.7));
        assert_eq!(config.chat.top_k, Some(32));
    }

    #[test]
    fn test_yaml_defaults() {
        let config = YamlConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.max_request_bytes, 10 * 1024 * 1024);
        assert!(config.gemini.api_key.is_none());
        assert_eq!(
            config.gemini.base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert!(config.chat.model.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_section_defaults() {
        let yaml = r#"
server:
  port: 3000
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.gemini.timeout_secs, 30);
    }

    /// Combined test for YAML file loading and env var overrides.
    /// Runs as a single test to avoid parallel env var race conditions.
    #[test]
    fn test_yaml_and_env_lifecycle() {
        fn clear_env() {
            for var in &[
                "SERVER_HOST",
                "SERVER_PORT",
                "MAX_REQUEST_BYTES",
                "GEMINI_API_KEY",
                "GOOGLE_API_KEY",
                "GEMINI_BASE_URL",
                "GEMINI_TIMEOUT_SECS",
            ] {
                std::env::remove_var(var);
            }
        }

        // --- Phase 1: YAML values loaded correctly ---
        let yaml = r#"
server:
  port: 9999
  host: 0.0.0.0
gemini:
  api_key: yaml-key
  base_url: http://yaml-host/v1beta
chat:
  system_instruction: "Bedrock only."
"#;
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&file_path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        clear_env();

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.server_port, 9999);
        assert_eq!(config.bind_addr(), "0.0.0.0:9999");
        assert_eq!(config.gemini_api_key.as_deref(), Some("yaml-key"));
        assert_eq!(config.gemini_base_url, "http://yaml-host/v1beta");
        assert_eq!(config.chat.system_instruction, "Bedrock only.");

        // --- Phase 2: Env vars override YAML ---
        std::env::set_var("SERVER_PORT", "7777");
        std::env::set_var("GOOGLE_API_KEY", "google-key");
        std::env::set_var("GEMINI_TIMEOUT_SECS", "12");

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.server_port, 7777);
        assert_eq!(config.gemini_api_key.as_deref(), Some("google-key"));
        assert_eq!(config.gemini_timeout_secs, 12);
        // YAML value still used where no env override
        assert_eq!(config.server_host, "0.0.0.0");

        // GEMINI_API_KEY wins over GOOGLE_API_KEY
        std::env::set_var("GEMINI_API_KEY", "gemini-key");
        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.gemini_api_key.as_deref(), Some("gemini-key"));

        // Invalid number falls back to YAML / default
        std::env::set_var("SERVER_PORT", "not-a-port");
        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.server_port, 9999);

        clear_env();

        // --- Phase 3: No YAML file → defaults ---
        let nonexistent = Path::new("/tmp/nonexistent-bedrock-config-12345.yaml");
        let config = Config::from_yaml_and_env(Some(nonexistent)).unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.max_request_bytes, 10 * 1024 * 1024);
        assert!(config.gemini_api_key.is_none());

        // --- Phase 4: Corrupt YAML → defaults ---
        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "server: [unclosed").unwrap();
        let config = Config::from_yaml_and_env(Some(&bad)).unwrap();
        assert_eq!(config.server_port, 8080);
    }

    #[tokio::test]
    async fn test_build_adapter_uses_chat_config() {
        let mut config = Config::from_yaml_and_env(Some(Path::new(
            "/tmp/nonexistent-bedrock-config-67890.yaml",
        )))
        .unwrap();
        config.chat = ChatConfig::default().with_model("gemini-test");
        let adapter = build_adapter(&config).unwrap();
        assert_eq!(adapter.provider_name(), "gemini");
        assert_eq!(adapter.config().model, "gemini-test");
    }
}
