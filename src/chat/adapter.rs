//! Chat request adapter — ChatRequest in, live generation out

use super::config::ChatConfig;
use super::prompt::build_prompt;
use super::types::ChatRequest;
use crate::provider::{GenerateRequest, GenerationHandle, GenerationProvider, ProviderError};
use crate::relay::RelayStream;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ChatError {
    /// The provider refused the call before any output was produced
    #[error("chat setup failed: {0}")]
    Setup(#[from] ProviderError),
}

impl ChatError {
    pub fn provider_error(&self) -> &ProviderError {
        match self {
            ChatError::Setup(err) => err,
        }
    }
}

/// Turns chat requests into streaming provider calls.
#[derive(Clone)]
pub struct ChatAdapter {
    provider: Arc<dyn GenerationProvider>,
    config: ChatConfig,
}

impl ChatAdapter {
    pub fn new(provider: Arc<dyn GenerationProvider>, config: ChatConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// The provider call a chat request maps to.
    pub fn build_request(&self, request: &ChatRequest) -> GenerateRequest {
        GenerateRequest {
            model: self.config.model.clone(),
            parts: build_prompt(request, &self.config.system_instruction),
            config: self.config.generation.clone(),
        }
    }

    /// Start a streaming generation.
    ///
    /// The input is assumed valid; callers reject empty submissions first.
    /// A provider refusal is returned here, never as a stream that stays silent.
    pub async fn start(&self, request: &ChatRequest) -> Result<GenerationHandle, ChatError> {
        let generate = self.build_request(request);
        debug!(
            "Starting generation: provider={} model={} parts={} history={} image={}",
            self.provider.name(),
            generate.model,
            generate.parts.len(),
            request.history.len(),
            request.image_data.is_some()
        );

        self.provider.generate_stream(generate).await.map_err(|e| {
            warn!("Generation setup failed: {}", e);
            ChatError::Setup(e)
        })
    }

    /// Single entry point: a chat request in, a UTF-8 byte stream out.
    pub async fn invoke_chat(&self, request: &ChatRequest) -> Result<RelayStream, ChatError> {
        let generation = self.start(request).await?;
        Ok(RelayStream::new(generation))
    }
}

impl std::fmt::Debug for ChatAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAdapter")
            .field("provider", &self.provider.name())
            .field("model", &self.config.model)
            .finish()
    }
}
