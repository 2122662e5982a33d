//! GenerationProvider trait definition
//!
//! Defines the abstract interface to a hosted text-generation service.
//! Follows the trait + impl + mock layout: async trait + `Send + Sync` so a
//! provider can be shared as `Arc<dyn GenerationProvider>`.

use super::error::ProviderError;
use crate::chat::types::{ChatRole, StreamChunk};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// One entry of the ordered prompt sent to the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    /// Standing instructions for the model (scope, tone, formatting)
    Instruction { text: String },
    /// Text attributed to a conversation role; `None` means the current user turn
    Text {
        role: Option<ChatRole>,
        text: String,
    },
    /// Media reference: a `data:` URI or a remote URL
    Media { url: String },
}

impl PromptPart {
    pub fn text(text: impl Into<String>) -> Self {
        PromptPart::Text {
            role: None,
            text: text.into(),
        }
    }

    pub fn turn(role: ChatRole, text: impl Into<String>) -> Self {
        PromptPart::Text {
            role: Some(role),
            text: text.into(),
        }
    }

    pub fn media(url: impl Into<String>) -> Self {
        PromptPart::Media { url: url.into() }
    }
}

/// Optional per-call sampling parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl GenerationConfig {
    pub fn is_empty(&self) -> bool {
        self == &GenerationConfig::default()
    }
}

/// A single streaming generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub parts: Vec<PromptPart>,
    pub config: GenerationConfig,
}

/// Token accounting reported by the provider at the end of a generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// Final bookkeeping for a finished generation. Never carries content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ProviderError>>;
pub type CompletionFuture = BoxFuture<'static, Result<GenerationSummary, ProviderError>>;

/// A live generation: the chunk source, the deferred completion signal, and
/// an optional cancel primitive that stops the provider from producing more.
pub struct GenerationHandle {
    pub chunks: ChunkStream,
    pub completion: CompletionFuture,
    pub cancel: Option<CancellationToken>,
}

impl GenerationHandle {
    pub fn new(chunks: ChunkStream, completion: CompletionFuture) -> Self {
        Self {
            chunks,
            completion,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl std::fmt::Debug for GenerationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationHandle")
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

/// Abstract interface to a streaming text-generation service.
///
/// # Implementations
///
/// - [`GeminiProvider`](super::GeminiProvider): Google Gemini
///   `streamGenerateContent` over SSE
/// - [`MockProvider`](super::MockProvider): scripted chunks and completion
///   outcome (for tests)
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Start a streaming generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refuses the call before any output
    /// is produced (bad credentials, malformed prompt, unreachable host).
    /// Once a handle is returned, later failures travel through the handle.
    async fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationHandle, ProviderError>;

    /// Short provider name for logs and health output.
    fn name(&self) -> &str;
}
