//! Text-generation providers
//!
//! Architecture follows the project pattern (trait + impl + mock):
//! - `GenerationProvider` trait: async interface for streaming generation
//! - `GeminiProvider`: real implementation over Gemini `streamGenerateContent`
//! - `MockProvider`: scripted provider for tests

pub mod error;
pub mod gemini;
pub mod mock;
pub mod traits;

pub use error::ProviderError;
pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use traits::{
    ChunkStream, CompletionFuture, GenerateRequest, GenerationConfig, GenerationHandle,
    GenerationProvider, GenerationSummary, PromptPart, TokenUsage,
};
