//! Scripted generation provider for tests
//!
//! Replays a fixed list of chunks, then resolves (or rejects) the completion
//! signal. Records every request and how many chunks were actually pulled,
//! so tests can check ordering and that cancellation stops the source.

use super::error::ProviderError;
use super::traits::{GenerateRequest, GenerationHandle, GenerationProvider, GenerationSummary};
use crate::chat::types::StreamChunk;
use async_trait::async_trait;
use futures::{stream, FutureExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Deterministic provider replaying a script.
///
/// # Example
///
/// ```rust
/// use bedrock_assistant::provider::{GenerationProvider, MockProvider};
/// use bedrock_assistant::provider::{GenerateRequest, GenerationConfig};
/// use futures::StreamExt;
///
/// # tokio_test::block_on(async {
/// let provider = MockProvider::with_chunks(["Hello", ", ", "world"]);
/// let request = GenerateRequest {
///     model: "mock".into(),
///     parts: vec![],
///     config: GenerationConfig::default(),
/// };
/// let handle = provider.generate_stream(request).await.unwrap();
/// let chunks: Vec<_> = handle.chunks.collect().await;
/// assert_eq!(chunks.len(), 3);
/// assert!(handle.completion.await.is_ok());
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockProvider {
    script: Vec<Result<StreamChunk, ProviderError>>,
    completion: Option<ProviderError>,
    setup_error: Option<ProviderError>,
    hold_open: bool,
    requests: Arc<Mutex<Vec<GenerateRequest>>>,
    pulled: Arc<AtomicUsize>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider emitting one text chunk per item, then completing successfully.
    pub fn with_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().chunks(chunks)
    }

    pub fn chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script
            .extend(chunks.into_iter().map(|c| Ok(StreamChunk::Text(c.into()))));
        self
    }

    /// Append an arbitrary chunk (metadata, provider error event, ...).
    pub fn push_chunk(mut self, chunk: StreamChunk) -> Self {
        self.script.push(Ok(chunk));
        self
    }

    /// Append a transport-level failure to the chunk source.
    pub fn push_error(mut self, error: ProviderError) -> Self {
        self.script.push(Err(error));
        self
    }

    /// Reject the completion signal after the chunks are exhausted.
    pub fn fail_completion(mut self, error: ProviderError) -> Self {
        self.completion = Some(error);
        self
    }

    /// Refuse the call before any stream is created.
    pub fn fail_setup(mut self, error: ProviderError) -> Self {
        self.setup_error = Some(error);
        self
    }

    /// Keep the chunk source open (pending) after the script, until cancelled.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of chunks the consumer pulled from the source.
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    /// Whether the cancel token of the latest generation fired.
    pub async fn was_cancelled(&self) -> bool {
        self.cancel
            .lock()
            .await
            .as_ref()
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    async fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationHandle, ProviderError> {
        self.requests.lock().await.push(request);

        if let Some(err) = &self.setup_error {
            return Err(err.clone());
        }

        let token = CancellationToken::new();
        *self.cancel.lock().await = Some(token.clone());

        let pulled = self.pulled.clone();
        let scripted = stream::iter(self.script.clone()).inspect(move |_| {
            pulled.fetch_add(1, Ordering::SeqCst);
        });
        let chunks = if self.hold_open {
            let stop = token.clone();
            scripted
                .chain(stream::pending())
                .take_until(async move { stop.cancelled().await })
                .boxed()
        } else {
            scripted.boxed()
        };

        let outcome = match &self.completion {
            Some(err) => Err(err.clone()),
            None => Ok(GenerationSummary {
                finish_reason: Some("STOP".into()),
                usage: None,
            }),
        };
        let completion = futures::future::ready(outcome).boxed();

        Ok(GenerationHandle::new(chunks, completion).with_cancel(token))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
