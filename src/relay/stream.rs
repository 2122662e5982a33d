//! RelayStream — provider chunks in, UTF-8 bytes out

use super::state::{RelayFailure, RelayHandle, RelayState, Shared};
use crate::chat::types::StreamChunk;
use crate::provider::{ChunkStream, CompletionFuture, GenerationHandle, ProviderError};
use bytes::Bytes;
use futures::{FutureExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tracing::{info, warn};

/// Failure delivered through the relay's error channel
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("stream interrupted: {0}")]
    Source(ProviderError),

    #[error("provider reported an error: {0}")]
    Provider(String),

    #[error("generation did not complete: {0}")]
    Completion(ProviderError),
}

/// Byte stream over a provider generation.
///
/// Each text chunk becomes exactly one `Bytes` item, in arrival order.
/// The stream ends (`None`) after a clean close, after its single error
/// item, or once the consumer cancelled through a [`RelayHandle`].
/// Dropping it mid-flight counts as a consumer cancellation.
pub struct RelayStream {
    source: Option<ChunkStream>,
    completion: Option<CompletionFuture>,
    shared: Arc<Shared>,
    forwarded: usize,
    forwarded_bytes: usize,
}

impl RelayStream {
    pub fn new(generation: GenerationHandle) -> Self {
        let GenerationHandle {
            chunks,
            completion,
            cancel,
        } = generation;
        Self {
            source: Some(chunks),
            completion: Some(completion),
            shared: Shared::new(cancel),
            forwarded: 0,
            forwarded_bytes: 0,
        }
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.shared.state()
    }

    /// Drain the relay and decode everything it forwarded.
    pub async fn into_text(mut self) -> Result<String, RelayError> {
        let mut buf = Vec::new();
        while let Some(item) = self.next().await {
            buf.extend_from_slice(&item?);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn release(&mut self) {
        self.source = None;
        self.completion = None;
    }

    fn fail(&mut self, err: RelayError) -> Poll<Option<Result<Bytes, RelayError>>> {
        let finalized = self
            .shared
            .finalize(RelayState::Errored(RelayFailure::Stream(err.to_string())));
        self.shared.release_upstream();
        self.release();
        if !finalized {
            // Cancelled concurrently; the consumer asked for no more items
            return Poll::Ready(None);
        }
        warn!(
            "Relay errored after {} chunk(s) / {} byte(s): {}",
            self.forwarded, self.forwarded_bytes, err
        );
        Poll::Ready(Some(Err(err)))
    }

    fn close(&mut self) -> Poll<Option<Result<Bytes, RelayError>>> {
        if self.shared.finalize(RelayState::Closed) {
            info!(
                "Relay closed: {} chunk(s) / {} byte(s) forwarded",
                self.forwarded, self.forwarded_bytes
            );
        }
        self.release();
        Poll::Ready(None)
    }
}

impl Stream for RelayStream {
    type Item = Result<Bytes, RelayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        this.shared.register(cx.waker());

        if this.shared.is_terminal() {
            this.release();
            return Poll::Ready(None);
        }
        this.shared.start();

        while let Some(source) = this.source.as_mut() {
            match source.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(StreamChunk::Text(text)))) => {
                    if text.is_empty() {
                        continue;
                    }
                    if this.shared.is_terminal() {
                        // Cancelled from another task while this chunk was in flight
                        this.release();
                        return Poll::Ready(None);
                    }
                    this.forwarded += 1;
                    this.forwarded_bytes += text.len();
                    return Poll::Ready(Some(Ok(Bytes::from(text))));
                }
                Poll::Ready(Some(Ok(StreamChunk::Metadata))) => continue,
                Poll::Ready(Some(Ok(StreamChunk::Error(message)))) => {
                    return this.fail(RelayError::Provider(message));
                }
                Poll::Ready(Some(Err(err))) => return this.fail(RelayError::Source(err)),
                Poll::Ready(None) => this.source = None,
            }
        }

        let Some(completion) = this.completion.as_mut() else {
            return Poll::Ready(None);
        };
        match completion.poll_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(_summary)) => this.close(),
            Poll::Ready(Err(err)) => this.fail(RelayError::Completion(err)),
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        // An abandoned relay must not leave the provider running
        self.shared.cancel();
    }
}

impl std::fmt::Debug for RelayStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayStream")
            .field("state", &self.state())
            .field("forwarded", &self.forwarded)
            .finish_non_exhaustive()
    }
}
