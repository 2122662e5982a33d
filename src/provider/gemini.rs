//! Google Gemini provider
//!
//! Implements `GenerationProvider` on top of the `streamGenerateContent`
//! endpoint with `alt=sse`. The HTTP response body is read by a pump task
//! that parses server-sent events and forwards chunks through a capacity-1
//! channel, so at most one parsed chunk waits for the consumer. The pump
//! stops as soon as the generation's cancel token fires.
//!
//! Configuration via environment variables (see [`crate::Config`]):
//! - `GEMINI_API_KEY` (or `GOOGLE_API_KEY`)
//! - `GEMINI_BASE_URL` (default: `https://generativelanguage.googleapis.com/v1beta`)

use super::error::ProviderError;
use super::traits::{
    GenerateRequest, GenerationConfig, GenerationHandle, GenerationProvider, GenerationSummary,
    PromptPart, TokenUsage,
};
use crate::chat::data_uri::DataUri;
use crate::chat::types::{ChatRole, StreamChunk};
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the answer was cut off by the provider.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Gemini HTTP provider. Cheaply cloneable (shares the reqwest client).
#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

// ============================================================================
// Wire types (request)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "GenerationConfig::is_empty")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    file_uri: String,
}

// ============================================================================
// Wire types (response)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

impl GeminiProvider {
    /// Create a provider with explicit configuration.
    ///
    /// `connect_timeout` bounds connection setup only; a streaming body may
    /// legitimately stay open for a long time.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model
            .strip_prefix("googleai/")
            .or_else(|| model.strip_prefix("models/"))
            .unwrap_or(model);
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }
}

/// Translate the ordered prompt into Gemini's request body.
///
/// Instruction parts become `systemInstruction`; every other part joins the
/// `contents` entry of its role, merging consecutive parts of the same role.
fn build_request_body(request: &GenerateRequest) -> Result<GenerateContentRequest, ProviderError> {
    let mut instructions: Vec<Part> = Vec::new();
    let mut contents: Vec<Content> = Vec::new();

    for part in &request.parts {
        let (role, wire_part) = match part {
            PromptPart::Instruction { text } => {
                instructions.push(Part::Text { text: text.clone() });
                continue;
            }
            PromptPart::Text { role, text } => (
                role.unwrap_or(ChatRole::User),
                Part::Text { text: text.clone() },
            ),
            PromptPart::Media { url } => (ChatRole::User, media_part(url)?),
        };

        let role = role.as_str();
        match contents.last_mut() {
            Some(last) if last.role == Some(role) => last.parts.push(wire_part),
            _ => contents.push(Content {
                role: Some(role),
                parts: vec![wire_part],
            }),
        }
    }

    if contents.is_empty() {
        return Err(ProviderError::InvalidPrompt(
            "prompt has no user content".into(),
        ));
    }

    Ok(GenerateContentRequest {
        system_instruction: (!instructions.is_empty()).then(|| Content {
            role: None,
            parts: instructions,
        }),
        contents,
        generation_config: request.config.clone(),
    })
}

fn media_part(url: &str) -> Result<Part, ProviderError> {
    if url.starts_with("data:") {
        let uri = DataUri::parse(url).map_err(|e| ProviderError::InvalidPrompt(e.to_string()))?;
        Ok(Part::Inline {
            inline_data: Blob {
                mime_type: uri.mime_type.to_string(),
                data: uri.data.to_string(),
            },
        })
    } else {
        Ok(Part::File {
            file_data: FileData {
                file_uri: url.to_string(),
            },
        })
    }
}

/// Pull the readable message out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|env| env.error)
        .map(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    async fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationHandle, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| ProviderError::Unauthorized {
            status: 401,
            message: "no Gemini API key configured (set GEMINI_API_KEY)".into(),
        })?;

        let body = build_request_body(&request)?;
        let url = self.endpoint(&request.model);
        debug!(
            "Gemini request: model={} contents={}",
            request.model,
            body.contents.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = error_message(&text);
            warn!("Gemini returned {} for model {}: {}", status, request.model, message);
            return Err(ProviderError::from_status(status.as_u16(), message));
        }

        let cancel = CancellationToken::new();
        let (chunk_tx, chunk_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(pump(response, chunk_tx, done_tx, cancel.clone()));

        let completion = async move { done_rx.await.unwrap_or(Err(ProviderError::Incomplete)) };

        Ok(
            GenerationHandle::new(ReceiverStream::new(chunk_rx).boxed(), completion.boxed())
                .with_cancel(cancel),
        )
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// SSE pump
// ============================================================================

/// Splits a byte stream into server-sent event payloads.
///
/// Lines are cut on `\n` at the byte level, so multi-byte UTF-8 sequences
/// split across network reads are reassembled before decoding.
#[derive(Debug, Default)]
struct SseDecoder {
    pending: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    /// Feed raw bytes; returns every event completed by them.
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.handle_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event not followed by a blank line.
    fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest).trim_end().to_string();
            if let Some(event) = self.handle_line(&line) {
                return Some(event);
            }
        }
        self.take_event()
    }

    fn handle_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.take_event();
        }
        if let Some(data) = line.strip_prefix("data:") {
            self.data_lines
                .push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        // Comments (`:`), `event:`, `id:` and `retry:` fields are ignored
        None
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data_lines).join("\n"))
    }
}

/// Per-generation state accumulated from the event sequence.
#[derive(Debug, Default)]
struct EventState {
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
}

/// What one SSE event means for the consumer.
#[derive(Debug, PartialEq)]
enum EventOutcome {
    Chunks(Vec<StreamChunk>),
    /// The provider reported a failure; emit the chunk (if any) and reject completion
    Failed(Option<StreamChunk>, ProviderError),
}

fn interpret_event(data: &str, state: &mut EventState) -> EventOutcome {
    let response: GenerateContentResponse = match serde_json::from_str(data) {
        Ok(r) => r,
        Err(e) => {
            return EventOutcome::Failed(None, ProviderError::Malformed(e.to_string()));
        }
    };

    if let Some(err) = response.error {
        let message = format!("Gemini error {}: {}", err.code, err.message);
        return EventOutcome::Failed(
            Some(StreamChunk::Error(message.clone())),
            ProviderError::Stream(message),
        );
    }

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        let message = format!("prompt blocked ({})", reason);
        return EventOutcome::Failed(
            Some(StreamChunk::Error(message.clone())),
            ProviderError::Blocked(message),
        );
    }

    if let Some(usage) = response.usage_metadata {
        state.usage = Some(TokenUsage {
            prompt_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        });
    }

    let mut chunks = Vec::new();
    if let Some(candidate) = response.candidates.into_iter().next() {
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            match part.text {
                Some(text) if !part.thought => chunks.push(StreamChunk::Text(text)),
                _ => chunks.push(StreamChunk::Metadata),
            }
        }
        if candidate.finish_reason.is_some() {
            state.finish_reason = candidate.finish_reason;
        }
    }
    if chunks.is_empty() {
        chunks.push(StreamChunk::Metadata);
    }
    EventOutcome::Chunks(chunks)
}

/// Decide the completion outcome once the body is exhausted.
fn completion_outcome(state: EventState) -> Result<GenerationSummary, ProviderError> {
    match state.finish_reason.as_deref() {
        None => Err(ProviderError::Incomplete),
        Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason) => Err(ProviderError::Blocked(
            format!("response stopped by provider ({})", reason),
        )),
        Some(_) => Ok(GenerationSummary {
            finish_reason: state.finish_reason,
            usage: state.usage,
        }),
    }
}

/// Send one item unless the generation was cancelled or the consumer is gone.
async fn forward(
    tx: &mpsc::Sender<Result<StreamChunk, ProviderError>>,
    item: Result<StreamChunk, ProviderError>,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

async fn pump(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<StreamChunk, ProviderError>>,
    done: oneshot::Sender<Result<GenerationSummary, ProviderError>>,
    cancel: CancellationToken,
) {
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::default();
    let mut state = EventState::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Gemini stream cancelled by consumer");
                return;
            }
            next = body.next() => next,
        };

        let exhausted = next.is_none();
        let events = match next {
            Some(Ok(bytes)) => decoder.feed(&bytes),
            Some(Err(e)) => {
                let err = ProviderError::from(e);
                warn!("Gemini stream transport error: {}", err);
                forward(&tx, Err(err.clone()), &cancel).await;
                let _ = done.send(Err(err));
                return;
            }
            None => decoder.finish().into_iter().collect(),
        };

        for event in events {
            match interpret_event(&event, &mut state) {
                EventOutcome::Chunks(chunks) => {
                    for chunk in chunks {
                        if !forward(&tx, Ok(chunk), &cancel).await {
                            debug!("Gemini stream consumer went away");
                            return;
                        }
                    }
                }
                EventOutcome::Failed(chunk, err) => {
                    warn!("Gemini stream failed: {}", err);
                    let item = chunk.map(Ok).unwrap_or_else(|| Err(err.clone()));
                    forward(&tx, item, &cancel).await;
                    let _ = done.send(Err(err));
                    return;
                }
            }
        }

        if exhausted {
            break;
        }
    }

    drop(tx);
    let outcome = completion_outcome(state);
    match &outcome {
        Ok(summary) => info!(
            "Gemini stream complete: finish_reason={:?} usage={:?}",
            summary.finish_reason, summary.usage
        ),
        Err(e) => warn!("Gemini stream ended abnormally: {}", e),
    }
    let _ = done.send(outcome);
}
