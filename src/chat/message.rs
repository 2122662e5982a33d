//! Client-side chat messages

use super::types::{ChatRole, ChatTurn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of a message's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Model output still arriving
    Streaming,
    Complete,
    /// The generation errored; content holds the apology text
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message {0} is already finalized")]
    Finalized(String),
}

/// One message as the client displays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A finalized user message.
    pub fn user(content: impl Into<String>, image_data: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: ChatRole::User,
            content: content.into(),
            image_data,
            status: MessageStatus::Complete,
            created_at: Utc::now(),
        }
    }

    /// An empty model message waiting for streamed text.
    pub fn model_placeholder() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: ChatRole::Model,
            content: String::new(),
            image_data: None,
            status: MessageStatus::Streaming,
            created_at: Utc::now(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }

    pub fn append(&mut self, text: &str) -> Result<(), MessageError> {
        if !self.is_streaming() {
            return Err(MessageError::Finalized(self.id.clone()));
        }
        self.content.push_str(text);
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), MessageError> {
        self.finalize(MessageStatus::Complete)
    }

    /// Mark the generation as failed, replacing partial output with an apology.
    pub fn fail(&mut self, reason: &str) -> Result<(), MessageError> {
        self.finalize(MessageStatus::Failed)?;
        self.content = format!("Sorry, I encountered an error: {}", reason);
        Ok(())
    }

    fn finalize(&mut self, status: MessageStatus) -> Result<(), MessageError> {
        if !self.is_streaming() {
            return Err(MessageError::Finalized(self.id.clone()));
        }
        self.status = status;
        Ok(())
    }

    /// History entry for the next request, if this message belongs in it.
    pub fn as_turn(&self) -> Option<ChatTurn> {
        (self.status == MessageStatus::Complete).then(|| ChatTurn {
            role: self.role,
            text: self.content.clone(),
        })
    }
}
