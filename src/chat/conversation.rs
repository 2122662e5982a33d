//! Conversation — ordered chat messages plus the single in-flight reply
//!
//! At most one model message streams at a time; a second `begin_model_turn`
//! is refused until the first one is completed or failed.

use super::message::{ChatMessage, MessageError, MessageStatus};
use super::types::{ChatRequest, ChatRole, ChatTurn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("a model reply is already streaming")]
    Busy,

    #[error("message not found: {0}")]
    UnknownMessage(String),

    #[error("message {0} is not the active reply")]
    NotActive(String),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("failed to write conversation: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode conversation: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    #[serde(skip)]
    active: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Id of the model message currently receiving text
    pub fn active_reply(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn push_user(
        &mut self,
        content: impl Into<String>,
        image_data: Option<String>,
    ) -> Result<&ChatMessage, ConversationError> {
        if self.active.is_some() {
            return Err(ConversationError::Busy);
        }
        self.messages.push(ChatMessage::user(content, image_data));
        Ok(&self.messages[self.messages.len() - 1])
    }

    /// Open the model reply that streamed chunks will be appended to.
    pub fn begin_model_turn(&mut self) -> Result<String, ConversationError> {
        if self.active.is_some() {
            return Err(ConversationError::Busy);
        }
        let message = ChatMessage::model_placeholder();
        let id = message.id.clone();
        self.messages.push(message);
        self.active = Some(id.clone());
        Ok(id)
    }

    pub fn append_chunk(&mut self, id: &str, text: &str) -> Result<(), ConversationError> {
        self.active_message(id)?.append(text)?;
        Ok(())
    }

    pub fn complete(&mut self, id: &str) -> Result<(), ConversationError> {
        self.active_message(id)?.complete()?;
        self.active = None;
        Ok(())
    }

    pub fn fail(&mut self, id: &str, reason: &str) -> Result<(), ConversationError> {
        self.active_message(id)?.fail(reason)?;
        self.active = None;
        Ok(())
    }

    /// Start a new chat.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.active = None;
    }

    /// Finalized turns that precede the newest user message.
    ///
    /// Failed replies are left out so an apology never reaches the model.
    pub fn history_for_request(&self) -> Vec<ChatTurn> {
        let end = self
            .messages
            .iter()
            .rposition(|m| m.role == ChatRole::User)
            .unwrap_or(self.messages.len());
        self.messages[..end]
            .iter()
            .filter_map(ChatMessage::as_turn)
            .collect()
    }

    /// Request for the newest user message, with the history before it.
    pub fn next_request(&self) -> Option<ChatRequest> {
        let last = self.messages.iter().rev().find(|m| m.role == ChatRole::User)?;
        Some(ChatRequest {
            history: self.history_for_request(),
            message: last.content.clone(),
            image_data: last.image_data.clone(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConversationError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!("Saved {} message(s) to {}", self.messages.len(), path.display());
        Ok(())
    }

    /// Load a saved conversation. A missing or unreadable file yields an empty one.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => {
                debug!("No conversation at {}, starting fresh", path.display());
                return Self::default();
            }
        };

        match serde_json::from_str::<Conversation>(&contents) {
            Ok(mut conversation) => {
                // A reply still streaming when the file was written never finished
                for message in conversation.messages.iter_mut() {
                    if message.status != MessageStatus::Streaming {
                        continue;
                    }
                    if let Err(e) = message.fail("the response was interrupted") {
                        warn!("Could not mark interrupted message: {}", e);
                    }
                }
                conversation
            }
            Err(e) => {
                warn!(
                    "Discarding corrupt conversation file {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    fn active_message(&mut self, id: &str) -> Result<&mut ChatMessage, ConversationError> {
        if self.active.as_deref() != Some(id) {
            return if self.messages.iter().any(|m| m.id == id) {
                Err(ConversationError::NotActive(id.to_string()))
            } else {
                Err(ConversationError::UnknownMessage(id.to_string()))
            };
        }
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.id == id)
            .ok_or_else(|| ConversationError::UnknownMessage(id.to_string()))
    }
}
