//! Chat types — request, turn and chunk types for the chat system

use serde::{Deserialize, Deserializer, Serialize};

/// The author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        }
    }
}

/// One message of the conversation history.
///
/// Accepts both the flat `{ role, text }` shape and the parts shape used by
/// older web clients (`{ role, parts: [{ text }] }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ChatTurnWire")]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatTurnWire {
    Flat { role: ChatRole, text: String },
    Parts { role: ChatRole, parts: Vec<TextPart> },
}

#[derive(Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

impl From<ChatTurnWire> for ChatTurn {
    fn from(wire: ChatTurnWire) -> Self {
        match wire {
            ChatTurnWire::Flat { role, text } => ChatTurn { role, text },
            ChatTurnWire::Parts { role, parts } => ChatTurn {
                role,
                text: parts.into_iter().map(|p| p.text).collect(),
            },
        }
    }
}

/// A single chat submission: prior turns, the new message and an optional image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Prior turns, oldest first
    #[serde(default, deserialize_with = "null_as_empty")]
    pub history: Vec<ChatTurn>,
    /// The new user message (may be empty when an image is attached)
    #[serde(default)]
    pub message: String,
    /// Attached image as a `data:<mime>;base64,<payload>` URI
    #[serde(
        default,
        alias = "imageDataUri",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_data: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ChatTurn>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ChatTurn>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_image(mut self, data_uri: impl Into<String>) -> Self {
        self.image_data = Some(data_uri.into());
        self
    }

    /// Whether there is anything to send: a non-blank message or an image.
    pub fn has_content(&self) -> bool {
        !self.message.trim().is_empty() || self.image_data.is_some()
    }
}

/// One incremental unit of a streamed model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Partial text output
    Text(String),
    /// A chunk that carries no text (usage data, safety ratings, ...)
    Metadata,
    /// The provider reported an error inside the stream
    Error(String),
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        StreamChunk::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StreamChunk::Text(t) => Some(t),
            _ => None,
        }
    }
}
