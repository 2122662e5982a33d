//! Chat module — Bedrock assistant conversations over a streaming provider
//!
//! - `adapter`: builds the prompt and opens the provider stream
//! - `prompt`: system instruction and prompt ordering
//! - `types`: wire types shared with clients (`ChatRequest`, `ChatTurn`, ...)
//! - `conversation` / `message`: client-side accumulation of streamed replies
//! - `segments`: prose / code-block split for rendering

pub mod adapter;
pub mod config;
pub mod conversation;
pub mod data_uri;
pub mod message;
pub mod prompt;
pub mod segments;
pub mod types;

pub use adapter::{ChatAdapter, ChatError};
pub use config::ChatConfig;
pub use conversation::{Conversation, ConversationError};
pub use message::{ChatMessage, MessageStatus};
pub use segments::{parse_segments, Segment};
pub use types::{ChatRequest, ChatRole, ChatTurn, StreamChunk};
