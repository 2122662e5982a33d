//! Prompt builder for the Bedrock assistant
//!
//! Prompt layout, in order:
//! 1. System instruction (Bedrock-only scope, decline unrelated topics)
//! 2. History turns, oldest first, each tagged with its role
//! 3. Optional image: an introductory line followed by the media part
//! 4. The new user message

use super::types::{ChatRequest, ChatRole};
use crate::provider::PromptPart;

/// Default system instruction. Can be replaced through `chat.system_instruction`.
pub const SYSTEM_INSTRUCTION: &str = r#"You are "Bedrock aí", an assistant for Minecraft Bedrock Edition and addon development: behavior packs, resource packs, scripting, entities, items, blocks and everything around them.
Help users by answering questions, explaining concepts, generating code and guiding them through Bedrock development.
Stay within Minecraft Bedrock and addon development. If a question is unrelated to Bedrock, its addons or the general programming concepts they rely on, decline politely and steer the conversation back to Bedrock development.
Do not answer questions about other games, general knowledge or anything else outside this scope.
Format generated code (JSON manifests, JavaScript scripting API, ...) in fenced code blocks tagged with their language, and explain it.
If the user attaches an image, treat it as part of the question: it may be an error screenshot, a texture or a diagram of their addon.
The previous conversation is included; use it to keep context."#;

/// Text placed right before an attached image.
pub const IMAGE_INTRO: &str = "The user has provided the following image as part of their query:";

/// Build the ordered prompt for a chat request.
///
/// Performs no validation: callers decide whether a request is worth sending.
/// An empty message is left out so an image-only request does not carry a
/// blank text part.
pub fn build_prompt(request: &ChatRequest, system_instruction: &str) -> Vec<PromptPart> {
    let mut parts = Vec::with_capacity(request.history.len() + 4);

    parts.push(PromptPart::Instruction {
        text: system_instruction.to_string(),
    });

    parts.extend(
        request
            .history
            .iter()
            .map(|turn| PromptPart::turn(turn.role, turn.text.clone())),
    );

    if let Some(image) = &request.image_data {
        parts.push(PromptPart::text(IMAGE_INTRO));
        parts.push(PromptPart::media(image.clone()));
    }

    if !request.message.is_empty() {
        parts.push(PromptPart::turn(ChatRole::User, request.message.clone()));
    }

    parts
}
