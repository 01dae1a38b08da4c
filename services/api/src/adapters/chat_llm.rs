//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the trainer chat LLM.
//! It implements the `ChatCompletionService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::debug;
use training_core::ports::{
    ChatCompletionService, CompletionRequest, ModelTier, PortError, PortResult, PromptMessage,
    PromptRole, CONTEXT_LENGTH_MARKER,
};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ChatCompletionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    fast_model: String,
    capable_model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, fast_model: String, capable_model: String) -> Self {
        Self {
            client,
            fast_model,
            capable_model,
        }
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast_model,
            ModelTier::Capable => &self.capable_model,
        }
    }
}

fn build_error(e: OpenAIError) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Converts an API failure into a port error, keeping context-length overflows distinct.
pub(crate) fn map_openai_error(e: OpenAIError) -> PortError {
    let is_overflow = match &e {
        OpenAIError::ApiError(api) => {
            api.code.as_deref() == Some("context_length_exceeded")
                || api.message.contains(CONTEXT_LENGTH_MARKER)
        }
        other => other.to_string().contains(CONTEXT_LENGTH_MARKER),
    };
    if is_overflow {
        PortError::ContextLengthExceeded(e.to_string())
    } else {
        PortError::Unexpected(e.to_string())
    }
}

pub(crate) fn to_openai_message(message: &PromptMessage) -> PortResult<ChatCompletionRequestMessage> {
    let built: ChatCompletionRequestMessage = match message.role {
        PromptRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content.as_str())
            .build()
            .map_err(build_error)?
            .into(),
        PromptRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.content.as_str())
            .build()
            .map_err(build_error)?
            .into(),
    };
    Ok(built)
}

//=========================================================================================
// `ChatCompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatCompletionService for OpenAiChatAdapter {
    async fn complete(&self, request: CompletionRequest) -> PortResult<String> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(request.messages.len() + 1);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system_prompt)
                .build()
                .map_err(build_error)?
                .into(),
        );
        for message in &request.messages {
            messages.push(to_openai_message(message)?);
        }

        let model = self.model_for(request.tier);
        debug!(
            "Chat completion on {} with {} message(s), max {} tokens",
            model,
            messages.len(),
            request.max_tokens
        );

        let openai_request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(request.temperature)
            .max_completion_tokens(request.max_tokens)
            .n(1)
            .build()
            .map_err(build_error)?;

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(map_openai_error)?;

        // Extract the text content from the first choice in the response.
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| PortError::InvalidResponse("No response from the chat model.".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    #[test]
    fn context_length_errors_are_recognised() {
        let overflow = OpenAIError::ApiError(ApiError {
            message: "This model's maximum context length is 4097 tokens.".into(),
            r#type: Some("invalid_request_error".into()),
            param: Some("messages".into()),
            code: Some("context_length_exceeded".into()),
        });
        assert!(matches!(
            map_openai_error(overflow),
            PortError::ContextLengthExceeded(_)
        ));

        let other = OpenAIError::InvalidArgument("model is required".into());
        assert!(matches!(map_openai_error(other), PortError::Unexpected(_)));
    }

    #[test]
    fn tiers_pick_configured_models() {
        let adapter = OpenAiChatAdapter::new(
            Client::with_config(OpenAIConfig::new().with_api_key("test")),
            "small".into(),
            "large".into(),
        );
        assert_eq!(adapter.model_for(ModelTier::Fast), "small");
        assert_eq!(adapter.model_for(ModelTier::Capable), "large");
    }
}
